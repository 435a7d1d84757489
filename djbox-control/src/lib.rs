//! Turntable controller for the DJ box
//!
//! Turns a noisy, low-resolution stream of encoder samples into a stable
//! playback rate for each deck:
//! - Estimator: predictive or windowed velocity estimation
//! - History: bounded per-deck record of samples and their estimates
//! - State machine: normal speed vs actively modulated turntable
//! - Rate: hysteresis (reference) or smoothed rate strategies
//! - Deck: composition of the above, writing to a playback sink
//! - Engine: fixed-interval control loop with command/event channels

mod config;
mod deck;
mod engine;
mod estimator;
mod history;
mod rate;
mod sample;
mod sink;
mod source;
mod state_machine;

pub use config::{ConfigError, ControlConfig, EstimatorKind, RateStrategyKind};
pub use deck::{DeckController, DeckRuntimeState, DeckSnapshot};
pub use engine::{
    ControlCommand, ControlError, ControlEvent, ControlLoop, ControlLoopHandle, EncoderChannel,
    PollStats,
};
pub use estimator::{build_estimator, PredictiveEstimator, VelocityEstimator, WindowedEstimator};
pub use history::{EncoderHistory, HistoryEntry};
pub use rate::{RateStrategy, RateUpdate};
pub use sample::{DeckId, EncoderSample};
pub use sink::{
    ChannelSink, DeckOutput, PlaybackCommand, PlaybackSink, SharedPlaybackSink, SinkError,
};
pub use source::{SampleSource, SourceError};
pub use state_machine::{TurntableState, TurntableStateMachine};
