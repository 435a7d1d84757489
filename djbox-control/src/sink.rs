//! Playback sinks - where computed rates and volumes go
//!
//! The audio side lives outside this crate. A sink only has to accept
//! absolute values, so repeating a call is harmless.

use crate::sample::DeckId;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

/// Sink delivery errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Playback sink disconnected")]
    Disconnected,
    #[error("Playback sink queue full")]
    Full,
    #[error("Playback sink rejected value: {0}")]
    Rejected(String),
}

/// Receiver of per-deck playback rate and volume
pub trait PlaybackSink: Send + Sync {
    fn set_rate(&self, deck: DeckId, rate: f64) -> Result<(), SinkError>;
    fn set_volume(&self, deck: DeckId, volume: f64) -> Result<(), SinkError>;
}

/// Command forwarded by [`ChannelSink`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackCommand {
    SetRate { deck: DeckId, rate: f64 },
    SetVolume { deck: DeckId, volume: f64 },
}

impl PlaybackCommand {
    pub fn deck(&self) -> DeckId {
        match self {
            PlaybackCommand::SetRate { deck, .. } | PlaybackCommand::SetVolume { deck, .. } => {
                *deck
            }
        }
    }
}

/// Sink that queues commands for a playback thread
pub struct ChannelSink {
    tx: Sender<PlaybackCommand>,
}

impl ChannelSink {
    pub fn new(tx: Sender<PlaybackCommand>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiving end of its queue
    pub fn channel(capacity: usize) -> (Self, Receiver<PlaybackCommand>) {
        let (tx, rx) = bounded(capacity);
        (Self::new(tx), rx)
    }

    fn send(&self, cmd: PlaybackCommand) -> Result<(), SinkError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Disconnected(_) => SinkError::Disconnected,
        })
    }
}

impl PlaybackSink for ChannelSink {
    fn set_rate(&self, deck: DeckId, rate: f64) -> Result<(), SinkError> {
        self.send(PlaybackCommand::SetRate { deck, rate })
    }

    fn set_volume(&self, deck: DeckId, volume: f64) -> Result<(), SinkError> {
        self.send(PlaybackCommand::SetVolume { deck, volume })
    }
}

/// Latest values applied to one deck
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeckOutput {
    pub rate: f64,
    pub volume: f64,
}

impl Default for DeckOutput {
    fn default() -> Self {
        Self {
            rate: 1.0,
            volume: 1.0,
        }
    }
}

#[derive(Default)]
struct SharedOutputs {
    decks: HashMap<DeckId, DeckOutput>,
    rate_writes: u64,
    volume_writes: u64,
}

/// Sink holding the latest value per deck, readable from any thread
///
/// Suits a player that polls for its speed instead of consuming a queue.
#[derive(Default)]
pub struct SharedPlaybackSink {
    inner: Mutex<SharedOutputs>,
}

impl SharedPlaybackSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest output for a deck (defaults if nothing was written yet)
    pub fn output(&self, deck: DeckId) -> DeckOutput {
        self.inner
            .lock()
            .decks
            .get(&deck)
            .copied()
            .unwrap_or_default()
    }

    /// Total number of rate writes received
    pub fn rate_writes(&self) -> u64 {
        self.inner.lock().rate_writes
    }

    /// Total number of volume writes received
    pub fn volume_writes(&self) -> u64 {
        self.inner.lock().volume_writes
    }
}

impl PlaybackSink for SharedPlaybackSink {
    fn set_rate(&self, deck: DeckId, rate: f64) -> Result<(), SinkError> {
        if !rate.is_finite() {
            return Err(SinkError::Rejected(format!("rate {}", rate)));
        }
        let mut inner = self.inner.lock();
        inner.decks.entry(deck).or_default().rate = rate;
        inner.rate_writes += 1;
        Ok(())
    }

    fn set_volume(&self, deck: DeckId, volume: f64) -> Result<(), SinkError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(SinkError::Rejected(format!("volume {}", volume)));
        }
        let mut inner = self.inner.lock();
        inner.decks.entry(deck).or_default().volume = volume;
        inner.volume_writes += 1;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sink that records every call and can be told to fail
    #[derive(Default)]
    pub struct RecordingSink {
        pub calls: Mutex<Vec<PlaybackCommand>>,
        pub failing: AtomicBool,
    }

    impl RecordingSink {
        pub fn rates(&self, deck: DeckId) -> Vec<f64> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    PlaybackCommand::SetRate { deck: d, rate } if *d == deck => Some(*rate),
                    _ => None,
                })
                .collect()
        }

        pub fn volumes(&self, deck: DeckId) -> Vec<f64> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    PlaybackCommand::SetVolume { deck: d, volume } if *d == deck => Some(*volume),
                    _ => None,
                })
                .collect()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::Relaxed);
        }

        fn record(&self, cmd: PlaybackCommand) -> Result<(), SinkError> {
            if self.failing.load(Ordering::Relaxed) {
                return Err(SinkError::Disconnected);
            }
            self.calls.lock().push(cmd);
            Ok(())
        }
    }

    impl PlaybackSink for RecordingSink {
        fn set_rate(&self, deck: DeckId, rate: f64) -> Result<(), SinkError> {
            self.record(PlaybackCommand::SetRate { deck, rate })
        }

        fn set_volume(&self, deck: DeckId, volume: f64) -> Result<(), SinkError> {
            self.record(PlaybackCommand::SetVolume { deck, volume })
        }
    }
}
