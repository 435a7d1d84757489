//! Velocity estimation from raw encoder samples
//!
//! Two strategies share the [`VelocityEstimator`] trait:
//! - [`PredictiveEstimator`]: for low-PPR encoders. Between sparse ticks the
//!   last measured velocity is held, until the encoder has been still (on the
//!   host clock) for longer than the timeout.
//! - [`WindowedEstimator`]: displacement across a sliding window of samples.
//!
//! Neither ever returns NaN or infinity: when the elapsed device time is too
//! small to divide by, the last known velocity is returned instead.

use crate::config::{ControlConfig, EstimatorKind};
use crate::sample::EncoderSample;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Elapsed device time below which a velocity is not computed (seconds)
const MIN_DELTA_SECS: f64 = 0.001;

/// Trait for velocity estimators
pub trait VelocityEstimator: Send {
    /// Feed one sample and return the velocity estimate in counts/second
    ///
    /// `now` is the host clock at the time the sample was read.
    fn estimate(&mut self, sample: &EncoderSample, now: Instant) -> f64;

    /// Return to the initial (no samples seen) state
    fn reset(&mut self);

    /// Estimator name (for logs)
    fn name(&self) -> &'static str;
}

/// Build the estimator selected in the config
pub fn build_estimator(config: &ControlConfig) -> Box<dyn VelocityEstimator> {
    match config.estimator {
        EstimatorKind::Predictive => {
            Box::new(PredictiveEstimator::new(config.predictive_timeout()))
        }
        EstimatorKind::Windowed => Box::new(WindowedEstimator::new(config.velocity_window_size)),
    }
}

/// Predictive velocity tracking for low-resolution encoders
///
/// Only updates the velocity when the position actually changes; otherwise
/// assumes constant velocity. The stop timeout runs on the host clock, not the
/// device timestamp, so a stalled device clock cannot keep the deck spinning.
pub struct PredictiveEstimator {
    timeout: Duration,
    last_sample: Option<EncoderSample>,
    /// Host time of the last observed position change
    last_change: Option<Instant>,
    predicted_velocity: f64,
}

impl PredictiveEstimator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_sample: None,
            last_change: None,
            predicted_velocity: 0.0,
        }
    }

    /// Last velocity returned
    pub fn predicted_velocity(&self) -> f64 {
        self.predicted_velocity
    }
}

impl VelocityEstimator for PredictiveEstimator {
    fn estimate(&mut self, sample: &EncoderSample, now: Instant) -> f64 {
        let Some(last) = self.last_sample.replace(*sample) else {
            self.last_change = Some(now);
            self.predicted_velocity = 0.0;
            return 0.0;
        };

        if sample.position != last.position {
            let delta_time = sample.seconds_since(&last);
            if delta_time > MIN_DELTA_SECS {
                self.predicted_velocity = (sample.position - last.position) as f64 / delta_time;
            }
            self.last_change = Some(now);
        } else {
            let still_for = self
                .last_change
                .map(|changed| now.saturating_duration_since(changed))
                .unwrap_or_default();
            if still_for > self.timeout {
                self.predicted_velocity = 0.0;
            }
        }

        self.predicted_velocity
    }

    fn reset(&mut self) {
        self.last_sample = None;
        self.last_change = None;
        self.predicted_velocity = 0.0;
    }

    fn name(&self) -> &'static str {
        "predictive"
    }
}

/// Sliding-window velocity estimator
///
/// Velocity is the displacement between the oldest and newest sample in the
/// window divided by their device time difference.
pub struct WindowedEstimator {
    window: VecDeque<EncoderSample>,
    window_size: usize,
    last_velocity: f64,
}

impl WindowedEstimator {
    /// Create an estimator over `window_size` samples (at least 2)
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(2);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            last_velocity: 0.0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

impl VelocityEstimator for WindowedEstimator {
    fn estimate(&mut self, sample: &EncoderSample, _now: Instant) -> f64 {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(*sample);

        if self.window.len() < 2 {
            return 0.0;
        }
        let (Some(oldest), Some(newest)) = (self.window.front(), self.window.back()) else {
            return self.last_velocity;
        };

        let delta_time = newest.seconds_since(oldest);
        if delta_time > MIN_DELTA_SECS {
            self.last_velocity = (newest.position - oldest.position) as f64 / delta_time;
        }
        self.last_velocity
    }

    fn reset(&mut self) {
        self.window.clear();
        self.last_velocity = 0.0;
    }

    fn name(&self) -> &'static str {
        "windowed"
    }
}
