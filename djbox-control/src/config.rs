//! Controller configuration
//!
//! Fixed at construction time. Every field has a default matching the box's
//! stock tuning, so a partial YAML section only overrides what it names.
//! `validate()` must pass before any deck is built.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors, all fatal at construction time
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Playback rate range is empty: min {min} must be below max {max}")]
    InvalidRateRange { min: f64, max: f64 },
    #[error("Normal speed band is empty: min {min} must be below max {max}")]
    InvalidNormalSpeedBand { min: f64, max: f64 },
    #[error("{field} must be positive (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be finite")]
    NotFinite { field: &'static str },
    #[error("{field} must hold at least {min} samples (got {value})")]
    WindowTooSmall {
        field: &'static str,
        min: usize,
        value: usize,
    },
    #[error("Smoothing alpha must be in (0, 1] (got {0})")]
    SmoothingAlphaOutOfRange(f64),
    #[error("Baseline velocity must be non-zero")]
    ZeroBaselineVelocity,
    #[error("Default volume must be in [0, 1] (got {0})")]
    DefaultVolumeOutOfRange(f64),
}

/// Velocity estimation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Hold the last velocity between sparse encoder ticks (low-PPR encoders)
    #[default]
    Predictive,
    /// Displacement across a sliding window of samples
    Windowed,
}

/// Playback rate strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStrategyKind {
    /// Discrete states, hard reset to 1.0, hysteresis on changes
    #[default]
    Hysteresis,
    /// Continuous exponential smoothing towards a baseline-relative target
    Smoothed,
}

/// Turntable controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Divisor turning velocity (counts/s) into a rate change
    pub velocity_scale: f64,
    pub min_playback_rate: f64,
    pub max_playback_rate: f64,
    /// Exclusive (min, max) band of average velocity that counts as normal speed
    pub normal_speed_band: (f64, f64),
    /// Number of samples averaged by the state machine
    pub history_window_size: usize,
    /// Predictive estimator: no position change for this long means stopped
    pub predictive_timeout_ms: u64,
    pub allow_reverse_playback: bool,
    /// Smoothed strategy: fraction of the step applied per tick
    pub smoothing_alpha: f64,
    /// Smoothed strategy: slew cap in rate units per second
    pub max_rate_delta_per_second: f64,
    pub tick_interval_ms: u64,

    pub estimator: EstimatorKind,
    /// Windowed estimator: number of samples in the window
    pub velocity_window_size: usize,
    pub rate_strategy: RateStrategyKind,
    /// Smoothed strategy: encoder velocity that means 1.0x playback
    pub baseline_velocity: f64,
    /// Hysteresis strategy: minimum rate change worth applying
    pub rate_hysteresis: f64,
    /// Smallest rate magnitude ever sent to the sink
    pub min_emitted_rate: f64,
    /// Minimum volume change worth forwarding to the sink
    pub volume_epsilon: f64,
    pub default_volume: f64,
    /// Step used by volume up/down commands
    pub volume_step: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            velocity_scale: 100.0,
            min_playback_rate: 0.0,
            max_playback_rate: 3.0,
            normal_speed_band: (-120.0, -80.0),
            history_window_size: 100,
            predictive_timeout_ms: 500,
            allow_reverse_playback: false,
            smoothing_alpha: 0.9,
            max_rate_delta_per_second: 1.6,
            tick_interval_ms: 20,
            estimator: EstimatorKind::Predictive,
            velocity_window_size: 10,
            rate_strategy: RateStrategyKind::Hysteresis,
            baseline_velocity: 0.5,
            rate_hysteresis: 0.01,
            min_emitted_rate: 0.01,
            volume_epsilon: 1e-4,
            default_volume: 1.0,
            volume_step: 0.1,
        }
    }
}

impl ControlConfig {
    /// Check every threshold; the controller refuses to start on error
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("velocity_scale", self.velocity_scale),
            ("min_playback_rate", self.min_playback_rate),
            ("max_playback_rate", self.max_playback_rate),
            ("normal_speed_band", self.normal_speed_band.0),
            ("normal_speed_band", self.normal_speed_band.1),
            ("smoothing_alpha", self.smoothing_alpha),
            ("max_rate_delta_per_second", self.max_rate_delta_per_second),
            ("baseline_velocity", self.baseline_velocity),
            ("rate_hysteresis", self.rate_hysteresis),
            ("min_emitted_rate", self.min_emitted_rate),
            ("volume_epsilon", self.volume_epsilon),
            ("default_volume", self.default_volume),
            ("volume_step", self.volume_step),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field });
            }
        }

        if self.min_playback_rate >= self.max_playback_rate {
            return Err(ConfigError::InvalidRateRange {
                min: self.min_playback_rate,
                max: self.max_playback_rate,
            });
        }
        let (band_min, band_max) = self.normal_speed_band;
        if band_min >= band_max {
            return Err(ConfigError::InvalidNormalSpeedBand {
                min: band_min,
                max: band_max,
            });
        }

        let positive = [
            ("velocity_scale", self.velocity_scale),
            ("max_playback_rate", self.max_playback_rate),
            ("max_rate_delta_per_second", self.max_rate_delta_per_second),
            ("min_emitted_rate", self.min_emitted_rate),
            ("tick_interval_ms", self.tick_interval_ms as f64),
        ];
        for (field, value) in positive {
            if value <= 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        if self.history_window_size < 1 {
            return Err(ConfigError::WindowTooSmall {
                field: "history_window_size",
                min: 1,
                value: self.history_window_size,
            });
        }
        if self.velocity_window_size < 2 {
            return Err(ConfigError::WindowTooSmall {
                field: "velocity_window_size",
                min: 2,
                value: self.velocity_window_size,
            });
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ConfigError::SmoothingAlphaOutOfRange(self.smoothing_alpha));
        }
        if self.baseline_velocity == 0.0 {
            return Err(ConfigError::ZeroBaselineVelocity);
        }
        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(ConfigError::DefaultVolumeOutOfRange(self.default_volume));
        }

        Ok(())
    }

    /// Interval between two control ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Tick interval in seconds (used for slew limiting)
    pub fn tick_interval_secs(&self) -> f64 {
        self.tick_interval_ms as f64 / 1000.0
    }

    pub fn predictive_timeout(&self) -> Duration {
        Duration::from_millis(self.predictive_timeout_ms)
    }

    /// Lowest rate the strategies may produce
    ///
    /// With reverse playback enabled the range mirrors the forward maximum.
    pub fn lower_rate_bound(&self) -> f64 {
        if self.allow_reverse_playback {
            -self.max_playback_rate
        } else {
            self.min_playback_rate
        }
    }
}
