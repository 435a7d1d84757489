//! Playback rate strategies
//!
//! Both strategies answer the same question once per tick: given the deck's
//! state, its latest velocity estimate and the rate currently applied, what
//! (if anything) should be sent to the playback sink?
//!
//! - `Hysteresis` (reference): hard reset to 1.0 at normal speed, otherwise
//!   `1 + velocity / scale`, clamped, ignoring changes inside the hysteresis
//!   band.
//! - `Smoothed`: continuous target relative to a baseline velocity, slew
//!   limited per tick and exponentially smoothed. Ignores the normal/modulating
//!   classification.

use crate::config::{ControlConfig, RateStrategyKind};
use crate::state_machine::TurntableState;

/// Tolerance for "already at normal speed"
const NORMAL_RATE_TOLERANCE: f64 = 1e-9;

/// Smallest smoothed-rate change worth a sink write
const SMOOTHED_MIN_CHANGE: f64 = 1e-6;

/// Result of a rate computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateUpdate {
    /// Keep the current rate, no sink write
    Unchanged,
    /// Apply and emit this rate
    Set(f64),
}

impl RateUpdate {
    /// Rate to apply, if any
    pub fn rate(&self) -> Option<f64> {
        match self {
            RateUpdate::Unchanged => None,
            RateUpdate::Set(rate) => Some(*rate),
        }
    }
}

/// Rate strategy selected per deck at construction
#[derive(Debug, Clone, PartialEq)]
pub enum RateStrategy {
    Hysteresis {
        velocity_scale: f64,
        min_rate: f64,
        max_rate: f64,
        hysteresis: f64,
        min_emitted_rate: f64,
        allow_reverse: bool,
    },
    Smoothed {
        baseline_velocity: f64,
        min_rate: f64,
        max_rate: f64,
        alpha: f64,
        /// Largest change per tick (`max_rate_delta_per_second * tick seconds`)
        max_step: f64,
        min_emitted_rate: f64,
        allow_reverse: bool,
    },
}

impl RateStrategy {
    /// Build the strategy selected in the config
    pub fn from_config(config: &ControlConfig) -> Self {
        match config.rate_strategy {
            RateStrategyKind::Hysteresis => RateStrategy::Hysteresis {
                velocity_scale: config.velocity_scale,
                min_rate: config.lower_rate_bound(),
                max_rate: config.max_playback_rate,
                hysteresis: config.rate_hysteresis,
                min_emitted_rate: config.min_emitted_rate,
                allow_reverse: config.allow_reverse_playback,
            },
            RateStrategyKind::Smoothed => RateStrategy::Smoothed {
                baseline_velocity: config.baseline_velocity,
                min_rate: config.lower_rate_bound(),
                max_rate: config.max_playback_rate,
                alpha: config.smoothing_alpha,
                max_step: config.max_rate_delta_per_second * config.tick_interval_secs(),
                min_emitted_rate: config.min_emitted_rate,
                allow_reverse: config.allow_reverse_playback,
            },
        }
    }

    /// Strategy name (for logs)
    pub fn name(&self) -> &'static str {
        match self {
            RateStrategy::Hysteresis { .. } => "hysteresis",
            RateStrategy::Smoothed { .. } => "smoothed",
        }
    }

    /// Compute the rate update for one tick
    pub fn compute(&self, state: TurntableState, velocity: f64, previous_rate: f64) -> RateUpdate {
        if state == TurntableState::Calibrating {
            tracing::debug!("Calibrating, rate left at {:.3}", previous_rate);
            return RateUpdate::Unchanged;
        }

        match *self {
            RateStrategy::Hysteresis {
                velocity_scale,
                min_rate,
                max_rate,
                hysteresis,
                min_emitted_rate,
                allow_reverse,
            } => {
                if state == TurntableState::NormalSpeed {
                    if (previous_rate - 1.0).abs() <= NORMAL_RATE_TOLERANCE {
                        return RateUpdate::Unchanged;
                    }
                    return RateUpdate::Set(1.0);
                }

                let candidate = (1.0 + velocity / velocity_scale).clamp(min_rate, max_rate);
                if (candidate - previous_rate).abs() <= hysteresis {
                    return RateUpdate::Unchanged;
                }
                let emitted = floor_rate(candidate, candidate, min_emitted_rate, allow_reverse);
                if (emitted - previous_rate).abs() <= NORMAL_RATE_TOLERANCE {
                    return RateUpdate::Unchanged;
                }
                RateUpdate::Set(emitted)
            }
            RateStrategy::Smoothed {
                baseline_velocity,
                min_rate,
                max_rate,
                alpha,
                max_step,
                min_emitted_rate,
                allow_reverse,
            } => {
                let target = (1.0 + (velocity - baseline_velocity) / baseline_velocity)
                    .clamp(min_rate, max_rate);
                let step = (target - previous_rate).clamp(-max_step, max_step) * alpha;
                let rate =
                    floor_rate(previous_rate + step, target, min_emitted_rate, allow_reverse);
                if (rate - previous_rate).abs() <= SMOOTHED_MIN_CHANGE {
                    return RateUpdate::Unchanged;
                }
                RateUpdate::Set(rate)
            }
        }
    }
}

/// Keep a rate away from zero before it reaches the audio engine
///
/// Forward-only decks floor at `min_rate`; with reverse enabled the magnitude
/// is floored and the sign taken from `target`, so a ramp through zero lands
/// on the side it is heading to.
fn floor_rate(rate: f64, target: f64, min_rate: f64, allow_reverse: bool) -> f64 {
    if allow_reverse {
        if rate.abs() < min_rate {
            min_rate.copysign(target)
        } else {
            rate
        }
    } else {
        rate.max(min_rate)
    }
}
