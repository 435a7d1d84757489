//! Turntable state classification
//!
//! The deck is either spinning at its resting speed (normal) or being pushed,
//! held or scratched (modulating). Classification uses the mean of the
//! velocity estimates across the whole retained history, which smooths single
//! spikes at the cost of up to a second of lag.

use crate::history::EncoderHistory;

/// Turntable state for one deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurntableState {
    /// Placeholder, entered only on explicit request and never left by `update`
    Calibrating,
    /// Average velocity inside the normal speed band: play at 1.0x
    #[default]
    NormalSpeed,
    /// Average velocity outside the band: rate follows the encoder
    ModulatingSpeed,
}

impl TurntableState {
    pub fn name(&self) -> &'static str {
        match self {
            TurntableState::Calibrating => "calibrating",
            TurntableState::NormalSpeed => "normal",
            TurntableState::ModulatingSpeed => "modulating",
        }
    }
}

/// Classifies velocity history against a fixed normal-speed band
#[derive(Debug, Clone)]
pub struct TurntableStateMachine {
    state: TurntableState,
    /// Exclusive bounds of the normal speed band (counts/second)
    band_min: f64,
    band_max: f64,
}

impl TurntableStateMachine {
    pub fn new(normal_speed_band: (f64, f64)) -> Self {
        Self {
            state: TurntableState::NormalSpeed,
            band_min: normal_speed_band.0,
            band_max: normal_speed_band.1,
        }
    }

    /// Current state
    pub fn state(&self) -> TurntableState {
        self.state
    }

    /// Re-classify from the retained history; call once per tick
    ///
    /// Returns the (possibly unchanged) state.
    pub fn update(&mut self, history: &EncoderHistory) -> TurntableState {
        if self.state == TurntableState::Calibrating {
            return self.state;
        }
        let Some(avg_velocity) = history.average_velocity() else {
            return self.state;
        };

        self.state = if self.in_normal_band(avg_velocity) {
            TurntableState::NormalSpeed
        } else {
            TurntableState::ModulatingSpeed
        };
        self.state
    }

    /// Whether a velocity lies strictly inside the normal speed band
    pub fn in_normal_band(&self, velocity: f64) -> bool {
        self.band_min < velocity && velocity < self.band_max
    }

    /// Enter the calibrating placeholder state
    pub fn request_calibration(&mut self) {
        self.state = TurntableState::Calibrating;
    }

    /// Return to the initial state
    pub fn reset(&mut self) {
        self.state = TurntableState::NormalSpeed;
    }
}
