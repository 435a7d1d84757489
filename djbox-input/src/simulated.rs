//! Simulated turntable for running without hardware
//!
//! A motor spins the platter at a constant speed; optionally a scratch burst
//! overrides it for a while every period. Positions are quantized to whole
//! counts like a real low-resolution encoder.

use djbox_control::{EncoderSample, SampleSource, SourceError};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::{Duration, Instant};

/// Simulated turntable settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Platter speed with nobody touching it (counts/s)
    pub motor_velocity: f64,
    /// Speed during a scratch burst (counts/s)
    pub scratch_velocity: f64,
    /// Time between the starts of two scratch bursts (0 = never scratch)
    pub scratch_period_ms: u64,
    pub scratch_duration_ms: u64,
    /// Fail every Nth poll to exercise error handling (0 = never)
    pub fail_every: u32,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            motor_velocity: -100.0,
            scratch_velocity: 250.0,
            scratch_period_ms: 4000,
            scratch_duration_ms: 800,
            fail_every: 0,
        }
    }
}

/// Turntable model producing encoder samples from the host clock
pub struct SimulatedTurntable {
    config: SimulatedConfig,
    name: String,
    start: Instant,
    last: Option<Duration>,
    position: f64,
    polls: u64,
}

impl SimulatedTurntable {
    pub fn new(name: impl Into<String>, config: SimulatedConfig) -> Self {
        Self {
            config,
            name: name.into(),
            start: Instant::now(),
            last: None,
            position: 0.0,
            polls: 0,
        }
    }

    /// Platter velocity `elapsed` after start
    pub fn velocity_at(&self, elapsed: Duration) -> f64 {
        let period = self.config.scratch_period_ms;
        if period == 0 {
            return self.config.motor_velocity;
        }
        let phase = elapsed.as_millis() as u64 % period;
        if phase < self.config.scratch_duration_ms {
            self.config.scratch_velocity
        } else {
            self.config.motor_velocity
        }
    }

    /// Advance the model to `elapsed` and sample it
    pub fn sample_at(&mut self, elapsed: Duration) -> EncoderSample {
        let velocity = self.velocity_at(elapsed);
        if let Some(last) = self.last {
            let dt = elapsed.saturating_sub(last).as_secs_f64();
            self.position += velocity * dt;
        }
        self.last = Some(elapsed);

        // Device clock is a wrapping 32-bit millisecond counter
        let timestamp_ms = elapsed.as_millis() as u32;
        EncoderSample::new(self.position.round() as i64, velocity, timestamp_ms)
    }
}

impl SampleSource for SimulatedTurntable {
    fn poll(&mut self) -> Result<Option<EncoderSample>, SourceError> {
        self.polls += 1;
        let fail_every = u64::from(self.config.fail_every);
        if fail_every > 0 && self.polls % fail_every == 0 {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "simulated bus timeout").into());
        }
        Ok(Some(self.sample_at(self.start.elapsed())))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady() -> SimulatedConfig {
        SimulatedConfig {
            scratch_period_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_motor_spins_at_constant_speed() {
        let mut table = SimulatedTurntable::new("sim", steady());
        table.sample_at(Duration::ZERO);
        let sample = table.sample_at(Duration::from_millis(1000));
        assert_eq!(sample.position, -100);
        assert_eq!(sample.velocity_raw, -100.0);
        assert_eq!(sample.timestamp_ms, 1000);
    }

    #[test]
    fn test_positions_are_quantized() {
        let mut table = SimulatedTurntable::new("sim", steady());
        table.sample_at(Duration::ZERO);
        // -100 counts/s for 3 ms = -0.3 counts
        assert_eq!(table.sample_at(Duration::from_millis(3)).position, 0);
        assert_eq!(table.sample_at(Duration::from_millis(20)).position, -2);
    }

    #[test]
    fn test_scratch_bursts() {
        let table = SimulatedTurntable::new("sim", SimulatedConfig::default());
        assert_eq!(table.velocity_at(Duration::from_millis(100)), 250.0);
        assert_eq!(table.velocity_at(Duration::from_millis(1000)), -100.0);
        assert_eq!(table.velocity_at(Duration::from_millis(4100)), 250.0);
    }

    #[test]
    fn test_fail_every() {
        let mut table = SimulatedTurntable::new(
            "sim",
            SimulatedConfig {
                fail_every: 3,
                ..steady()
            },
        );
        let results: Vec<bool> = (0..6).map(|_| table.poll().is_ok()).collect();
        assert_eq!(results, vec![true, true, false, true, true, false]);
        assert_eq!(table.name(), "sim");
    }
}
