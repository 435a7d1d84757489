//! Deck controller - one turntable driving one playback deck

use crate::config::{ConfigError, ControlConfig};
use crate::estimator::{build_estimator, VelocityEstimator};
use crate::history::EncoderHistory;
use crate::rate::{RateStrategy, RateUpdate};
use crate::sample::{DeckId, EncoderSample};
use crate::sink::PlaybackSink;
use crate::state_machine::{TurntableState, TurntableStateMachine};
use std::sync::Arc;
use std::time::Instant;

/// Values the deck has applied to its sink
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeckRuntimeState {
    /// Last rate successfully sent to the sink
    pub current_rate: f64,
    /// Last volume successfully sent to the sink (0.0 - 1.0)
    pub current_volume: f64,
    pub state: TurntableState,
}

impl Default for DeckRuntimeState {
    fn default() -> Self {
        Self {
            current_rate: 1.0,
            current_volume: 1.0,
            state: TurntableState::NormalSpeed,
        }
    }
}

/// Deck state for status reporting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeckSnapshot {
    pub deck: DeckId,
    pub current_rate: f64,
    pub current_volume: f64,
    pub state: TurntableState,
    /// Latest velocity estimate (counts/second)
    pub velocity: f64,
    pub history_len: usize,
}

/// Owns the estimator, history, state machine and rate strategy for one deck
pub struct DeckController {
    id: DeckId,
    estimator: Box<dyn VelocityEstimator>,
    history: EncoderHistory,
    state_machine: TurntableStateMachine,
    strategy: RateStrategy,
    sink: Arc<dyn PlaybackSink>,
    runtime: DeckRuntimeState,
    velocity: f64,
    /// Last volume the sink accepted
    sent_volume: f64,
    volume_epsilon: f64,
    volume_step: f64,
}

impl DeckController {
    /// Build a deck from a validated config
    pub fn new(
        id: DeckId,
        config: &ControlConfig,
        sink: Arc<dyn PlaybackSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let estimator = build_estimator(config);
        let strategy = RateStrategy::from_config(config);
        tracing::debug!(
            "{}: {} estimator, {} rate strategy",
            id,
            estimator.name(),
            strategy.name()
        );

        Ok(Self {
            id,
            estimator,
            history: EncoderHistory::new(config.history_window_size),
            state_machine: TurntableStateMachine::new(config.normal_speed_band),
            strategy,
            sink,
            runtime: DeckRuntimeState {
                current_volume: config.default_volume,
                ..Default::default()
            },
            velocity: 0.0,
            sent_volume: config.default_volume,
            volume_epsilon: config.volume_epsilon,
            volume_step: config.volume_step,
        })
    }

    /// Process one sample read now
    pub fn ingest(&mut self, sample: &EncoderSample) {
        self.ingest_at(sample, Instant::now());
    }

    /// Process one sample read at host time `now`
    ///
    /// Estimates velocity, records it, re-classifies the turntable and sends a
    /// changed rate to the sink. The estimate, history and state always
    /// advance; only a rate the sink refused is held back, so the next tick
    /// tries again.
    pub fn ingest_at(&mut self, sample: &EncoderSample, now: Instant) {
        let velocity = self.estimator.estimate(sample, now);
        self.velocity = velocity;
        self.history.push(*sample, velocity);

        let state = self.state_machine.update(&self.history);
        if state != self.runtime.state {
            tracing::debug!(
                "{}: {} -> {}",
                self.id,
                self.runtime.state.name(),
                state.name()
            );
            self.runtime.state = state;
        }

        let update = self
            .strategy
            .compute(state, velocity, self.runtime.current_rate);
        let RateUpdate::Set(rate) = update else {
            return;
        };
        match self.sink.set_rate(self.id, rate) {
            Ok(()) => {
                tracing::debug!(
                    "{}: rate {:.3} -> {:.3} (velocity {:.1})",
                    self.id,
                    self.runtime.current_rate,
                    rate,
                    velocity
                );
                self.runtime.current_rate = rate;
            }
            Err(e) => tracing::warn!("{}: failed to set rate {:.3}: {}", self.id, rate, e),
        }
    }

    /// Set volume (clamped to 0.0 - 1.0)
    ///
    /// The new volume is always kept. The sink is written only once it moves
    /// beyond the volume epsilon from the last volume the sink accepted, so
    /// small steps add up. Returns true when the sink was written.
    pub fn set_volume(&mut self, volume: f64) -> bool {
        if volume.is_nan() {
            tracing::warn!("{}: ignoring NaN volume", self.id);
            return false;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.runtime.current_volume = volume;
        if (volume - self.sent_volume).abs() <= self.volume_epsilon {
            return false;
        }

        match self.sink.set_volume(self.id, volume) {
            Ok(()) => {
                tracing::info!("{}: volume {:.2}", self.id, volume);
                self.sent_volume = volume;
                true
            }
            Err(e) => {
                tracing::warn!("{}: failed to set volume {:.2}: {}", self.id, volume, e);
                false
            }
        }
    }

    /// Adjust volume by delta
    pub fn adjust_volume(&mut self, delta: f64) -> bool {
        self.set_volume(self.runtime.current_volume + delta)
    }

    /// Raise volume by the configured step
    pub fn volume_up(&mut self) -> bool {
        self.adjust_volume(self.volume_step)
    }

    /// Lower volume by the configured step
    pub fn volume_down(&mut self) -> bool {
        self.adjust_volume(-self.volume_step)
    }

    /// Forget all motion history; the applied rate and volume are kept
    pub fn reset(&mut self) {
        self.estimator.reset();
        self.history.clear();
        self.state_machine.reset();
        self.runtime.state = self.state_machine.state();
        self.velocity = 0.0;
        tracing::info!("{}: reset", self.id);
    }

    /// Park the deck in the calibrating state until the next reset
    pub fn request_calibration(&mut self) {
        self.state_machine.request_calibration();
        self.runtime.state = self.state_machine.state();
        tracing::info!("{}: calibrating", self.id);
    }

    pub fn snapshot(&self) -> DeckSnapshot {
        DeckSnapshot {
            deck: self.id,
            current_rate: self.runtime.current_rate,
            current_volume: self.runtime.current_volume,
            state: self.runtime.state,
            velocity: self.velocity,
            history_len: self.history.len(),
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    pub fn runtime(&self) -> &DeckRuntimeState {
        &self.runtime
    }

    pub fn current_rate(&self) -> f64 {
        self.runtime.current_rate
    }

    pub fn current_volume(&self) -> f64 {
        self.runtime.current_volume
    }

    pub fn state(&self) -> TurntableState {
        self.runtime.state
    }

    /// Latest velocity estimate
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn history(&self) -> &EncoderHistory {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;
    use std::time::Duration;

    fn deck(config: &ControlConfig) -> (DeckController, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let deck = DeckController::new(DeckId(0), config, sink.clone()).unwrap();
        (deck, sink)
    }

    /// Feed `count` samples moving `step` counts per 20 ms tick
    fn spin(deck: &mut DeckController, start: Instant, from_tick: u32, count: u32, step: i64) {
        for tick in from_tick..from_tick + count {
            let ts = tick * 20;
            let sample = EncoderSample::new(tick as i64 * step, 0.0, ts);
            deck.ingest_at(&sample, start + Duration::from_millis(ts as u64));
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ControlConfig {
            velocity_scale: 0.0,
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        assert!(DeckController::new(DeckId(0), &config, sink).is_err());
    }

    #[test]
    fn test_initial_state() {
        let (deck, sink) = deck(&ControlConfig::default());
        assert_eq!(deck.current_rate(), 1.0);
        assert_eq!(deck.current_volume(), 1.0);
        assert_eq!(deck.state(), TurntableState::NormalSpeed);
        assert!(sink.calls.lock().is_empty());
    }

    #[test]
    fn test_normal_speed_converges_to_unity() {
        let config = ControlConfig::default();
        let (mut deck, sink) = deck(&config);
        // -2 counts per 20 ms = -100 counts/s, inside the normal band
        spin(&mut deck, Instant::now(), 0, config.history_window_size as u32 + 1, -2);

        assert_eq!(deck.state(), TurntableState::NormalSpeed);
        assert_eq!(deck.current_rate(), 1.0);
        assert_eq!(sink.rates(DeckId(0)).last(), Some(&1.0));
    }

    #[test]
    fn test_fast_spin_modulates_and_clamps() {
        let (mut deck, sink) = deck(&ControlConfig::default());
        // 10 counts per 20 ms = 500 counts/s
        spin(&mut deck, Instant::now(), 0, 10, 10);

        assert_eq!(deck.state(), TurntableState::ModulatingSpeed);
        assert_eq!(deck.current_rate(), 3.0);
        // Clamped rate only written once
        assert_eq!(sink.rates(DeckId(0)), vec![3.0]);
    }

    #[test]
    fn test_rate_bounds_while_modulating() {
        let (mut deck, sink) = deck(&ControlConfig::default());
        let start = Instant::now();
        let steps = [40, -40, 3, -7, 0, 25, -1];
        for (i, step) in steps.iter().enumerate() {
            spin(&mut deck, start, i as u32 * 10, 10, *step);
        }
        for rate in sink.rates(DeckId(0)) {
            assert!((0.01..=3.0).contains(&rate), "rate {} out of bounds", rate);
        }
    }

    #[test]
    fn test_sink_failure_is_retried() {
        let (mut deck, sink) = deck(&ControlConfig::default());
        let start = Instant::now();
        sink.set_failing(true);
        spin(&mut deck, start, 0, 3, 10);
        assert_eq!(deck.current_rate(), 1.0);
        assert_eq!(deck.history().len(), 3);
        assert_eq!(deck.state(), TurntableState::ModulatingSpeed);

        sink.set_failing(false);
        spin(&mut deck, start, 3, 1, 10);
        assert_eq!(deck.current_rate(), 3.0);
        assert_eq!(sink.rates(DeckId(0)), vec![3.0]);
    }

    #[test]
    fn test_set_volume_twice_writes_once() {
        let (mut deck, sink) = deck(&ControlConfig::default());
        assert!(deck.set_volume(0.4));
        assert!(!deck.set_volume(0.4));
        assert_eq!(sink.volumes(DeckId(0)), vec![0.4]);
    }

    #[test]
    fn test_volume_round_trip() {
        let (mut deck, sink) = deck(&ControlConfig::default());
        deck.set_volume(0.5);
        sink.calls.lock().clear();

        assert!(deck.adjust_volume(0.1));
        assert!(deck.adjust_volume(-0.1));
        assert!((deck.current_volume() - 0.5).abs() < 1e-9);
        assert_eq!(sink.volumes(DeckId(0)).len(), 2);
    }

    #[test]
    fn test_small_volume_steps_accumulate() {
        let (mut deck, sink) = deck(&ControlConfig::default());
        deck.set_volume(0.5);
        sink.calls.lock().clear();

        // Each step is below the 1e-4 epsilon, two together are not
        assert!(!deck.adjust_volume(0.00006));
        assert!((deck.current_volume() - 0.50006).abs() < 1e-12);
        assert!(deck.adjust_volume(0.00006));
        assert!((deck.current_volume() - 0.50012).abs() < 1e-12);

        let volumes = sink.volumes(DeckId(0));
        assert_eq!(volumes.len(), 1);
        assert!((volumes[0] - 0.50012).abs() < 1e-12);
    }

    #[test]
    fn test_refused_volume_is_resent() {
        let (mut deck, sink) = deck(&ControlConfig::default());
        sink.set_failing(true);
        assert!(!deck.set_volume(0.3));
        assert_eq!(deck.current_volume(), 0.3);

        sink.set_failing(false);
        assert!(deck.set_volume(0.3));
        assert_eq!(sink.volumes(DeckId(0)), vec![0.3]);
    }

    #[test]
    fn test_volume_clamps_and_steps() {
        let (mut deck, sink) = deck(&ControlConfig::default());
        // Already at 1.0
        assert!(!deck.set_volume(7.0));
        assert!(!deck.volume_up());
        assert!(deck.volume_down());
        assert!((deck.current_volume() - 0.9).abs() < 1e-9);
        assert!(deck.set_volume(-3.0));
        assert_eq!(deck.current_volume(), 0.0);
        assert!(!deck.set_volume(f64::NAN));
        assert_eq!(sink.volumes(DeckId(0)).len(), 2);
    }

    #[test]
    fn test_calibration_holds_rate_until_reset() {
        let (mut deck, sink) = deck(&ControlConfig::default());
        let start = Instant::now();
        deck.request_calibration();
        spin(&mut deck, start, 0, 10, 10);

        assert_eq!(deck.state(), TurntableState::Calibrating);
        assert!(sink.rates(DeckId(0)).is_empty());

        deck.reset();
        assert_eq!(deck.state(), TurntableState::NormalSpeed);
        assert!(deck.history().is_empty());
        assert_eq!(deck.velocity(), 0.0);
    }

    #[test]
    fn test_snapshot() {
        let (mut deck, _sink) = deck(&ControlConfig::default());
        spin(&mut deck, Instant::now(), 0, 3, 10);
        let snap = deck.snapshot();
        assert_eq!(snap.deck, DeckId(0));
        assert_eq!(snap.history_len, 3);
        assert_eq!(snap.current_rate, 3.0);
        assert!((snap.velocity - 500.0).abs() < 1e-9);
    }
}
