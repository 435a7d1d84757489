//! Control loop - polls encoders, drives decks, handles commands
//!
//! Each tick polls every encoder channel once and fans the sample out to the
//! channel's decks. Commands are only handled while waiting for the next
//! tick, so a tick always runs to completion.

use crate::config::ControlConfig;
use crate::deck::{DeckController, DeckSnapshot};
use crate::sample::DeckId;
use crate::source::SampleSource;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default interval between two state updates
const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_millis(250);

/// Control loop errors
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Unknown deck: {0}")]
    UnknownDeck(DeckId),
    #[error("Deck configured twice: {0}")]
    DuplicateDeck(DeckId),
    #[error("No encoder channels configured")]
    NoChannels,
    #[error("Failed to spawn control thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Commands sent to the control loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    SetVolume(DeckId, f64),
    AdjustVolume(DeckId, f64),
    VolumeUp(DeckId),
    VolumeDown(DeckId),
    /// Clear motion history and estimator state
    ResetDeck(DeckId),
    /// Enter the calibrating state (left by `ResetDeck`)
    Calibrate(DeckId),
    Shutdown,
}

/// Events sent from the control loop
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// Periodic state update
    StateUpdate {
        decks: Vec<DeckSnapshot>,
        /// Poll statistics per encoder channel, by source name
        channels: Vec<(String, PollStats)>,
    },
    /// A command could not be applied
    Error(String),
}

/// Poll counters for one encoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Every poll attempt, successful or not
    pub total_polls: u64,
    /// Polls that failed or returned no sample
    pub errors: u64,
}

impl PollStats {
    /// Fraction of polls that failed (0.0 before the first poll)
    pub fn error_rate(&self) -> f64 {
        if self.total_polls == 0 {
            return 0.0;
        }
        self.errors as f64 / self.total_polls as f64
    }
}

/// One physical encoder and the decks it drives
///
/// With a shared encoder several decks receive the same sample; with
/// independent encoders each channel holds a single deck.
pub struct EncoderChannel {
    source: Box<dyn SampleSource>,
    decks: Vec<DeckController>,
    stats: PollStats,
    /// Whether the previous poll failed (limits warning spam)
    failing: bool,
}

impl EncoderChannel {
    pub fn new(source: Box<dyn SampleSource>, decks: Vec<DeckController>) -> Self {
        Self {
            source,
            decks,
            stats: PollStats::default(),
            failing: false,
        }
    }

    /// Poll the source once and feed the sample to every deck
    ///
    /// Returns true when a sample was delivered. A failed poll leaves all
    /// deck state untouched.
    pub fn poll_at(&mut self, now: Instant) -> bool {
        self.stats.total_polls += 1;

        match self.source.poll() {
            Ok(Some(sample)) => {
                if self.failing {
                    tracing::info!("{}: reads recovered", self.source.name());
                    self.failing = false;
                }
                for deck in &mut self.decks {
                    deck.ingest_at(&sample, now);
                }
                true
            }
            Ok(None) => {
                self.stats.errors += 1;
                tracing::trace!("{}: no sample", self.source.name());
                false
            }
            Err(e) => {
                self.stats.errors += 1;
                if self.failing {
                    tracing::debug!("{}: read failed: {}", self.source.name(), e);
                } else {
                    tracing::warn!("{}: read failed: {}", self.source.name(), e);
                    self.failing = true;
                }
                false
            }
        }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    pub fn decks(&self) -> &[DeckController] {
        &self.decks
    }

    pub fn deck_mut(&mut self, id: DeckId) -> Option<&mut DeckController> {
        self.decks.iter_mut().find(|d| d.id() == id)
    }
}

/// Fixed-interval control loop over all encoder channels
pub struct ControlLoop {
    channels: Vec<EncoderChannel>,
    tick_interval: Duration,
    status_interval: Duration,
    ticks: u64,
}

impl ControlLoop {
    pub fn new(
        channels: Vec<EncoderChannel>,
        config: &ControlConfig,
    ) -> Result<Self, ControlError> {
        if channels.is_empty() {
            return Err(ControlError::NoChannels);
        }
        let mut seen = Vec::new();
        for deck in channels.iter().flat_map(|c| c.decks()) {
            if seen.contains(&deck.id()) {
                return Err(ControlError::DuplicateDeck(deck.id()));
            }
            seen.push(deck.id());
        }

        Ok(Self {
            channels,
            tick_interval: config.tick_interval(),
            status_interval: DEFAULT_STATUS_INTERVAL,
            ticks: 0,
        })
    }

    /// Set how often state updates are published
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Create channels for loop communication
    pub fn create_channels() -> (
        Sender<ControlCommand>,
        Receiver<ControlCommand>,
        Sender<ControlEvent>,
        Receiver<ControlEvent>,
    ) {
        let (cmd_tx, cmd_rx) = bounded(1024);
        let (evt_tx, evt_rx) = bounded(1024);
        (cmd_tx, cmd_rx, evt_tx, evt_rx)
    }

    /// Run one tick: poll every channel once
    pub fn tick(&mut self, now: Instant) {
        self.ticks += 1;
        for channel in &mut self.channels {
            channel.poll_at(now);
        }
    }

    /// Handle a command between ticks
    ///
    /// `Shutdown` is handled by the thread loop and is a no-op here.
    pub fn handle_command(&mut self, cmd: ControlCommand) -> Result<(), ControlError> {
        match cmd {
            ControlCommand::SetVolume(id, volume) => {
                self.deck_mut(id)?.set_volume(volume);
            }
            ControlCommand::AdjustVolume(id, delta) => {
                self.deck_mut(id)?.adjust_volume(delta);
            }
            ControlCommand::VolumeUp(id) => {
                self.deck_mut(id)?.volume_up();
            }
            ControlCommand::VolumeDown(id) => {
                self.deck_mut(id)?.volume_down();
            }
            ControlCommand::ResetDeck(id) => self.deck_mut(id)?.reset(),
            ControlCommand::Calibrate(id) => self.deck_mut(id)?.request_calibration(),
            ControlCommand::Shutdown => {}
        }
        Ok(())
    }

    /// Current state of every deck and channel
    pub fn snapshot(&self) -> ControlEvent {
        ControlEvent::StateUpdate {
            decks: self
                .channels
                .iter()
                .flat_map(|c| c.decks().iter().map(DeckController::snapshot))
                .collect(),
            channels: self
                .channels
                .iter()
                .map(|c| (c.name().to_string(), c.stats()))
                .collect(),
        }
    }

    pub fn deck(&self, id: DeckId) -> Option<&DeckController> {
        self.channels
            .iter()
            .flat_map(|c| c.decks())
            .find(|d| d.id() == id)
    }

    fn deck_mut(&mut self, id: DeckId) -> Result<&mut DeckController, ControlError> {
        self.channels
            .iter_mut()
            .find_map(|c| c.deck_mut(id))
            .ok_or(ControlError::UnknownDeck(id))
    }

    pub fn channels(&self) -> &[EncoderChannel] {
        &self.channels
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Move the loop onto its own thread
    pub fn spawn(self) -> Result<ControlLoopHandle, ControlError> {
        let (cmd_tx, cmd_rx, evt_tx, evt_rx) = Self::create_channels();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let mut control = self;
        let handle = thread::Builder::new()
            .name("djbox-control".to_string())
            .spawn(move || control.run(cmd_rx, evt_tx, shutdown_clone))?;

        Ok(ControlLoopHandle {
            command_tx: cmd_tx,
            event_rx: evt_rx,
            shutdown,
            handle: Some(handle),
        })
    }

    fn run(
        &mut self,
        cmd_rx: Receiver<ControlCommand>,
        evt_tx: Sender<ControlEvent>,
        shutdown: Arc<AtomicBool>,
    ) {
        tracing::info!(
            "Control loop started ({} channels, {} ms tick)",
            self.channels.len(),
            self.tick_interval.as_millis()
        );

        let mut next_tick = Instant::now();
        let mut last_status = Instant::now();

        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= next_tick {
                self.tick(now);
                next_tick += self.tick_interval;
                // Fell behind: skip missed ticks instead of bursting
                if next_tick < now {
                    next_tick = now + self.tick_interval;
                }

                if now.duration_since(last_status) >= self.status_interval {
                    last_status = now;
                    let _ = evt_tx.try_send(self.snapshot());
                }
            }

            let timeout = next_tick.saturating_duration_since(Instant::now());
            match cmd_rx.recv_timeout(timeout) {
                Ok(ControlCommand::Shutdown) => break,
                Ok(cmd) => {
                    if let Err(e) = self.handle_command(cmd) {
                        tracing::warn!("Command {:?} failed: {}", cmd, e);
                        let _ = evt_tx.try_send(ControlEvent::Error(e.to_string()));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Control loop stopped after {} ticks", self.ticks);
    }
}

/// Handle to a running control loop
///
/// Dropping the handle stops the loop and waits for its thread.
pub struct ControlLoopHandle {
    command_tx: Sender<ControlCommand>,
    event_rx: Receiver<ControlEvent>,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ControlLoopHandle {
    /// Send a command to the control loop
    pub fn send(&self, cmd: ControlCommand) {
        if self.command_tx.try_send(cmd).is_err() {
            tracing::warn!("Control loop not accepting commands, dropped {:?}", cmd);
        }
    }

    /// Sender for other threads (e.g. button handlers)
    pub fn commands(&self) -> Sender<ControlCommand> {
        self.command_tx.clone()
    }

    /// Receive events from the control loop
    pub fn events(&self) -> &Receiver<ControlEvent> {
        &self.event_rx
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Whether the loop thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.try_send(ControlCommand::Shutdown);
    }
}

impl Drop for ControlLoopHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            tracing::debug!("Waiting for control loop to stop...");
            let _ = handle.join();
        }
    }
}
