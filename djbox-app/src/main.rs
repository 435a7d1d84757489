//! DJ box - turntable controller
//!
//! Reads the turntable encoder(s), runs the control loop and forwards the
//! resulting playback rate and volume to the player.
//!
//! Usage: `djbox [config.yaml]`

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use djbox_control::{
    ChannelSink, ControlCommand, ControlEvent, ControlLoop, DeckController, DeckId,
    EncoderChannel, PlaybackCommand, PlaybackSink, SampleSource,
};
use djbox_input::{PanelEvent, SimulatedTurntable};
use tracing_subscriber::EnvFilter;

use crate::config::{BoxConfig, ChannelPlan, SourceKind};

/// Queue depth towards the player
const PLAYBACK_QUEUE: usize = 1024;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(BoxConfig::default_path);
    let config = BoxConfig::load(&path)?;
    config.validate()?;

    let (sink, playback_rx) = ChannelSink::channel(PLAYBACK_QUEUE);
    let sink: Arc<dyn PlaybackSink> = Arc::new(sink);
    let (panel_tx, panel_rx) = bounded(256);

    let channels = build_channels(&config, sink, panel_tx)?;
    let control = ControlLoop::new(channels, &config.control)?
        .with_status_interval(config.status_interval());
    let handle = control.spawn()?;

    let playback = spawn_playback(playback_rx)?;
    let panel = spawn_panel(panel_rx, handle.commands(), DeckId(config.panel_deck))?;

    tracing::info!("DJ box running ({:?} source)", config.hardware.source);

    // Runs until the control loop stops
    while let Ok(event) = handle.events().recv() {
        match event {
            ControlEvent::StateUpdate { decks, channels } => {
                for deck in &decks {
                    tracing::info!(
                        "{}: {:<10} rate {:.3}  volume {:.2}  velocity {:>8.1}",
                        deck.deck,
                        deck.state.name(),
                        deck.current_rate,
                        deck.current_volume,
                        deck.velocity
                    );
                }
                for (name, stats) in &channels {
                    if stats.errors > 0 {
                        tracing::info!(
                            "{}: {} polls, error rate {:.2}%",
                            name,
                            stats.total_polls,
                            stats.error_rate() * 100.0
                        );
                    }
                }
            }
            ControlEvent::Error(msg) => tracing::warn!("Control loop: {}", msg),
        }
    }

    drop(handle);
    let _ = playback.join();
    let _ = panel.join();
    Ok(())
}

/// Build encoder channels and their decks from the config
fn build_channels(
    config: &BoxConfig,
    sink: Arc<dyn PlaybackSink>,
    panel_tx: Sender<PanelEvent>,
) -> anyhow::Result<Vec<EncoderChannel>> {
    let mut channels = Vec::new();
    let mut panel_tx = Some(panel_tx);

    for plan in config.hardware.channel_plan()? {
        // The panel is read once, with the first encoder
        let source = open_source(config, &plan, panel_tx.take())?;
        let decks = plan
            .decks
            .iter()
            .map(|id| DeckController::new(*id, &config.control, sink.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        channels.push(EncoderChannel::new(source, decks));
    }

    Ok(channels)
}

fn open_source(
    config: &BoxConfig,
    plan: &ChannelPlan,
    panel_tx: Option<Sender<PanelEvent>>,
) -> anyhow::Result<Box<dyn SampleSource>> {
    match config.hardware.source {
        SourceKind::Simulated => {
            let name = format!("sim@0x{:02X}#{}", plan.address, plan.encoder);
            Ok(Box::new(SimulatedTurntable::new(name, config.simulated.clone())))
        }
        SourceKind::I2c => open_i2c(config, plan, panel_tx),
    }
}

#[cfg(target_os = "linux")]
fn open_i2c(
    config: &BoxConfig,
    plan: &ChannelPlan,
    panel_tx: Option<Sender<PanelEvent>>,
) -> anyhow::Result<Box<dyn SampleSource>> {
    use anyhow::Context;
    use djbox_input::{I2cEncoderSource, PacketLayout};

    let hw = &config.hardware;
    let mut source = I2cEncoderSource::open(hw.i2c_bus, plan.address, hw.packet, plan.encoder)
        .with_context(|| {
            format!(
                "Failed to open encoder 0x{:02X} on /dev/i2c-{}",
                plan.address, hw.i2c_bus
            )
        })?;
    if let (Some(tx), PacketLayout::Extended) = (panel_tx, hw.packet) {
        source = source.with_panel_events(tx);
    }
    Ok(Box::new(source))
}

#[cfg(not(target_os = "linux"))]
fn open_i2c(
    _config: &BoxConfig,
    _plan: &ChannelPlan,
    _panel_tx: Option<Sender<PanelEvent>>,
) -> anyhow::Result<Box<dyn SampleSource>> {
    anyhow::bail!("I2C encoders are only supported on Linux; use the simulated source")
}

/// Player side of the channel sink
///
/// Audio output is not part of the box yet, so commands are only logged.
fn spawn_playback(rx: Receiver<PlaybackCommand>) -> anyhow::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("djbox-playback".to_string())
        .spawn(move || {
            for cmd in rx {
                match cmd {
                    PlaybackCommand::SetRate { deck, rate } => {
                        tracing::debug!("{}: playback rate {:.3}", deck, rate)
                    }
                    PlaybackCommand::SetVolume { deck, volume } => {
                        tracing::debug!("{}: playback volume {:.2}", deck, volume)
                    }
                }
            }
        })?;
    Ok(handle)
}

/// Map panel controls to control loop commands
fn spawn_panel(
    rx: Receiver<PanelEvent>,
    commands: Sender<ControlCommand>,
    volume_deck: DeckId,
) -> anyhow::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("djbox-panel".to_string())
        .spawn(move || {
            for event in rx {
                match event {
                    PanelEvent::Volume(volume) => {
                        if commands
                            .try_send(ControlCommand::SetVolume(volume_deck, volume))
                            .is_err()
                        {
                            tracing::warn!("Control loop not accepting commands");
                        }
                    }
                    PanelEvent::Slider(value) => tracing::debug!("Slider {:.2}", value),
                    PanelEvent::ButtonPressed(button) => {
                        tracing::info!("{} pressed", button.name())
                    }
                    PanelEvent::ButtonReleased(button) => {
                        tracing::debug!("{} released", button.name())
                    }
                }
            }
        })?;
    Ok(handle)
}
