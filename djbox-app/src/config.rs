//! DJ box configuration file
//!
//! Stored as YAML. Default location: `<config dir>/djbox/djbox.yaml`.
//! Every section is optional; a missing file means stock settings.

use anyhow::{bail, Context};
use djbox_control::{ControlConfig, DeckId};
use djbox_input::{PacketLayout, SimulatedConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How decks map onto encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderMode {
    /// One turntable drives every deck
    #[default]
    Shared,
    /// One turntable per deck
    Dual,
}

/// Where samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    I2c,
    Simulated,
}

/// Encoder hardware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub source: SourceKind,
    /// Linux I2C bus number (`/dev/i2c-N`)
    pub i2c_bus: u8,
    /// ESP32 addresses, one per encoder board
    pub deck_addresses: Vec<u16>,
    pub decks: u8,
    pub encoder_mode: EncoderMode,
    pub packet: PacketLayout,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::I2c,
            i2c_bus: 1,
            deck_addresses: vec![0x42, 0x43],
            decks: 2,
            encoder_mode: EncoderMode::Shared,
            packet: PacketLayout::Basic,
        }
    }
}

/// One encoder and the decks it drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPlan {
    pub address: u16,
    /// Encoder index within the packet
    pub encoder: u8,
    pub decks: Vec<DeckId>,
}

impl HardwareConfig {
    /// Work out which encoder feeds which deck
    ///
    /// Dual mode with a single extended board uses both of its encoders.
    pub fn channel_plan(&self) -> anyhow::Result<Vec<ChannelPlan>> {
        if self.decks == 0 {
            bail!("At least one deck is required");
        }
        let Some(&first) = self.deck_addresses.first() else {
            bail!("No deck addresses configured");
        };

        match self.encoder_mode {
            EncoderMode::Shared => Ok(vec![ChannelPlan {
                address: first,
                encoder: 0,
                decks: (0..self.decks).map(DeckId).collect(),
            }]),
            EncoderMode::Dual => {
                let single_board = self.deck_addresses.len() == 1
                    && self.packet == PacketLayout::Extended
                    && self.decks <= 2;
                if single_board {
                    return Ok((0..self.decks)
                        .map(|i| ChannelPlan {
                            address: first,
                            encoder: i,
                            decks: vec![DeckId(i)],
                        })
                        .collect());
                }
                if self.deck_addresses.len() < self.decks as usize {
                    bail!(
                        "Dual encoder mode needs {} addresses, got {}",
                        self.decks,
                        self.deck_addresses.len()
                    );
                }
                Ok(self
                    .deck_addresses
                    .iter()
                    .take(self.decks as usize)
                    .zip(0..self.decks)
                    .map(|(&address, i)| ChannelPlan {
                        address,
                        encoder: 0,
                        decks: vec![DeckId(i)],
                    })
                    .collect())
            }
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxConfig {
    pub control: ControlConfig,
    pub hardware: HardwareConfig,
    pub simulated: SimulatedConfig,
    /// Interval between status log lines
    pub status_interval_ms: u64,
    /// Deck driven by the panel's volume pot
    pub panel_deck: u8,
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            hardware: HardwareConfig::default(),
            simulated: SimulatedConfig::default(),
            status_interval_ms: 1000,
            panel_deck: 0,
        }
    }
}

impl BoxConfig {
    /// Load from a YAML file; a missing file gives the defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Check the whole configuration before anything is built
    pub fn validate(&self) -> anyhow::Result<()> {
        self.control.validate()?;
        self.hardware.channel_plan()?;
        if self.panel_deck >= self.hardware.decks {
            bail!(
                "Panel deck {} does not exist ({} decks)",
                self.panel_deck,
                self.hardware.decks
            );
        }
        Ok(())
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("djbox")
            .join("djbox.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use djbox_control::{EstimatorKind, RateStrategyKind};

    #[test]
    fn test_empty_is_default() {
        let config = BoxConfig::parse("{}").unwrap();
        assert_eq!(config, BoxConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let yaml = "
control:
  estimator: windowed
  rate_strategy: smoothed
  normal_speed_band: [-130, -70]
hardware:
  source: simulated
  encoder_mode: dual
  deck_addresses: [66, 67]
status_interval_ms: 500
";
        let config = BoxConfig::parse(yaml).unwrap();
        assert_eq!(config.control.estimator, EstimatorKind::Windowed);
        assert_eq!(config.control.rate_strategy, RateStrategyKind::Smoothed);
        assert_eq!(config.control.normal_speed_band, (-130.0, -70.0));
        assert_eq!(config.control.max_playback_rate, 3.0);
        assert_eq!(config.hardware.source, SourceKind::Simulated);
        assert_eq!(config.hardware.i2c_bus, 1);
        assert_eq!(config.status_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(BoxConfig::parse("control: [1, 2").is_err());
        assert!(BoxConfig::parse("hardware:\n  encoder_mode: triple\n").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_control() {
        let mut config = BoxConfig::default();
        config.control.min_playback_rate = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("djbox-missing-config-test.yaml");
        let config = BoxConfig::load(&path).unwrap();
        assert_eq!(config, BoxConfig::default());
    }

    #[test]
    fn test_shared_plan() {
        let plan = HardwareConfig::default().channel_plan().unwrap();
        assert_eq!(
            plan,
            vec![ChannelPlan {
                address: 0x42,
                encoder: 0,
                decks: vec![DeckId(0), DeckId(1)],
            }]
        );
    }

    #[test]
    fn test_dual_plan_two_boards() {
        let hardware = HardwareConfig {
            encoder_mode: EncoderMode::Dual,
            ..Default::default()
        };
        let plan = hardware.channel_plan().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].address, 0x43);
        assert_eq!(plan[1].decks, vec![DeckId(1)]);
    }

    #[test]
    fn test_dual_plan_single_extended_board() {
        let hardware = HardwareConfig {
            encoder_mode: EncoderMode::Dual,
            packet: PacketLayout::Extended,
            deck_addresses: vec![0x42],
            ..Default::default()
        };
        let plan = hardware.channel_plan().unwrap();
        assert_eq!(plan[0].encoder, 0);
        assert_eq!(plan[1].encoder, 1);
        assert_eq!(plan[1].address, 0x42);
    }

    #[test]
    fn test_dual_plan_missing_address() {
        let hardware = HardwareConfig {
            encoder_mode: EncoderMode::Dual,
            deck_addresses: vec![0x42],
            ..Default::default()
        };
        assert!(hardware.channel_plan().is_err());

        let hardware = HardwareConfig {
            deck_addresses: Vec::new(),
            ..Default::default()
        };
        assert!(hardware.channel_plan().is_err());
    }

    #[test]
    fn test_panel_deck_must_exist() {
        let config = BoxConfig {
            panel_deck: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
