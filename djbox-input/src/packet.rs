//! ESP32 encoder packet decoding
//!
//! All fields are little-endian. Velocity is sent as fixed point (x100).
//!
//! Basic layout (12 bytes):
//! ```text
//!  0..4   position    i32
//!  4..8   velocity    i32  (counts/s x 100)
//!  8..12  timestamp   u32  (device ms)
//! ```
//!
//! Extended layout (25 bytes) appends:
//! ```text
//! 12..16  position 2  i32
//! 16..20  velocity 2  i32
//! 20      buttons     u8   (bit per button)
//! 21..23  volume pot  u16  (0-4095)
//! 23..25  slider pot  u16  (0-4095)
//! ```

use djbox_control::{EncoderSample, SourceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BASIC_PACKET_SIZE: usize = 12;
pub const EXTENDED_PACKET_SIZE: usize = 25;

/// Velocity fixed-point divisor
pub const VELOCITY_SCALE: f64 = 100.0;

/// Full scale of the ESP32's 12-bit ADC
pub const POT_MAX: u16 = 4095;

/// Packet decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Packet too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Encoder {0} not present in packet")]
    MissingEncoder(u8),
}

impl From<PacketError> for SourceError {
    fn from(e: PacketError) -> Self {
        SourceError::Packet(e.to_string())
    }
}

/// Which packet layout the firmware sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketLayout {
    /// One encoder
    #[default]
    Basic,
    /// Two encoders, buttons and pots
    Extended,
}

impl PacketLayout {
    /// Bytes to read from the device
    pub fn size(&self) -> usize {
        match self {
            PacketLayout::Basic => BASIC_PACKET_SIZE,
            PacketLayout::Extended => EXTENDED_PACKET_SIZE,
        }
    }
}

/// Panel buttons on the extended firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Sfx1,
    Sfx2,
    Sfx3,
    Sfx4,
    Song1,
    Song2,
}

impl Button {
    pub const ALL: [Button; 6] = [
        Button::Sfx1,
        Button::Sfx2,
        Button::Sfx3,
        Button::Sfx4,
        Button::Song1,
        Button::Song2,
    ];

    /// Bit in the packet's button byte
    pub fn mask(&self) -> u8 {
        match self {
            Button::Sfx1 => 1 << 0,
            Button::Sfx2 => 1 << 1,
            Button::Sfx3 => 1 << 2,
            Button::Sfx4 => 1 << 3,
            Button::Song1 => 1 << 4,
            Button::Song2 => 1 << 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Button::Sfx1 => "SFX 1",
            Button::Sfx2 => "SFX 2",
            Button::Sfx3 => "SFX 3",
            Button::Sfx4 => "SFX 4",
            Button::Song1 => "SONG 1",
            Button::Song2 => "SONG 2",
        }
    }
}

/// Button state bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons(pub u8);

impl Buttons {
    pub fn is_pressed(&self, button: Button) -> bool {
        self.0 & button.mask() != 0
    }

    /// Pressed buttons, in bit order
    pub fn pressed(&self) -> impl Iterator<Item = Button> + '_ {
        Button::ALL.into_iter().filter(|b| self.is_pressed(*b))
    }
}

/// Raw reading of one encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderReading {
    pub position: i32,
    /// Velocity x 100
    pub velocity_fixed: i32,
}

impl EncoderReading {
    pub fn velocity(&self) -> f64 {
        self.velocity_fixed as f64 / VELOCITY_SCALE
    }
}

/// Second encoder and panel controls (extended layout only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedInputs {
    pub secondary: EncoderReading,
    pub buttons: Buttons,
    pub volume_pot: u16,
    pub slider_pot: u16,
}

/// One decoded packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderPacket {
    pub primary: EncoderReading,
    pub timestamp_ms: u32,
    pub extended: Option<ExtendedInputs>,
}

impl EncoderPacket {
    /// Decode a packet; trailing bytes beyond the layout are ignored
    pub fn decode(bytes: &[u8], layout: PacketLayout) -> Result<Self, PacketError> {
        if bytes.len() < layout.size() {
            return Err(PacketError::TooShort {
                expected: layout.size(),
                actual: bytes.len(),
            });
        }

        let primary = EncoderReading {
            position: read_i32(bytes, 0),
            velocity_fixed: read_i32(bytes, 4),
        };
        let timestamp_ms = read_u32(bytes, 8);

        let extended = match layout {
            PacketLayout::Basic => None,
            PacketLayout::Extended => Some(ExtendedInputs {
                secondary: EncoderReading {
                    position: read_i32(bytes, 12),
                    velocity_fixed: read_i32(bytes, 16),
                },
                buttons: Buttons(bytes[20]),
                volume_pot: read_u16(bytes, 21),
                slider_pot: read_u16(bytes, 23),
            }),
        };

        Ok(Self {
            primary,
            timestamp_ms,
            extended,
        })
    }

    /// Sample for encoder 0 (primary) or 1 (secondary)
    pub fn sample(&self, encoder: u8) -> Result<EncoderSample, PacketError> {
        let reading = match (encoder, &self.extended) {
            (0, _) => self.primary,
            (1, Some(ext)) => ext.secondary,
            _ => return Err(PacketError::MissingEncoder(encoder)),
        };
        Ok(EncoderSample::new(
            reading.position as i64,
            reading.velocity(),
            self.timestamp_ms,
        ))
    }

    /// Volume pot as 0.0 - 1.0
    pub fn volume(&self) -> Option<f64> {
        self.extended.map(|ext| normalize_pot(ext.volume_pot))
    }

    /// Slider pot as 0.0 - 1.0
    pub fn slider(&self) -> Option<f64> {
        self.extended.map(|ext| normalize_pot(ext.slider_pot))
    }

    /// Button state (none pressed for the basic layout)
    pub fn buttons(&self) -> Buttons {
        self.extended.map(|ext| ext.buttons).unwrap_or_default()
    }
}

/// Map a 12-bit reading to 0.0 - 1.0
pub fn normalize_pot(raw: u16) -> f64 {
    raw.min(POT_MAX) as f64 / POT_MAX as f64
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}
