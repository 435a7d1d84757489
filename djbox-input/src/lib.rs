//! Encoder input for the DJ box
//!
//! Sample sources feeding the turntable controller: the ESP32 over I2C
//! (Linux only) and a simulated turntable.

mod packet;
mod panel;
mod simulated;

#[cfg(target_os = "linux")]
mod i2c;

pub use packet::{
    normalize_pot, Button, Buttons, EncoderPacket, EncoderReading, ExtendedInputs, PacketError,
    PacketLayout, BASIC_PACKET_SIZE, EXTENDED_PACKET_SIZE, POT_MAX, VELOCITY_SCALE,
};
pub use panel::{PanelEvent, PanelTracker, POT_DEADBAND};
pub use simulated::{SimulatedConfig, SimulatedTurntable};

#[cfg(target_os = "linux")]
pub use i2c::I2cEncoderSource;
