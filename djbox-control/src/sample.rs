//! Encoder samples and deck identifiers

use std::fmt;

/// One decoded reading of a physical encoder
///
/// Positions are kept as `i64` even though the device counter is 32-bit;
/// counter wraparound is not detected here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSample {
    /// Encoder position in counts (decreases when rotating in reverse)
    pub position: i64,
    /// Velocity as reported by the device (counts/second)
    pub velocity_raw: f64,
    /// Device clock in milliseconds
    pub timestamp_ms: u32,
}

impl EncoderSample {
    pub fn new(position: i64, velocity_raw: f64, timestamp_ms: u32) -> Self {
        Self {
            position,
            velocity_raw,
            timestamp_ms,
        }
    }

    /// Elapsed device time from `earlier` to `self` in seconds
    ///
    /// Negative when the device clock went backwards (e.g. after a reset).
    pub fn seconds_since(&self, earlier: &EncoderSample) -> f64 {
        (i64::from(self.timestamp_ms) - i64::from(earlier.timestamp_ms)) as f64 / 1000.0
    }
}

/// Identifier of a deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeckId(pub u8);

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deck {}", self.0)
    }
}
