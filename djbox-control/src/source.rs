//! Raw encoder sample sources

use crate::sample::EncoderSample;
use thiserror::Error;

/// Sample source errors
///
/// All of these are transient from the control loop's point of view: the
/// tick is skipped and the next one polls again.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed packet: {0}")]
    Packet(String),
    #[error("Source disconnected")]
    Disconnected,
}

/// One physical encoder, polled once per tick
pub trait SampleSource: Send {
    /// Read the current sample
    ///
    /// `Ok(None)` means no data this tick.
    fn poll(&mut self) -> Result<Option<EncoderSample>, SourceError>;

    /// Source name (for logs)
    fn name(&self) -> &str;
}
