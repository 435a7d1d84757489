//! ESP32 encoder over Linux i2c-dev
//!
//! Each poll selects register 0 and reads one packet, the equivalent of an
//! SMBus block read. The ESP32 answers with whatever it measured last, so a
//! poll never blocks for long.

use crate::packet::{EncoderPacket, PacketLayout};
use crate::panel::{PanelEvent, PanelTracker};
use crossbeam_channel::Sender;
use djbox_control::{EncoderSample, SampleSource, SourceError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

/// ioctl: set the slave address for subsequent reads and writes
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// Register holding the packet
const DATA_REGISTER: u8 = 0;

/// Encoder attached to an ESP32 on the I2C bus
pub struct I2cEncoderSource {
    file: File,
    layout: PacketLayout,
    /// 0 = primary, 1 = secondary (extended layout)
    encoder: u8,
    name: String,
    buf: Vec<u8>,
    panel: Option<(PanelTracker, Sender<PanelEvent>)>,
}

impl I2cEncoderSource {
    /// Open `/dev/i2c-<bus>` and bind it to `address`
    pub fn open(
        bus: u8,
        address: u16,
        layout: PacketLayout,
        encoder: u8,
    ) -> Result<Self, SourceError> {
        let path = PathBuf::from(format!("/dev/i2c-{}", bus));
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        // SAFETY: fd is a valid open i2c-dev descriptor owned by `file`
        let rc = unsafe {
            libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, libc::c_ulong::from(address))
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        let name = format!("i2c-{}@0x{:02X}#{}", bus, address, encoder);
        tracing::info!("{}: opened {} ({:?} packets)", name, path.display(), layout);

        Ok(Self {
            file,
            layout,
            encoder,
            name,
            buf: vec![0u8; layout.size()],
            panel: None,
        })
    }

    /// Also report button and pot changes on `tx`
    pub fn with_panel_events(mut self, tx: Sender<PanelEvent>) -> Self {
        self.panel = Some((PanelTracker::new(), tx));
        self
    }

    fn read_packet(&mut self) -> Result<EncoderPacket, SourceError> {
        self.file.write_all(&[DATA_REGISTER])?;
        self.file.read_exact(&mut self.buf)?;
        Ok(EncoderPacket::decode(&self.buf, self.layout)?)
    }
}

impl SampleSource for I2cEncoderSource {
    fn poll(&mut self) -> Result<Option<EncoderSample>, SourceError> {
        let packet = self.read_packet()?;

        if let Some((tracker, tx)) = &mut self.panel {
            for event in tracker.update(&packet) {
                tracing::debug!("{}: {:?}", self.name, event);
                if tx.try_send(event).is_err() {
                    tracing::warn!("{}: panel channel full, dropping event", self.name);
                }
            }
        }

        Ok(Some(packet.sample(self.encoder)?))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
