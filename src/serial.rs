//! Blocking serial byte source for the ingest loop (spec §4.C, §6).
//!
//! The ingest loop's only requirement of its input is a blocking byte
//! stream (`std::io::Read`); device open and baud parsing are the only
//! parts of "talking to a serial port" this crate owns — raw-mode termios
//! configuration is explicitly out of scope (spec §1). Grounded on
//! `src/adapters/serial_adapter.rs`'s use of the `serialport` crate
//! (`serialport::new(name, baud).timeout(...).open()`), trimmed down from
//! that file's async command/response protocol to a direct blocking
//! reader, and feature-gated the same way the DAQ workspace gates its own
//! `instrument_serial` feature.

use crate::error::{AppResult, IngestError};

/// Parse the CLI's `device[,baud]` syntax (spec §6). Baud defaults to
/// 115200 when omitted.
pub fn parse_device_spec(spec: &str) -> AppResult<(String, u32)> {
    match spec.split_once(',') {
        Some((device, baud_str)) => {
            let baud = baud_str
                .parse::<u32>()
                .map_err(|_| IngestError::InvalidBaudRate(baud_str.to_string()))?;
            Ok((device.to_string(), baud))
        }
        None => Ok((spec.to_string(), 115_200)),
    }
}

#[cfg(feature = "serial")]
mod imp {
    use super::*;
    use std::io::Read;
    use std::time::Duration;

    /// A blocking byte source backed by a real serial port.
    pub struct SerialPort {
        inner: Box<dyn serialport::SerialPort>,
    }

    impl SerialPort {
        pub fn open(device: &str, baud: u32) -> AppResult<Self> {
            let inner = serialport::new(device, baud)
                .timeout(Duration::from_millis(100))
                .open()
                .map_err(|source| IngestError::SerialOpen {
                    device: device.to_string(),
                    baud,
                    source,
                })?;
            tracing::info!(device, baud, "opened serial port");
            Ok(Self { inner })
        }
    }

    impl Read for SerialPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }
}

#[cfg(feature = "serial")]
pub use imp::SerialPort;

/// Open the serial byte source named by `spec` (`device[,baud]`).
#[cfg(feature = "serial")]
pub fn open(spec: &str) -> AppResult<SerialPort> {
    let (device, baud) = parse_device_spec(spec)?;
    SerialPort::open(&device, baud)
}

#[cfg(not(feature = "serial"))]
pub fn open(_spec: &str) -> AppResult<std::io::Empty> {
    Err(IngestError::SerialFeatureDisabled)
}
