use crate::domain::config::{BAUD_RATE, READ_TIMEOUT};
use crate::domain::error::{PortLogError, PortLogResult};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, info, warn};

/// One open byte-stream endpoint for an attached peripheral.
///
/// Implementations are driven from a blocking worker; every call may block
/// for at most the configured read timeout.
pub trait DeviceHandle: Send {
    /// Identifier the device was opened with
    fn name(&self) -> &str;

    /// Whether the endpoint is still usable
    fn is_open(&self) -> bool;

    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> PortLogResult<usize>;

    /// Read up to and including the next `\n`.
    ///
    /// Returns a partial line when the read timeout elapses first.
    fn read_line(&mut self) -> PortLogResult<Vec<u8>>;

    /// Write raw bytes to the device
    fn write(&mut self, data: &[u8]) -> PortLogResult<()>;

    /// Release the endpoint. Calling this twice is harmless.
    fn close(&mut self);
}

/// Serial port backed [`DeviceHandle`]
pub struct SerialDevice {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl SerialDevice {
    /// Open `name` at the fixed baud rate and read timeout
    pub fn open(name: &str) -> PortLogResult<Self> {
        let port = serialport::new(name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| PortLogError::Device {
                message: format!("Failed to open serial port {}: {}", name, e),
            })?;

        info!("Serial port {} opened at {} baud", name, BAUD_RATE);

        Ok(Self {
            name: name.to_string(),
            port: Some(port),
            pending: Vec::new(),
        })
    }

    fn port_mut(&mut self) -> PortLogResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(PortLogError::DeviceNotConnected)
    }
}

fn take_line(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = pending.iter().position(|&b| b == b'\n')?;
    Some(pending.drain(..=end).collect())
}

/// Read from `reader` into `pending` until a full line is buffered.
///
/// A read timeout yields the partial line collected so far. End of stream
/// on a serial port means the device went away and is reported as an error.
fn read_line_from(reader: &mut impl Read, pending: &mut Vec<u8>, name: &str) -> PortLogResult<Vec<u8>> {
    let mut chunk = [0u8; 256];

    loop {
        if let Some(line) = take_line(pending) {
            return Ok(line);
        }

        match reader.read(&mut chunk) {
            Ok(0) => {
                return Err(PortLogError::Device {
                    message: format!("{} reported end of stream", name),
                });
            }
            Ok(n) => {
                debug!("Received {} bytes from {}", n, name);
                pending.extend_from_slice(&chunk[..n]);
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut => {
                return Ok(std::mem::take(pending));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

impl DeviceHandle for SerialDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn bytes_available(&mut self) -> PortLogResult<usize> {
        let buffered = self.pending.len();
        let waiting = self.port_mut()?.bytes_to_read()?;
        Ok(buffered + waiting as usize)
    }

    fn read_line(&mut self) -> PortLogResult<Vec<u8>> {
        let port = self.port.as_mut().ok_or(PortLogError::DeviceNotConnected)?;
        read_line_from(port, &mut self.pending, &self.name)
    }

    fn write(&mut self, data: &[u8]) -> PortLogResult<()> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        debug!("Sent {} bytes to {}", data.len(), self.name);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            if !self.pending.is_empty() {
                warn!("Discarding {} unread bytes from {}", self.pending.len(), self.name);
                self.pending.clear();
            }
            info!("Serial port {} closed", self.name);
        }
    }
}
