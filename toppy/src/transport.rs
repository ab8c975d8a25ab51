//! Chunked bulk transport.
//!
//! Some host stacks cap a single bulk transfer at one page, so packets are
//! moved in chunks of at most [`MAX_TRANSFER`] bytes.

use std::time::Duration;

use log::{trace, warn};

use crate::error::Result;
use crate::port::Port;

/// Largest single bulk transfer.
pub const MAX_TRANSFER: usize = 4096;

/// Default timeout per transfer, long enough for the disk to spin up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(11000);

/// Bulk pipe pair to the device.
pub struct BulkTransport<P: Port> {
    port: P,
    timeout: Duration,
}

impl<P: Port> BulkTransport<P> {
    /// Wrap an opened port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-transfer timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Per-transfer timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get mutable access to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the transport, returning the port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Send `data`, chunked.
    ///
    /// Stops early when the device accepts nothing. Returns the number of
    /// bytes sent, which the caller must compare against `data.len()`.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if data.len() % 512 == 0 {
            warn!(
                "Bulk write of {} bytes is a multiple of 512, the device may hang",
                data.len()
            );
        }

        let mut sent = 0;
        while sent < data.len() {
            let end = (sent + MAX_TRANSFER).min(data.len());
            let n = self.port.write_chunk(&data[sent..end], self.timeout)?;
            trace!("wrote {n} bytes at {sent}");
            if n == 0 {
                break;
            }
            sent += n;
        }
        Ok(sent)
    }

    /// Receive into `buf`, chunked.
    ///
    /// A chunk shorter than requested ends the transfer. Returns the number
    /// of bytes received.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut received = 0;
        while received < buf.len() {
            let end = (received + MAX_TRANSFER).min(buf.len());
            let requested = end - received;
            let n = self.port.read_chunk(&mut buf[received..end], self.timeout)?;
            trace!("read {n} of {requested} bytes at {received}");
            received += n;
            if n < requested {
                break;
            }
        }
        Ok(received)
    }
}
