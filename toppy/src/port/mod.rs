//! Port abstraction for USB bulk communication.
//!
//! A [`Port`] is one opened and claimed device interface with a bulk-out and
//! a bulk-in endpoint. It performs exactly one low-level transfer per call;
//! chunking and packet semantics live above it, in
//! [`BulkTransport`](crate::transport::BulkTransport).
//!
//! ## Architecture
//!
//! ```text
//! +------------------+
//! |  Toppy (device)  |   commands, transfers
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  BulkTransport   |   4 KiB chunking
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+     +------------------+
//! |   Port Trait     | <-- |  NativePort      |
//! +------------------+     |  (nusb)          |
//!                          +------------------+
//! ```
//!
//! Keeping I/O behind the trait lets the protocol layer be tested against an
//! in-memory port.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use toppy::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> toppy::Result<()> {
//!     port.write_chunk(&[0x08, 0x00, 0x81, 0xc1, 0x00, 0x00, 0x02, 0x00], Duration::from_secs(1))?;
//!
//!     let mut buf = [0u8; 512];
//!     let n = port.read_chunk(&mut buf, Duration::from_secs(1))?;
//!     println!("Received: {:?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use crate::error::Result;

/// Topfield USB vendor ID.
pub const TOPFIELD_VID: u16 = 0x11DB;

/// USB product ID of the TF5000PVRt family.
pub const TOPFIELD_PID: u16 = 0x1000;

/// Bulk-out endpoint address.
pub const BULK_OUT_EP: u8 = 0x01;

/// Bulk-in endpoint address.
pub const BULK_IN_EP: u8 = 0x82;

/// USB device information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortInfo {
    /// Display name, `bus-address`.
    pub name: String,
    /// Platform bus identifier.
    pub bus: String,
    /// Device address on the bus.
    pub address: u8,
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Whether this is a Topfield PVR.
    pub fn is_toppy(&self) -> bool {
        self.vid == TOPFIELD_VID && self.pid == TOPFIELD_PID
    }
}

/// One claimed USB interface with a bulk endpoint pair.
pub trait Port: Send {
    /// Perform one bulk-out transfer. Returns the bytes the device accepted.
    fn write_chunk(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Perform one bulk-in transfer. Returns the bytes received, which may
    /// be fewer than `buf.len()` when the device ends the transfer early.
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Get the port name.
    fn name(&self) -> &str;

    /// Release the interface.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;
}

/// Trait for listing attached devices.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all attached USB devices.
    fn list_ports() -> Result<Vec<PortInfo>>;

    /// Find devices matching the given VID/PID.
    fn find_by_vid_pid(vid: u16, pid: u16) -> Result<Vec<PortInfo>> {
        let ports = Self::list_ports()?;
        Ok(ports
            .into_iter()
            .filter(|p| p.vid == vid && p.pid == pid)
            .collect())
    }

    /// Find attached Topfield PVRs.
    fn find_toppies() -> Result<Vec<PortInfo>> {
        let ports = Self::list_ports()?;
        Ok(ports.into_iter().filter(PortInfo::is_toppy).collect())
    }
}

// Re-export the appropriate implementation based on features
#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
