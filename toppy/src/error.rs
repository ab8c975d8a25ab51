//! Error types for toppy.

use std::io;
use thiserror::Error;

use crate::protocol::command::DeviceError;

/// Result type for toppy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for toppy operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (local files, port I/O).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// USB error while opening or claiming the device.
    #[cfg(feature = "native")]
    #[error("USB error: {0}")]
    Usb(nusb::Error),

    /// USB bulk transfer error.
    #[cfg(feature = "native")]
    #[error("USB transfer error: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    /// A bulk transfer did not complete within the protocol timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Fewer bytes were written to the device than requested.
    #[error("Short write: sent {sent} of {expected} bytes")]
    ShortWrite {
        /// Bytes actually sent.
        sent: usize,
        /// Bytes that should have been sent.
        expected: usize,
    },

    /// No Topfield device found.
    #[error("Device not found")]
    DeviceNotFound,

    /// More than one device matched and none was selected.
    #[error("Multiple Topfield devices found: {}", .0.join(", "))]
    MultipleDevices(Vec<String>),

    /// A received packet could not be parsed.
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// A received packet is shorter than its declared length.
    #[error("Short packet: received {received} bytes, header declares {declared}")]
    ShortPacket {
        /// Length declared in the packet header.
        declared: usize,
        /// Bytes actually received.
        received: usize,
    },

    /// CRC checksum mismatch (only raised in strict CRC mode).
    #[error("CRC mismatch: packet carries {expected:#06x}, computed {actual:#06x}")]
    CrcMismatch {
        /// CRC carried by the packet.
        expected: u16,
        /// CRC computed over the packet contents.
        actual: u16,
    },

    /// Packet would exceed the maximum packet size.
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    /// Path does not fit in a request packet.
    #[error("Path is too long: {0}")]
    PathTooLong(String),

    /// The device answered with a command code that is not valid here.
    #[error("Unexpected reply from device: {0}")]
    UnexpectedReply(String),

    /// The device reported a failure.
    #[error("Device reports {0}")]
    Device(DeviceError),

    /// The local source file is empty.
    #[error("Source file is empty - not transferring: {0}")]
    EmptySource(String),

    /// A local file could not be opened or examined.
    #[error("{context}: {source}")]
    LocalFile {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A device timestamp does not describe a valid local time.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The operation was interrupted by the embedding application.
    #[error("Operation interrupted")]
    Interrupted,
}

impl Error {
    /// Build an [`Error::UnexpectedReply`] for a raw command code.
    pub(crate) fn unexpected(cmd: u32) -> Self {
        Self::UnexpectedReply(format!("cmd {cmd:#06x}"))
    }

    /// Whether this error came from the transport below the protocol.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout(_) | Self::ShortWrite { .. } => true,
            #[cfg(feature = "native")]
            Self::Usb(_) | Self::Transfer(_) => true,
            _ => false,
        }
    }

    /// Whether the device violated the protocol (framing, CRC, sequencing).
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::MalformedPacket(_)
                | Self::ShortPacket { .. }
                | Self::CrcMismatch { .. }
                | Self::UnexpectedReply(_)
                | Self::PacketTooLarge(_)
                | Self::PathTooLong(_)
        )
    }
}
