//! Topfield command codes and device error reasons.
//!
//! The numeric values are fixed by the device firmware.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

/// Command and status codes carried in the `cmd` field of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Generic failure reply; payload starts with a u32 error code.
    Fail = 0x0001,
    /// Generic success / acknowledge.
    Success = 0x0002,
    /// Cancel the operation in progress.
    Cancel = 0x0003,

    /// Ask whether the device is ready.
    Ready = 0x0100,
    /// Reboot the device.
    Reset = 0x0101,
    /// Switch turbo mode on or off.
    Turbo = 0x0102,

    /// Ask for total and free disk space.
    HddSize = 0x1000,
    /// Disk space reply.
    HddSizeData = 0x1001,

    /// List a directory.
    HddDir = 0x1002,
    /// One chunk of directory entries.
    HddDirData = 0x1003,
    /// End of directory listing.
    HddDirEnd = 0x1004,

    /// Delete a file or directory.
    HddDelete = 0x1005,
    /// Rename a file or directory.
    HddRename = 0x1006,
    /// Create a directory.
    HddCreateDir = 0x1007,

    /// Start a file transfer in either direction.
    HddFileSend = 0x1008,
    /// File transfer header (one typefile record).
    FileStart = 0x1009,
    /// File transfer data (u64 offset + bytes).
    FileData = 0x100A,
    /// End of file transfer.
    FileEnd = 0x100B,
}

impl Command {
    /// Numeric code of this command.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Look up a command by its numeric code.
    pub fn from_code(code: u32) -> Option<Self> {
        let cmd = match code {
            0x0001 => Self::Fail,
            0x0002 => Self::Success,
            0x0003 => Self::Cancel,
            0x0100 => Self::Ready,
            0x0101 => Self::Reset,
            0x0102 => Self::Turbo,
            0x1000 => Self::HddSize,
            0x1001 => Self::HddSizeData,
            0x1002 => Self::HddDir,
            0x1003 => Self::HddDirData,
            0x1004 => Self::HddDirEnd,
            0x1005 => Self::HddDelete,
            0x1006 => Self::HddRename,
            0x1007 => Self::HddCreateDir,
            0x1008 => Self::HddFileSend,
            0x1009 => Self::FileStart,
            0x100A => Self::FileData,
            0x100B => Self::FileEnd,
            _ => return None,
        };
        Some(cmd)
    }

    /// Whether the device sends this code as a positive reply.
    pub fn is_reply(self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::HddSizeData
                | Self::HddDirData
                | Self::HddDirEnd
                | Self::FileStart
                | Self::FileData
                | Self::FileEnd
        )
    }
}

/// Direction byte of an `HddFileSend` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    /// Host to device.
    Put = 0,
    /// Device to host.
    Get = 1,
}

/// Failure reason carried by a `Fail` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The device saw a bad CRC.
    Crc,
    /// Command not known to the device.
    UnknownCommand,
    /// Command not valid in the current state.
    InvalidCommand,
    /// Bad block size.
    InvalidBlockSize,
    /// Internal error while running the command.
    Running,
    /// Disk is full.
    MemoryFull,
    /// Any code without a fixed meaning.
    Other(u32),
}

impl DeviceError {
    /// Map a device error code to its reason.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Crc,
            2 | 4 => Self::UnknownCommand,
            3 => Self::InvalidCommand,
            5 => Self::InvalidBlockSize,
            6 => Self::Running,
            7 => Self::MemoryFull,
            other => Self::Other(other),
        }
    }

    /// Raw error code of a `Fail` payload: its first big-endian u32, or 0
    /// when the payload is too short to hold one.
    pub fn payload_code(payload: &[u8]) -> u32 {
        payload.get(..4).map_or(0, BigEndian::read_u32)
    }

    /// Decode the reason from a `Fail` payload.
    pub fn from_payload(payload: &[u8]) -> Self {
        Self::from_code(Self::payload_code(payload))
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crc => write!(f, "CRC error"),
            Self::UnknownCommand => write!(f, "Unknown command"),
            Self::InvalidCommand => write!(f, "Invalid command"),
            Self::InvalidBlockSize => write!(f, "Invalid block size"),
            Self::Running => write!(f, "Unknown error while running"),
            Self::MemoryFull => write!(f, "Memory is full"),
            Self::Other(code) => write!(f, "Unknown error (code {code})"),
        }
    }
}
