//! Topfield USB protocol: framing, commands and record formats.

pub mod command;
pub mod crc;
pub mod packet;
pub mod timestamp;
pub mod typefile;

// Re-export common types
pub use command::{Command, DeviceError, Direction};
pub use packet::{CrcMode, Packet, PacketBuf};
pub use timestamp::DeviceTime;
pub use typefile::{DirEntry, FileKind};
