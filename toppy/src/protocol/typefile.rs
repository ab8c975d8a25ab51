//! Directory entries ("typefile" records).
//!
//! Directory listings and the `FILE_START` header of a transfer both carry
//! packed 114-byte records:
//!
//! ```text
//! +-----------+------+--------+-----------+--------+--------+
//! |   stamp   | type |  size  |   name    | unused | attrib |
//! +-----------+------+--------+-----------+--------+--------+
//! |  5 bytes  |  u8  | u64 BE | 95 bytes  |   u8   | u32 BE |
//! +-----------+------+--------+-----------+--------+--------+
//! ```
//!
//! The name is nul-terminated, so at most 94 bytes are usable.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::protocol::timestamp::{self, DeviceTime};

/// Size of one encoded record.
pub const RECORD_SIZE: usize = 114;

/// Size of the name field, including the terminator.
pub const NAME_FIELD_SIZE: usize = 95;

/// Longest name that fits in a record.
pub const MAX_NAME_LEN: usize = NAME_FIELD_SIZE - 1;

const TYPE_OFFSET: usize = timestamp::WIRE_SIZE;
const SIZE_OFFSET: usize = TYPE_OFFSET + 1;
const NAME_OFFSET: usize = SIZE_OFFSET + 8;
const UNUSED_OFFSET: usize = NAME_OFFSET + NAME_FIELD_SIZE;
const ATTRIB_OFFSET: usize = UNUSED_OFFSET + 1;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FileKind {
    /// A directory (type 1).
    Directory,
    /// A regular file (type 2).
    File,
    /// Any other type byte.
    Unknown(u8),
}

impl FileKind {
    /// Map the wire type byte.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Directory,
            2 => Self::File,
            other => Self::Unknown(other),
        }
    }

    /// Wire type byte.
    pub fn code(self) -> u8 {
        match self {
            Self::Directory => 1,
            Self::File => 2,
            Self::Unknown(code) => code,
        }
    }

    /// One-letter marker used in listings: `d`, `f` or `?`.
    pub fn marker(self) -> char {
        match self {
            Self::Directory => 'd',
            Self::File => 'f',
            Self::Unknown(_) => '?',
        }
    }
}

/// One file or directory on the device's disk.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirEntry {
    /// Modification time.
    pub stamp: DeviceTime,
    /// Entry kind.
    pub kind: FileKind,
    /// Size in bytes.
    pub size: u64,
    /// Name (or, in a transfer header, the remote path).
    pub name: String,
    /// Attribute bits, opaque to the host.
    pub attrib: u32,
}

impl DirEntry {
    /// Entry describing a regular file about to be uploaded.
    ///
    /// Names longer than [`MAX_NAME_LEN`] bytes are cut at the last
    /// character boundary that fits.
    pub fn file(name: &str, size: u64, stamp: DeviceTime) -> Self {
        Self {
            stamp,
            kind: FileKind::File,
            size,
            name: truncate_name(name).to_string(),
            attrib: 0,
        }
    }

    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Decode one record.
    pub fn from_bytes(b: &[u8]) -> Result<Self> {
        if b.len() != RECORD_SIZE {
            return Err(Error::MalformedPacket(format!(
                "directory record is {} bytes, expected {RECORD_SIZE}",
                b.len()
            )));
        }

        let mut stamp = [0u8; timestamp::WIRE_SIZE];
        stamp.copy_from_slice(&b[..TYPE_OFFSET]);

        let name_field = &b[NAME_OFFSET..UNUSED_OFFSET];
        let name_len = name_field
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_FIELD_SIZE);

        Ok(Self {
            stamp: DeviceTime::from_bytes(&stamp),
            kind: FileKind::from_code(b[TYPE_OFFSET]),
            size: BigEndian::read_u64(&b[SIZE_OFFSET..NAME_OFFSET]),
            name: String::from_utf8_lossy(&name_field[..name_len]).into_owned(),
            attrib: BigEndian::read_u32(&b[ATTRIB_OFFSET..]),
        })
    }

    /// Encode into one record. The name is truncated to fit.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut b = [0u8; RECORD_SIZE];
        b[..TYPE_OFFSET].copy_from_slice(&self.stamp.to_bytes());
        b[TYPE_OFFSET] = self.kind.code();
        BigEndian::write_u64(&mut b[SIZE_OFFSET..NAME_OFFSET], self.size);

        let name = truncate_name(&self.name).as_bytes();
        b[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name);

        BigEndian::write_u32(&mut b[ATTRIB_OFFSET..], self.attrib);
        b
    }
}

/// Decode the records of a directory listing payload.
pub fn decode_entries(payload: &[u8]) -> Result<Vec<DirEntry>> {
    if payload.len() % RECORD_SIZE != 0 {
        return Err(Error::MalformedPacket(format!(
            "directory payload of {} bytes is not a multiple of {RECORD_SIZE}",
            payload.len()
        )));
    }
    payload
        .chunks_exact(RECORD_SIZE)
        .map(DirEntry::from_bytes)
        .collect()
}

fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
