//! Topfield packet framing.
//!
//! ## Packet Format
//!
//! ```text
//! +--------+--------+--------+-------------------+
//! | Length |  CRC   |  Cmd   |      Payload      |
//! +--------+--------+--------+-------------------+
//! | u16 BE | u16 BE | u32 BE |     variable      |
//! +--------+--------+--------+-------------------+
//! ```
//!
//! `Length` counts the header and the payload. The CRC covers `Cmd` and the
//! payload. A packet is built big-endian in memory, padded to an even size,
//! and then every adjacent byte pair is swapped before it goes on the wire.
//! Incoming packets are swapped back the same way.

use std::fmt::Write as _;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use log::{trace, warn};

use crate::error::{Error, Result};
use crate::protocol::command::{Command, Direction};
use crate::protocol::crc::crc16_ansi;
use crate::protocol::typefile::DirEntry;

/// Size of the packet header.
pub const HEADER_SIZE: usize = 8;

/// Largest packet the device accepts.
pub const MAX_PACKET_SIZE: usize = 0xFFFF;

/// Largest payload that fits in one packet.
pub const MAX_PAYLOAD: usize = MAX_PACKET_SIZE - HEADER_SIZE;

/// Size of a receive buffer able to hold any packet.
pub const RECEIVE_BUFFER_SIZE: usize = 0x10000;

/// `SUCCESS` as transmitted, CRC and byte swap included.
pub const SUCCESS_WIRE: [u8; HEADER_SIZE] = [0x08, 0x00, 0x81, 0xC1, 0x00, 0x00, 0x02, 0x00];

/// `CANCEL` as transmitted, CRC and byte swap included.
pub const CANCEL_WIRE: [u8; HEADER_SIZE] = [0x08, 0x00, 0x40, 0x01, 0x00, 0x00, 0x03, 0x00];

/// How to treat a CRC mismatch on a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcMode {
    /// Log a warning and accept the packet.
    #[default]
    Warn,
    /// Do not check at all (some accelerated firmwares send garbage CRCs).
    Ignore,
    /// Reject the packet with [`Error::CrcMismatch`].
    Strict,
}

/// Swap every adjacent byte pair in place. A trailing odd byte is left alone.
pub fn byte_swap(data: &mut [u8]) {
    for pair in data.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

/// Whether raw, still swapped bytes carry the given command.
///
/// Used to acknowledge `FILE_DATA` before spending time on decoding.
pub fn is_raw_command(raw: &[u8], cmd: Command) -> bool {
    let [a, b, c, d] = cmd.code().to_be_bytes();
    raw.len() >= HEADER_SIZE && raw[4..HEADER_SIZE] == [b, a, d, c]
}

/// Whether raw, still swapped bytes carry a `FILE_DATA` packet.
pub fn is_raw_file_data(raw: &[u8]) -> bool {
    is_raw_command(raw, Command::FileData)
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw command code. Not necessarily a known [`Command`].
    pub cmd: u32,
    /// Payload, without header or padding.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a packet for a known command.
    pub fn new(cmd: Command, payload: Vec<u8>) -> Self {
        Self {
            cmd: cmd.code(),
            payload,
        }
    }

    /// Create a packet with no payload.
    pub fn empty(cmd: Command) -> Self {
        Self::new(cmd, Vec::new())
    }

    /// The command, if the code is known.
    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.cmd)
    }

    /// Value of the length field: header plus payload.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Build the in-memory (unswapped) form with the CRC filled in.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let len = self.wire_len();
        if len > MAX_PACKET_SIZE {
            return Err(Error::PacketTooLarge(len));
        }

        let mut buf = Vec::with_capacity(len + 1);
        // Length fits, checked above
        buf.write_u16::<BigEndian>(len as u16).unwrap();
        buf.write_u16::<BigEndian>(0).unwrap();
        buf.write_u32::<BigEndian>(self.cmd).unwrap();
        buf.extend_from_slice(&self.payload);

        let crc = crc16_ansi(&buf[4..]);
        BigEndian::write_u16(&mut buf[2..4], crc);
        Ok(buf)
    }

    /// Build the wire form: in-memory form padded to even and byte swapped.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(to_wire(self.to_bytes()?))
    }

    /// Decode a packet from its wire form.
    pub fn decode(raw: &[u8], crc_mode: CrcMode) -> Result<Self> {
        let mut buf = raw.to_vec();
        let (packet, _) = decode_in_place(&mut buf, crc_mode)?;
        Ok(packet)
    }

    /// `SUCCESS` acknowledge.
    pub fn success() -> Self {
        Self::empty(Command::Success)
    }

    /// `CANCEL` the operation in progress.
    pub fn cancel() -> Self {
        Self::empty(Command::Cancel)
    }

    /// `READY` query.
    pub fn ready() -> Self {
        Self::empty(Command::Ready)
    }

    /// `RESET` (reboot) request.
    pub fn reset() -> Self {
        Self::empty(Command::Reset)
    }

    /// `TURBO` on or off.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn turbo(on: bool) -> Self {
        let mut payload = Vec::with_capacity(4);
        payload.write_u32::<BigEndian>(u32::from(on)).unwrap();
        Self::new(Command::Turbo, payload)
    }

    /// `HDD_SIZE` query.
    pub fn hdd_size() -> Self {
        Self::empty(Command::HddSize)
    }

    /// `HDD_DIR` listing request.
    pub fn hdd_dir(path: &str) -> Result<Self> {
        let mut payload = Vec::new();
        put_path(&mut payload, path);
        path_request(Command::HddDir, payload, path)
    }

    /// `HDD_DEL` request.
    pub fn hdd_delete(path: &str) -> Result<Self> {
        let mut payload = Vec::new();
        put_path(&mut payload, path);
        path_request(Command::HddDelete, payload, path)
    }

    /// `HDD_RENAME` request.
    pub fn hdd_rename(src: &str, dst: &str) -> Result<Self> {
        let mut payload = Vec::new();
        put_sized_path(&mut payload, src);
        put_sized_path(&mut payload, dst);
        path_request(Command::HddRename, payload, src)
    }

    /// `HDD_CREATE_DIR` request.
    pub fn hdd_create_dir(path: &str) -> Result<Self> {
        let mut payload = Vec::new();
        put_sized_path(&mut payload, path);
        path_request(Command::HddCreateDir, payload, path)
    }

    /// `HDD_FILE_SEND` request starting a transfer.
    pub fn hdd_file_send(direction: Direction, path: &str) -> Result<Self> {
        let mut payload = vec![direction as u8];
        put_sized_path(&mut payload, path);
        path_request(Command::HddFileSend, payload, path)
    }

    /// `FILE_START` transfer header.
    pub fn file_start(entry: &DirEntry) -> Self {
        Self::new(Command::FileStart, entry.to_bytes().to_vec())
    }

    /// `FILE_DATA` block at `offset`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn file_data(offset: u64, data: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(8 + data.len());
        payload.write_u64::<BigEndian>(offset).unwrap();
        payload.extend_from_slice(data);
        Self::new(Command::FileData, payload)
    }

    /// `FILE_END` marker.
    pub fn file_end() -> Self {
        Self::empty(Command::FileEnd)
    }
}

/// Turn the in-memory form into the wire form.
pub(crate) fn to_wire(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.len() % 2 != 0 {
        bytes.push(0);
    }
    byte_swap(&mut bytes);
    bytes
}

/// Append a nul-terminated path.
fn put_path(payload: &mut Vec<u8>, path: &str) {
    payload.extend_from_slice(path.as_bytes());
    payload.push(0);
}

/// Append a u16 length (terminator included) and a nul-terminated path.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
fn put_sized_path(payload: &mut Vec<u8>, path: &str) {
    // Oversized paths are rejected by path_request before this matters
    let len = (path.len() + 1).min(usize::from(u16::MAX)) as u16;
    payload.write_u16::<BigEndian>(len).unwrap();
    put_path(payload, path);
}

/// Finish a request carrying paths.
///
/// The device expects these with an even length field, so the pad byte is
/// part of the payload rather than added on the wire.
fn path_request(cmd: Command, mut payload: Vec<u8>, path: &str) -> Result<Packet> {
    if HEADER_SIZE + payload.len() >= MAX_PACKET_SIZE {
        return Err(Error::PathTooLong(path.to_string()));
    }
    if payload.len() % 2 != 0 {
        payload.push(0);
    }
    Ok(Packet::new(cmd, payload))
}

/// Swap and decode a received packet in place.
///
/// Returns the packet and its declared length. Bytes past the declared
/// length are never interpreted.
pub(crate) fn decode_in_place(buf: &mut [u8], crc_mode: CrcMode) -> Result<(Packet, usize)> {
    let received = buf.len();
    if received < HEADER_SIZE {
        return Err(Error::MalformedPacket(format!(
            "{received} bytes is shorter than a header"
        )));
    }

    // The length is still swapped, so the low byte comes first.
    let raw_len = usize::from(u16::from_le_bytes([buf[0], buf[1]]));
    let swap_len = ((raw_len + 1) & !1).min(MAX_PACKET_SIZE).min(received);
    byte_swap(&mut buf[..swap_len]);

    let declared = usize::from(BigEndian::read_u16(&buf[0..2]));
    if declared < HEADER_SIZE {
        return Err(Error::MalformedPacket(format!(
            "invalid packet length {declared:#06x}"
        )));
    }
    if declared > received {
        return Err(Error::ShortPacket { declared, received });
    }

    if crc_mode != CrcMode::Ignore {
        let expected = BigEndian::read_u16(&buf[2..4]);
        let actual = crc16_ansi(&buf[4..declared]);
        if expected != actual {
            if crc_mode == CrcMode::Strict {
                return Err(Error::CrcMismatch { expected, actual });
            }
            warn!("Packet CRC {expected:04x}, expected {actual:04x}");
        }
    }

    let packet = Packet {
        cmd: BigEndian::read_u32(&buf[4..8]),
        payload: buf[HEADER_SIZE..declared].to_vec(),
    };
    Ok((packet, declared))
}

/// Reusable receive buffer.
///
/// Holds the bytes of the last bulk read together with the fill level and,
/// once decoded, the length the packet declared.
pub struct PacketBuf {
    buf: Box<[u8]>,
    filled: usize,
    declared: Option<usize>,
}

impl Default for PacketBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBuf {
    /// Allocate a buffer able to hold any packet.
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; RECEIVE_BUFFER_SIZE].into_boxed_slice(),
            filled: 0,
            declared: None,
        }
    }

    /// Space to read one packet into. Resets the fill level.
    pub fn read_space(&mut self) -> &mut [u8] {
        self.filled = 0;
        self.declared = None;
        &mut self.buf[..MAX_PACKET_SIZE]
    }

    /// Record how many bytes the last read produced.
    pub fn set_filled(&mut self, n: usize) {
        self.filled = n.min(MAX_PACKET_SIZE);
    }

    /// Bytes received by the last read.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    /// Declared length of the last decoded packet.
    pub fn declared(&self) -> Option<usize> {
        self.declared
    }

    /// Whether the raw bytes hold a `FILE_DATA` packet.
    pub fn is_file_data(&self) -> bool {
        is_raw_file_data(self.filled())
    }

    /// Swap and decode the received bytes.
    pub fn decode(&mut self, crc_mode: CrcMode) -> Result<Packet> {
        let (packet, declared) = decode_in_place(&mut self.buf[..self.filled], crc_mode)?;
        self.declared = Some(declared);
        Ok(packet)
    }

    /// Decoded bytes of the last packet, up to its declared length.
    pub fn packet_bytes(&self) -> &[u8] {
        &self.buf[..self.declared.unwrap_or(0)]
    }
}

/// Dump a packet (in-memory byte order) to the trace log.
///
/// Level 1 prints the header bytes. Level 2 and above print every byte
/// followed by a printable rendering.
pub fn trace_packet(prefix: &str, bytes: &[u8], level: u8) {
    match level {
        0 => {}
        1 => {
            let header = &bytes[..bytes.len().min(HEADER_SIZE)];
            trace!("{prefix}{}", hex_line(header));
        }
        _ => {
            for row in bytes.chunks(32) {
                trace!("{prefix}{}", hex_line(row));
            }
            for row in bytes.chunks(80) {
                let text: String = row
                    .iter()
                    .map(|&c| {
                        if c.is_ascii_graphic() {
                            char::from(c)
                        } else {
                            '.'
                        }
                    })
                    .collect();
                trace!("{prefix}{text}");
            }
        }
    }
}

fn hex_line(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut s, b| {
        let _ = write!(s, " {b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::timestamp::DeviceTime;

    #[test]
    fn test_byte_swap() {
        let mut even = [1, 2, 3, 4];
        byte_swap(&mut even);
        assert_eq!(even, [2, 1, 4, 3]);
        byte_swap(&mut even);
        assert_eq!(even, [1, 2, 3, 4]);

        let mut odd = [1, 2, 3];
        byte_swap(&mut odd);
        assert_eq!(odd, [2, 1, 3]);
    }

    #[test]
    fn test_fixed_packets() {
        assert_eq!(Packet::success().encode().unwrap(), SUCCESS_WIRE);
        assert_eq!(Packet::cancel().encode().unwrap(), CANCEL_WIRE);
    }

    #[test]
    fn test_ready_layout() {
        let bytes = Packet::ready().to_bytes().unwrap();
        assert_eq!(&bytes[0..2], &[0x00, 0x08]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x01, 0x00]);
        assert_eq!(BigEndian::read_u16(&bytes[2..4]), crc16_ansi(&bytes[4..]));
    }

    #[test]
    fn test_round_trip_odd_and_even_payloads() {
        for len in [0usize, 1, 2, 7, 114, 1001] {
            #[allow(clippy::cast_possible_truncation)]
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let packet = Packet::new(Command::FileData, payload);
            let wire = packet.encode().unwrap();
            assert_eq!(wire.len() % 2, 0);
            assert_eq!(wire.len(), (packet.wire_len() + 1) & !1);
            assert_eq!(Packet::decode(&wire, CrcMode::Strict).unwrap(), packet);
        }
    }

    #[test]
    fn test_odd_length_pad_not_counted() {
        let packet = Packet::new(Command::FileData, vec![0xAA; 3]);
        let mut wire = packet.encode().unwrap();
        assert_eq!(wire.len(), 12);
        byte_swap(&mut wire);
        assert_eq!(BigEndian::read_u16(&wire[0..2]), 11);
        assert_eq!(wire[11], 0);
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            Packet::decode(&[0x08, 0x00, 0x00], CrcMode::Warn),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_decode_length_below_header() {
        let mut wire = SUCCESS_WIRE;
        wire[0] = 0x04;
        assert!(matches!(
            Packet::decode(&wire, CrcMode::Ignore),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_decode_short_packet() {
        let wire = Packet::new(Command::HddDirData, vec![0; 20])
            .encode()
            .unwrap();
        let err = Packet::decode(&wire[..16], CrcMode::Warn).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortPacket {
                declared: 28,
                received: 16
            }
        ));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let packet = Packet::new(Command::HddSizeData, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let mut wire = packet.encode().unwrap();
        wire.extend_from_slice(&[0xEE; 10]);
        assert_eq!(Packet::decode(&wire, CrcMode::Strict).unwrap(), packet);
    }

    #[test]
    fn test_crc_modes() {
        let mut wire = Packet::turbo(true).encode().unwrap();
        // Corrupt the payload without touching the CRC.
        wire[10] ^= 0xFF;

        assert!(matches!(
            Packet::decode(&wire, CrcMode::Strict),
            Err(Error::CrcMismatch { .. })
        ));
        assert_eq!(Packet::decode(&wire, CrcMode::Warn).unwrap().cmd, 0x0102);
        assert_eq!(Packet::decode(&wire, CrcMode::Ignore).unwrap().cmd, 0x0102);
    }

    #[test]
    fn test_raw_file_data_detection() {
        let wire = Packet::file_data(0, b"abc").encode().unwrap();
        assert_eq!(&wire[4..8], &[0x00, 0x00, 0x0A, 0x10]);
        assert!(is_raw_file_data(&wire));
        assert!(!is_raw_file_data(&SUCCESS_WIRE));
        assert!(!is_raw_file_data(&wire[..6]));
    }

    #[test]
    fn test_path_requests() {
        // "\\" + nul = 2 bytes, even.
        let dir = Packet::hdd_dir("\\").unwrap();
        assert_eq!(dir.payload, b"\\\0");

        // Odd payloads carry their pad byte inside the length.
        let del = Packet::hdd_delete("\\a").unwrap();
        assert_eq!(del.payload, b"\\a\0\0");
        assert_eq!(del.wire_len() % 2, 0);

        let mkdir = Packet::hdd_create_dir("\\New").unwrap();
        assert_eq!(mkdir.payload, b"\x00\x05\\New\0\0");

        let rename = Packet::hdd_rename("\\a", "\\bc").unwrap();
        assert_eq!(rename.payload, b"\x00\x03\\a\0\x00\x04\\bc\0\0");

        let get = Packet::hdd_file_send(Direction::Get, "\\x.rec").unwrap();
        assert_eq!(get.payload, b"\x01\x00\x07\\x.rec\0");
        assert_eq!(get.command(), Some(Command::HddFileSend));
    }

    #[test]
    fn test_path_too_long() {
        let path = "x".repeat(MAX_PAYLOAD);
        assert!(matches!(
            Packet::hdd_dir(&path),
            Err(Error::PathTooLong(_))
        ));
        assert!(matches!(
            Packet::hdd_rename("\\a", &path),
            Err(Error::PathTooLong(_))
        ));
        assert!(Packet::hdd_dir(&"x".repeat(1000)).is_ok());
    }

    #[test]
    fn test_packet_too_large() {
        let packet = Packet::new(Command::FileData, vec![0; MAX_PAYLOAD + 1]);
        assert!(matches!(packet.encode(), Err(Error::PacketTooLarge(_))));
        let packet = Packet::new(Command::FileData, vec![0; MAX_PAYLOAD]);
        assert_eq!(packet.encode().unwrap().len(), RECEIVE_BUFFER_SIZE);
    }

    #[test]
    fn test_file_start_and_data() {
        let entry = DirEntry::file("\\DataFiles\\a.rec", 10, DeviceTime::new(51544, 0, 0, 0));
        let start = Packet::file_start(&entry);
        assert_eq!(start.wire_len(), HEADER_SIZE + 114);

        let data = Packet::file_data(0x0102, b"xy");
        assert_eq!(data.payload, [0, 0, 0, 0, 0, 0, 1, 2, b'x', b'y']);
    }

    #[test]
    fn test_packet_buf() {
        let packet = Packet::new(Command::HddSizeData, vec![0, 0, 1, 0, 0, 0, 0, 16]);
        let wire = packet.encode().unwrap();

        let mut buf = PacketBuf::new();
        buf.read_space()[..wire.len()].copy_from_slice(&wire);
        buf.set_filled(wire.len());
        assert!(!buf.is_file_data());
        assert_eq!(buf.decode(CrcMode::Strict).unwrap(), packet);
        assert_eq!(buf.declared(), Some(16));
        assert_eq!(buf.packet_bytes(), packet.to_bytes().unwrap());

        buf.read_space();
        assert!(buf.filled().is_empty());
        assert_eq!(buf.declared(), None);
    }
}
