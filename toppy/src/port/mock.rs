//! In-memory port for protocol tests.
//!
//! Replies are queued as whole bulk-in transfers; a transfer that ends
//! exactly on a chunk boundary is followed by a zero-length read, like a
//! real device sending a ZLP. Everything written is kept for inspection.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::packet::{CrcMode, Packet};

#[derive(Default)]
pub(crate) struct MockPort {
    replies: VecDeque<(Vec<u8>, usize)>,
    written: Vec<u8>,
    write_calls: Vec<usize>,
    /// Accept at most this many bytes per write call.
    pub(crate) write_limit: Option<usize>,
}

impl MockPort {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes as one bulk-in transfer.
    pub(crate) fn push_raw(&mut self, bytes: Vec<u8>) {
        self.replies.push_back((bytes, 0));
    }

    /// Queue an encoded packet.
    pub(crate) fn push_packet(&mut self, packet: &Packet) {
        self.push_raw(packet.encode().unwrap());
    }

    /// Queue `n` SUCCESS replies.
    pub(crate) fn push_successes(&mut self, n: usize) {
        for _ in 0..n {
            self.push_packet(&Packet::success());
        }
    }

    pub(crate) fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// All bytes written so far.
    pub(crate) fn written(&self) -> &[u8] {
        &self.written
    }

    /// Sizes of the individual write calls.
    pub(crate) fn write_calls(&self) -> &[usize] {
        &self.write_calls
    }

    /// Split the written stream back into packets.
    pub(crate) fn sent_packets(&self) -> Vec<Packet> {
        let mut packets = Vec::new();
        let mut rest = self.written.as_slice();
        while rest.len() >= 2 {
            let len = usize::from(u16::from_le_bytes([rest[0], rest[1]]));
            let size = (len + 1) & !1;
            packets.push(Packet::decode(&rest[..size], CrcMode::Strict).unwrap());
            rest = &rest[size..];
        }
        packets
    }
}

impl Port for MockPort {
    fn write_chunk(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        let n = self.write_limit.map_or(data.len(), |l| l.min(data.len()));
        self.written.extend_from_slice(&data[..n]);
        self.write_calls.push(n);
        Ok(n)
    }

    fn read_chunk(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let Some((bytes, pos)) = self.replies.front_mut() else {
            return Err(Error::Timeout("no reply queued".into()));
        };
        let n = (bytes.len() - *pos).min(buf.len());
        buf[..n].copy_from_slice(&bytes[*pos..*pos + n]);
        *pos += n;
        if *pos == bytes.len() && (n < buf.len() || n == 0) {
            self.replies.pop_front();
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
