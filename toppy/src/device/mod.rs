//! Command/reply engine for one Topfield PVR.
//!
//! [`Toppy`] owns the port for the lifetime of a session. Every operation
//! takes `&mut self`, so a session runs strictly one exchange at a time.
//!
//! ## Example
//!
//! ```rust,no_run
//! use toppy::{Config, Toppy};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut toppy = Toppy::open(None, None, Config::default())?;
//!         let size = toppy.hdd_size()?;
//!         println!("{} kiB free", size.free_kib);
//!
//!         for entry in toppy.hdd_dir("\\DataFiles")? {
//!             println!("{} {}", entry.kind.marker(), entry.name);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod stats;
pub mod transfer;

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, info, trace};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::command::{Command, DeviceError};
use crate::protocol::packet::{self, CANCEL_WIRE, Packet, PacketBuf, SUCCESS_WIRE};
use crate::protocol::typefile::{self, DirEntry};
use crate::transport::BulkTransport;

#[cfg(feature = "native")]
use crate::port::NativePort;

type InterruptChecker = Arc<dyn Fn() -> bool + Send + Sync>;

/// One reply from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `SUCCESS` or a data reply.
    Success {
        /// Which reply.
        cmd: Command,
        /// Its payload.
        data: Vec<u8>,
    },
    /// The device refused the request.
    Fail {
        /// Raw error code.
        code: u32,
        /// Decoded reason.
        reason: DeviceError,
    },
    /// Anything that is not a reply code.
    Unexpected {
        /// Raw command code.
        cmd: u32,
    },
}

impl From<Packet> for Reply {
    fn from(packet: Packet) -> Self {
        match packet.command() {
            Some(Command::Fail) => Self::Fail {
                code: DeviceError::payload_code(&packet.payload),
                reason: DeviceError::from_payload(&packet.payload),
            },
            Some(cmd) if cmd.is_reply() => Self::Success {
                cmd,
                data: packet.payload,
            },
            _ => Self::Unexpected { cmd: packet.cmd },
        }
    }
}

/// Disk capacity as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HddSize {
    /// Total capacity in KiB.
    pub total_kib: u32,
    /// Free space in KiB.
    pub free_kib: u32,
}

impl HddSize {
    fn from_payload(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::MalformedPacket(format!(
                "size reply has {} bytes, expected 8",
                data.len()
            )));
        }
        Ok(Self {
            total_kib: BigEndian::read_u32(&data[0..4]),
            free_kib: BigEndian::read_u32(&data[4..8]),
        })
    }
}

/// A session with one PVR.
///
/// Generic over the port type `P`, so the engine runs the same against real
/// hardware and against an in-memory port.
pub struct Toppy<P: Port> {
    transport: BulkTransport<P>,
    config: Config,
    rx: PacketBuf,
    interrupt: Option<InterruptChecker>,
}

#[cfg(feature = "native")]
impl Toppy<NativePort> {
    /// Open the attached PVR, optionally selected by bus and address.
    pub fn open(bus: Option<&str>, address: Option<u8>, config: Config) -> Result<Self> {
        let port = NativePort::open_toppy(bus, address)?;
        info!("Found a Topfield PVR at {}", port.name());
        Ok(Self::new(port, config))
    }
}

impl<P: Port> Toppy<P> {
    /// Start a session on an opened port.
    pub fn new(port: P, config: Config) -> Self {
        Self {
            transport: BulkTransport::new(port).with_timeout(config.timeout),
            config,
            rx: PacketBuf::new(),
            interrupt: None,
        }
    }

    /// Use `checker` instead of the global interruption checker.
    #[must_use]
    pub fn with_interrupt_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.interrupt = Some(Arc::new(checker));
        self
    }

    /// Session configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        self.transport.port()
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        self.transport.port_mut()
    }

    /// Consume the session and return the underlying port.
    pub fn into_port(self) -> P {
        self.transport.into_port()
    }

    /// Release the device.
    pub fn close(&mut self) -> Result<()> {
        self.transport.port_mut().close()
    }

    pub(crate) fn interrupted(&self) -> bool {
        match &self.interrupt {
            Some(checker) => checker(),
            None => crate::is_interrupted_requested(),
        }
    }

    fn write_wire(&mut self, wire: &[u8]) -> Result<()> {
        let sent = self.transport.write(wire)?;
        if sent < wire.len() {
            return Err(Error::ShortWrite {
                sent,
                expected: wire.len(),
            });
        }
        Ok(())
    }

    /// Send one packet.
    pub fn send(&mut self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes()?;
        packet::trace_packet("OUT>", &bytes, self.config.packet_trace);
        self.write_wire(&packet::to_wire(bytes))
    }

    /// Receive one packet.
    ///
    /// A `FILE_DATA` packet is acknowledged with `SUCCESS` as soon as it is
    /// recognised, before it is decoded.
    pub fn receive(&mut self) -> Result<Packet> {
        let n = self.transport.read(self.rx.read_space())?;
        self.rx.set_filled(n);

        if self.rx.is_file_data() {
            self.send_success()?;
        }

        let packet = self.rx.decode(self.config.crc_mode)?;
        packet::trace_packet(" IN<", self.rx.packet_bytes(), self.config.packet_trace);
        Ok(packet)
    }

    /// Acknowledge with the fixed `SUCCESS` packet.
    pub fn send_success(&mut self) -> Result<()> {
        trace!("send_success");
        self.write_wire(&SUCCESS_WIRE)
    }

    /// Send the fixed `CANCEL` packet.
    pub fn send_cancel(&mut self) -> Result<()> {
        trace!("send_cancel");
        self.write_wire(&CANCEL_WIRE)
    }

    /// Send a request and wait for its reply.
    pub fn exchange(&mut self, packet: &Packet) -> Result<Reply> {
        self.send(packet)?;
        self.receive_reply()
    }

    /// Wait for the next reply.
    pub fn receive_reply(&mut self) -> Result<Reply> {
        Ok(Reply::from(self.receive()?))
    }

    fn expect_success(reply: Reply) -> Result<()> {
        match reply {
            Reply::Success {
                cmd: Command::Success,
                ..
            } => Ok(()),
            Reply::Success { cmd, .. } => Err(Error::unexpected(cmd.code())),
            Reply::Fail { reason, .. } => Err(Error::Device(reason)),
            Reply::Unexpected { cmd } => Err(Error::unexpected(cmd)),
        }
    }

    /// Ask whether the device is ready.
    pub fn ready(&mut self) -> Result<()> {
        let reply = self.exchange(&Packet::ready())?;
        Self::expect_success(reply)?;
        info!("Device reports ready");
        Ok(())
    }

    /// Reboot the device.
    pub fn reset(&mut self) -> Result<()> {
        let reply = self.exchange(&Packet::reset())?;
        Self::expect_success(reply)?;
        info!("Device should now reboot");
        Ok(())
    }

    /// Switch turbo mode on or off.
    pub fn turbo(&mut self, on: bool) -> Result<()> {
        let reply = self.exchange(&Packet::turbo(on))?;
        Self::expect_success(reply)?;
        info!("Turbo mode: {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    /// Cancel whatever operation the device has in progress.
    pub fn cancel(&mut self) -> Result<()> {
        self.send_cancel()?;
        let reply = self.receive_reply()?;
        Self::expect_success(reply)?;
        info!("In progress operation cancelled");
        Ok(())
    }

    /// Query disk capacity.
    pub fn hdd_size(&mut self) -> Result<HddSize> {
        match self.exchange(&Packet::hdd_size())? {
            Reply::Success {
                cmd: Command::HddSizeData,
                data,
            } => HddSize::from_payload(&data),
            Reply::Success { cmd, .. } => Err(Error::unexpected(cmd.code())),
            Reply::Fail { reason, .. } => Err(Error::Device(reason)),
            Reply::Unexpected { cmd } => Err(Error::unexpected(cmd)),
        }
    }

    /// List a directory.
    pub fn hdd_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let request = Packet::hdd_dir(path)?;
        self.send(&request)?;

        let mut entries = Vec::new();
        loop {
            match self.receive_reply()? {
                Reply::Success {
                    cmd: Command::HddDirData,
                    data,
                } => {
                    let chunk = typefile::decode_entries(&data)?;
                    debug!("{} entries in listing chunk", chunk.len());
                    entries.extend(chunk);
                    self.send_success()?;
                }
                Reply::Success {
                    cmd: Command::HddDirEnd,
                    ..
                } => return Ok(entries),
                Reply::Success { cmd, .. } => return Err(Error::unexpected(cmd.code())),
                Reply::Fail { reason, .. } => return Err(Error::Device(reason)),
                Reply::Unexpected { cmd } => return Err(Error::unexpected(cmd)),
            }
        }
    }

    /// Delete a file or directory.
    pub fn delete(&mut self, path: &str) -> Result<()> {
        let reply = self.exchange(&Packet::hdd_delete(path)?)?;
        Self::expect_success(reply)?;
        info!("Deleted {path}");
        Ok(())
    }

    /// Rename a file or directory.
    pub fn rename(&mut self, src: &str, dst: &str) -> Result<()> {
        let reply = self.exchange(&Packet::hdd_rename(src, dst)?)?;
        Self::expect_success(reply)?;
        info!("Renamed {src} to {dst}");
        Ok(())
    }

    /// Create a directory.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let reply = self.exchange(&Packet::hdd_create_dir(path)?)?;
        Self::expect_success(reply)?;
        info!("Created {path}");
        Ok(())
    }
}
