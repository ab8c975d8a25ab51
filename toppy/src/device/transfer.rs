//! File upload and download.
//!
//! Both directions start with an `HDD_FILE_SEND` request and then run a
//! small state machine driven by the device's replies:
//!
//! ```text
//! upload:   Start --SUCCESS--> Data --SUCCESS--> ... --> End --SUCCESS--> Finished
//! download: Start --FILE_START--> Data --FILE_DATA--> ... --FILE_END--> done
//! ```
//!
//! Any reply that does not fit the current state aborts the transfer. An
//! aborted transfer sends `CANCEL` and leaves whatever the remote or local
//! side already wrote in place.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, info, warn};

use crate::device::stats::{TransferProgress, TransferSummary};
use crate::device::{Reply, Toppy};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::command::{Command, Direction};
use crate::protocol::packet::{HEADER_SIZE, MAX_PAYLOAD, Packet};
use crate::protocol::timestamp::DeviceTime;
use crate::protocol::typefile::{DirEntry, RECORD_SIZE};

/// Largest file chunk carried by one `FILE_DATA` packet.
pub const UPLOAD_CHUNK: usize = MAX_PAYLOAD - 9;

/// Report progress on every this-many packets.
pub const PROGRESS_INTERVAL: u32 = 16;

/// The device mishandles transfers whose size is a multiple of this.
const BAD_TRANSFER_MULTIPLE: usize = 0x200;

/// Bytes held back from a chunk that would hit [`BAD_TRANSFER_MULTIPLE`].
const GUARD_BYTES: usize = 4;

/// A local file ready to be uploaded.
#[derive(Debug)]
pub struct UploadSource {
    file: File,
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

impl UploadSource {
    /// Open and examine the file.
    ///
    /// Fails before any device traffic if the file cannot be read or is empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::LocalFile {
            context: format!("Can not open source file {}", path.display()),
            source: e,
        })?;
        let meta = file.metadata().map_err(|e| Error::LocalFile {
            context: format!("Can not examine source file {}", path.display()),
            source: e,
        })?;

        if meta.len() == 0 {
            return Err(Error::EmptySource(path.display().to_string()));
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size: meta.len(),
            modified: meta.modified().unwrap_or_else(|_| SystemTime::now()),
        })
    }

    /// Local path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(self.read_error(e)),
            }
        }
        Ok(filled)
    }

    fn step_back(&mut self, n: usize) -> Result<()> {
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        self.file
            .seek(SeekFrom::Current(-n))
            .map_err(|e| self.read_error(e))?;
        Ok(())
    }

    fn read_error(&self, e: io::Error) -> Error {
        Error::LocalFile {
            context: format!("Can not read {}", self.path.display()),
            source: e,
        }
    }
}

/// A local file that receives a download.
#[derive(Debug)]
pub struct DownloadTarget {
    file: File,
    path: PathBuf,
}

impl DownloadTarget {
    /// Create or truncate the destination file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::LocalFile {
            context: format!("Can not open destination file {}", path.display()),
            source: e,
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Local path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, e: io::Error) -> Error {
        Error::LocalFile {
            context: format!("Can not write data to {}", self.path.display()),
            source: e,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadState {
    Start,
    Data,
    End,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadState {
    Start,
    Data,
}

/// Whether a `FILE_DATA` packet carrying `len` file bytes would be a
/// multiple of 512 bytes on the wire.
fn hits_bad_multiple(len: usize) -> bool {
    ((HEADER_SIZE + 8 + len + 1) & !1) % BAD_TRANSFER_MULTIPLE == 0
}

impl<P: Port> Toppy<P> {
    /// Send `CANCEL` and fail with `err`.
    fn abort<T>(&mut self, err: Error) -> Result<T> {
        warn!("Aborting transfer: {err}");
        if let Err(e) = self.send_cancel() {
            warn!("Failed to send cancel: {e}");
        }
        Err(err)
    }

    /// Wait for the next reply of a running transfer.
    ///
    /// A packet that can not be decoded aborts the transfer.
    fn transfer_reply(&mut self) -> Result<Reply> {
        match self.receive_reply() {
            Err(e) if e.is_protocol() => self.abort(e),
            other => other,
        }
    }

    /// Upload a local file to `dst` on the device.
    ///
    /// `progress` is called every [`PROGRESS_INTERVAL`] packets unless the
    /// session is quiet.
    pub fn upload<F>(
        &mut self,
        mut source: UploadSource,
        dst: &str,
        mut progress: F,
    ) -> Result<TransferSummary>
    where
        F: FnMut(&TransferProgress),
    {
        let start = Instant::now();
        let size = source.size;
        let stamp = DeviceTime::from_system_time(source.modified).unwrap_or_else(|e| {
            warn!("Using a zero timestamp for {}: {e}", source.path.display());
            DeviceTime::default()
        });

        info!("Uploading {} ({size} bytes) to {dst}", source.path.display());
        self.send(&Packet::hdd_file_send(Direction::Put, dst)?)?;

        let mut state = UploadState::Start;
        let mut byte_count: u64 = 0;
        let mut update: u32 = 0;
        let mut chunk = vec![0u8; UPLOAD_CHUNK];

        loop {
            if self.interrupted() {
                return self.abort(Error::Interrupted);
            }

            let reply = self.transfer_reply()?;
            update = (update + 1) % PROGRESS_INTERVAL;

            match reply {
                Reply::Success {
                    cmd: Command::Success,
                    ..
                } => {}
                Reply::Fail { reason, .. } => return Err(Error::Device(reason)),
                Reply::Success { cmd, .. } => {
                    return self.abort(Error::unexpected(cmd.code()));
                }
                Reply::Unexpected { cmd } => return self.abort(Error::unexpected(cmd)),
            }

            match state {
                UploadState::Start => {
                    let entry = DirEntry::file(dst, size, stamp);
                    debug!("FILE_START for {}", entry.name);
                    self.send(&Packet::file_start(&entry))?;
                    state = UploadState::Data;
                }
                UploadState::Data => {
                    let mut w = match source.read_chunk(&mut chunk) {
                        Ok(w) => w,
                        Err(e) => return self.abort(e),
                    };

                    if w > GUARD_BYTES && hits_bad_multiple(w) {
                        if let Err(e) = source.step_back(GUARD_BYTES) {
                            return self.abort(e);
                        }
                        w -= GUARD_BYTES;
                    }

                    let offset = byte_count;
                    byte_count += w as u64;

                    if w == 0 || byte_count >= size {
                        state = UploadState::End;
                    }

                    if w > 0 {
                        self.send(&Packet::file_data(offset, &chunk[..w]))?;
                    } else {
                        // Source shrank under us; nothing left to send
                        warn!("{} ended at {byte_count} of {size} bytes", source.path.display());
                        self.send(&Packet::file_end())?;
                        state = UploadState::Finished;
                    }

                    if update == 0 && !self.config.quiet {
                        progress(&TransferProgress {
                            total: size,
                            bytes: byte_count,
                            elapsed: start.elapsed(),
                        });
                    }
                }
                UploadState::End => {
                    debug!("FILE_END");
                    self.send(&Packet::file_end())?;
                    state = UploadState::Finished;
                }
                UploadState::Finished => {
                    let summary = TransferSummary {
                        bytes: byte_count,
                        elapsed: start.elapsed(),
                    };
                    debug!("Upload complete: {summary}");
                    return Ok(summary);
                }
            }
        }
    }

    /// Download `src` from the device into a local file.
    ///
    /// On success the local file gets the remote modification time.
    pub fn download<F>(
        &mut self,
        src: &str,
        mut target: DownloadTarget,
        mut progress: F,
    ) -> Result<TransferSummary>
    where
        F: FnMut(&TransferProgress),
    {
        let start = Instant::now();
        info!("Downloading {src} to {}", target.path.display());
        self.send(&Packet::hdd_file_send(Direction::Get, src)?)?;

        let mut state = DownloadState::Start;
        let mut total: u64 = 0;
        let mut received: u64 = 0;
        let mut modified: Option<SystemTime> = None;
        let mut update: u32 = 0;

        loop {
            if self.interrupted() {
                return self.abort(Error::Interrupted);
            }

            let reply = self.transfer_reply()?;
            update = (update + 1) % PROGRESS_INTERVAL;

            match reply {
                Reply::Success {
                    cmd: Command::FileStart,
                    data,
                } => {
                    if state != DownloadState::Start {
                        return self.abort(Error::UnexpectedReply(format!(
                            "FILE_START in state {state:?}"
                        )));
                    }
                    let entry = match data.get(..RECORD_SIZE).map(DirEntry::from_bytes) {
                        Some(Ok(entry)) => entry,
                        Some(Err(e)) => return self.abort(e),
                        None => {
                            return self.abort(Error::MalformedPacket(format!(
                                "FILE_START payload of {} bytes",
                                data.len()
                            )));
                        }
                    };

                    total = entry.size;
                    modified = match entry.stamp.to_system_time() {
                        Ok(t) => Some(t),
                        Err(e) => {
                            warn!("Not setting modification time: {e}");
                            None
                        }
                    };
                    debug!("FILE_START {} bytes", total);
                    self.send_success()?;
                    state = DownloadState::Data;
                }
                Reply::Success {
                    cmd: Command::FileData,
                    data,
                } => {
                    if state != DownloadState::Data {
                        return self.abort(Error::UnexpectedReply(format!(
                            "FILE_DATA in state {state:?}"
                        )));
                    }
                    if data.len() < 8 {
                        return self.abort(Error::MalformedPacket(format!(
                            "FILE_DATA payload of {} bytes",
                            data.len()
                        )));
                    }

                    let offset = BigEndian::read_u64(&data[..8]);
                    if offset != received {
                        return self.abort(Error::UnexpectedReply(format!(
                            "FILE_DATA at offset {offset}, expected {received}"
                        )));
                    }
                    let slice = &data[8..];
                    received += slice.len() as u64;

                    if update == 0 && !self.config.quiet {
                        progress(&TransferProgress {
                            total,
                            bytes: received,
                            elapsed: start.elapsed(),
                        });
                    }

                    if let Err(e) = target.file.write_all(slice) {
                        let err = target.write_error(e);
                        return self.abort(err);
                    }
                }
                Reply::Success {
                    cmd: Command::FileEnd,
                    ..
                } => {
                    self.send_success()?;
                    target.file.flush().map_err(|e| target.write_error(e))?;
                    if let Some(t) = modified {
                        if let Err(e) = target.file.set_modified(t) {
                            warn!("Can not set modification time of {}: {e}", target.path.display());
                        }
                    }

                    let summary = TransferSummary {
                        bytes: received,
                        elapsed: start.elapsed(),
                    };
                    debug!("Download complete: {summary}");
                    return Ok(summary);
                }
                Reply::Success {
                    cmd: Command::Success,
                    ..
                } => {
                    return self.abort(Error::UnexpectedReply(
                        "transfer ended before FILE_END".into(),
                    ));
                }
                Reply::Success { cmd, .. } => return self.abort(Error::unexpected(cmd.code())),
                Reply::Fail { reason, .. } => return self.abort(Error::Device(reason)),
                Reply::Unexpected { cmd } => return self.abort(Error::unexpected(cmd)),
            }
        }
    }
}
