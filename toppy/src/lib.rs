//! # toppy
//!
//! A library for driving Topfield TF5000PVRt-class video recorders over USB.
//!
//! The PVR exposes its hard disk through a vendor-specific bulk protocol.
//! This crate implements that protocol:
//!
//! - Packet framing with pair byte swapping and CRC-16 checks
//! - Typefile directory records and the MJD-based timestamp format
//! - Command/reply exchanges (ready, reset, turbo, size, directory listing,
//!   delete, rename, mkdir)
//! - File upload and download with progress reporting
//!
//! ## Features
//!
//! - `native` (default): USB access through the `nusb` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use toppy::{Config, DownloadTarget, Toppy};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut toppy = Toppy::open(None, None, Config::default())?;
//!         toppy.turbo(true)?;
//!
//!         let target = DownloadTarget::create("show.rec")?;
//!         let summary = toppy.download("\\DataFiles\\show.rec", target, |p| {
//!             eprintln!("{p}");
//!         })?;
//!         println!("{summary}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod config;
pub mod device;
pub mod error;
pub mod port;
pub mod protocol;
pub mod transport;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). A transfer that
/// sees the request sends `CANCEL` to the device and fails with
/// [`Error::Interrupted`].
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    config::{Config, CrcMode},
    device::{
        HddSize, Reply, Toppy,
        stats::{TransferProgress, TransferSummary},
        transfer::{DownloadTarget, UploadSource},
    },
    error::{Error, Result},
    port::{Port, PortEnumerator, PortInfo},
    protocol::{Command, DeviceError, DeviceTime, DirEntry, FileKind, Packet},
};
