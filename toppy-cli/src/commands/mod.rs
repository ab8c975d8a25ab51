//! Command implementations.
//!
//! Each group of subcommands is implemented in its own module.

pub(crate) mod completions;
pub(crate) mod device;
pub(crate) mod listing;
pub(crate) mod transfer;

use anyhow::Result;
use log::warn;
use toppy::{NativePort, Toppy};

use crate::config::Config;
use crate::{Cli, open_toppy};

/// Open the PVR, run `op` against it and release it again.
pub(crate) fn with_toppy<T>(
    cli: &Cli,
    config: &Config,
    op: impl FnOnce(&mut Toppy<NativePort>) -> Result<T>,
) -> Result<T> {
    let mut toppy = open_toppy(cli, config)?;
    let result = op(&mut toppy);
    if let Err(e) = toppy.close() {
        warn!("Failed to release the device: {e}");
    }
    result
}
