//! Simple device commands: ready, reset, cancel, turbo and file management.

use anyhow::{Context, Result};

use crate::Cli;
use crate::commands::with_toppy;
use crate::config::Config;

/// Ready command implementation.
pub(crate) fn cmd_ready(cli: &Cli, config: &Config) -> Result<()> {
    with_toppy(cli, config, |toppy| {
        toppy.ready().context("Ready check failed")
    })
}

/// Reset command implementation.
pub(crate) fn cmd_reset(cli: &Cli, config: &Config) -> Result<()> {
    with_toppy(cli, config, |toppy| toppy.reset().context("Reset failed"))
}

/// Cancel command implementation.
pub(crate) fn cmd_cancel(cli: &Cli, config: &Config) -> Result<()> {
    with_toppy(cli, config, |toppy| toppy.cancel().context("Cancel failed"))
}

/// Turbo command implementation.
pub(crate) fn cmd_turbo(cli: &Cli, config: &Config, on: bool) -> Result<()> {
    with_toppy(cli, config, |toppy| {
        toppy
            .turbo(on)
            .with_context(|| format!("Can not switch turbo mode {}", if on { "on" } else { "off" }))
    })
}

/// Delete command implementation.
pub(crate) fn cmd_delete(cli: &Cli, config: &Config, path: &str) -> Result<()> {
    with_toppy(cli, config, |toppy| {
        toppy
            .delete(path)
            .with_context(|| format!("Can not delete {path}"))
    })
}

/// Rename command implementation.
pub(crate) fn cmd_rename(cli: &Cli, config: &Config, src: &str, dst: &str) -> Result<()> {
    with_toppy(cli, config, |toppy| {
        toppy
            .rename(src, dst)
            .with_context(|| format!("Can not rename {src} to {dst}"))
    })
}

/// Mkdir command implementation.
pub(crate) fn cmd_mkdir(cli: &Cli, config: &Config, path: &str) -> Result<()> {
    with_toppy(cli, config, |toppy| {
        toppy
            .mkdir(path)
            .with_context(|| format!("Can not create directory {path}"))
    })
}
