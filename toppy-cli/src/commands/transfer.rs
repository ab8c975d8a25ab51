//! File upload and download commands.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use toppy::{DownloadTarget, TransferProgress, TransferSummary, UploadSource};

use crate::commands::with_toppy;
use crate::config::Config;
use crate::{Cli, use_fancy_output};

/// Progress output for one transfer: a bar on a terminal, plain lines otherwise.
struct ProgressView {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl ProgressView {
    fn new(total: Option<u64>, quiet: bool) -> Self {
        let bar = (!quiet && use_fancy_output()).then(|| {
            let pb = ProgressBar::new(total.unwrap_or(0));
            #[allow(clippy::unwrap_used)] // Static template string
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                         {bytes}/{total_bytes} {msg}",
                    )
                    .unwrap()
                    .progress_chars("#>-"),
            );
            pb.set_draw_target(ProgressDrawTarget::stderr());
            pb
        });
        Self { bar, quiet }
    }

    fn update(&self, progress: &TransferProgress) {
        match &self.bar {
            Some(pb) => {
                pb.set_length(progress.total);
                pb.set_position(progress.bytes);
                if let Some(rate) = progress.mbits_per_sec() {
                    pb.set_message(format!("{rate:.2} Mbits/s"));
                }
            },
            None if !self.quiet => eprintln!("{progress}"),
            None => {},
        }
    }

    fn finish(&self, summary: &TransferSummary) {
        if let Some(pb) = &self.bar {
            pb.finish_and_clear();
        }
        if !self.quiet {
            eprintln!("{} {summary}", style("✓").green());
        }
    }

    fn abandon(&self) {
        if let Some(pb) = &self.bar {
            pb.abandon();
        }
    }
}

/// Get command implementation.
pub(crate) fn cmd_get(cli: &Cli, config: &Config, src: &str, dst: &Path) -> Result<()> {
    // Local problems are reported before the device is touched.
    let target = DownloadTarget::create(dst)?;
    let view = ProgressView::new(None, cli.is_quiet(config));

    let result = with_toppy(cli, config, |toppy| {
        toppy
            .download(src, target, |p| view.update(p))
            .with_context(|| format!("Download of {src} failed"))
    });
    finish(&view, result)
}

/// Put command implementation.
pub(crate) fn cmd_put(cli: &Cli, config: &Config, src: &Path, dst: &str) -> Result<()> {
    let source = UploadSource::open(src)?;
    let view = ProgressView::new(Some(source.size()), cli.is_quiet(config));

    let result = with_toppy(cli, config, |toppy| {
        toppy
            .upload(source, dst, |p| view.update(p))
            .with_context(|| format!("Upload to {dst} failed"))
    });
    finish(&view, result)
}

fn finish(view: &ProgressView, result: Result<TransferSummary>) -> Result<()> {
    match result {
        Ok(summary) => {
            view.finish(&summary);
            Ok(())
        },
        Err(e) => {
            view.abandon();
            Err(e)
        },
    }
}
