//! Disk size and directory listing commands.

use anyhow::{Context, Result};
use toppy::{DirEntry, HddSize};

use crate::Cli;
use crate::commands::with_toppy;
use crate::config::Config;

/// `ctime(3)`-style layout used in listings.
const LISTING_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Size command implementation.
pub(crate) fn cmd_size(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let size = with_toppy(cli, config, |toppy| {
        toppy.hdd_size().context("Can not read disk size")
    })?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": serde_json::to_value(size)?,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", format_size(&size));
    }
    Ok(())
}

/// Dir command implementation.
pub(crate) fn cmd_dir(cli: &Cli, config: &Config, path: &str, json: bool) -> Result<()> {
    let entries = with_toppy(cli, config, |toppy| {
        toppy
            .hdd_dir(path)
            .with_context(|| format!("Can not list {path}"))
    })?;

    if json {
        let entries: Vec<serde_json::Value> = entries.iter().map(entry_json).collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "path": path,
                "entries": entries,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for entry in &entries {
            println!("{}", format_entry(entry));
        }
    }
    Ok(())
}

/// Render disk capacity in KiB, MiB and GiB.
pub(crate) fn format_size(size: &HddSize) -> String {
    let line = |label: &str, kib: u32| {
        format!(
            "{label} {:>10} kiB {:>7} MiB {:>4} GiB",
            kib,
            kib / 1024,
            kib / (1024 * 1024)
        )
    };
    format!(
        "{}\n{}",
        line("Total", size.total_kib),
        line("Free ", size.free_kib)
    )
}

fn modified(entry: &DirEntry) -> Option<chrono::DateTime<chrono::Local>> {
    entry.stamp.to_local().ok()
}

/// One listing line: type marker, size, modification time and name.
pub(crate) fn format_entry(entry: &DirEntry) -> String {
    let time = modified(entry).map_or_else(
        || entry.stamp.to_string(),
        |t| t.format(LISTING_TIME_FORMAT).to_string(),
    );
    format!(
        "{} {:>20} {:24.24} {}",
        entry.kind.marker(),
        entry.size,
        time,
        entry.name
    )
}

fn entry_json(entry: &DirEntry) -> serde_json::Value {
    serde_json::json!({
        "name": entry.name,
        "type": entry.kind,
        "size": entry.size,
        "modified": modified(entry).map(|t| t.to_rfc3339()),
        "attrib": entry.attrib,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use toppy::{DeviceTime, FileKind};

    #[test]
    fn test_format_size() {
        let size = HddSize {
            total_kib: 160_000_000,
            free_kib: 2048,
        };
        assert_eq!(
            format_size(&size),
            "Total  160000000 kiB  156250 MiB  152 GiB\n\
             Free        2048 kiB       2 MiB    0 GiB"
        );
    }

    #[test]
    fn test_format_file_entry() {
        let entry = DirEntry::file("show.rec", 100, DeviceTime::new(51544, 0, 0, 0));
        let line = format_entry(&entry);
        assert_eq!(line, format!("f {:>20} Sat Jan  1 00:00:00 2000 show.rec", 100));
        assert_eq!(line.len(), 2 + 20 + 1 + 24 + 1 + "show.rec".len());
    }

    #[test]
    fn test_format_directory_entry() {
        let entry = DirEntry {
            kind: FileKind::Directory,
            ..DirEntry::file("DataFiles", 0, DeviceTime::new(55000, 13, 5, 9))
        };
        let line = format_entry(&entry);
        assert!(line.starts_with("d "));
        assert!(line.ends_with(" DataFiles"));
    }

    #[test]
    fn test_entry_json() {
        let entry = DirEntry::file("a.rec", 42, DeviceTime::new(51544, 0, 0, 0));
        let value = entry_json(&entry);
        assert_eq!(value["name"], "a.rec");
        assert_eq!(value["type"], "file");
        assert_eq!(value["size"], 42);
        assert!(value["modified"].as_str().unwrap().starts_with("2000-01-01T00:00:00"));
    }
}
