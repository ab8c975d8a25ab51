//! Transfer throughput and time estimates.

use std::fmt;
use std::time::Duration;

/// Snapshot of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Size of the whole file.
    pub total: u64,
    /// Bytes moved so far.
    pub bytes: u64,
    /// Time since the transfer started.
    pub elapsed: Duration,
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferSummary {
    /// Bytes moved.
    pub bytes: u64,
    /// Wall time taken.
    pub elapsed: Duration,
}

#[allow(clippy::cast_precision_loss)]
fn mbits_per_sec(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    (secs > 0.0).then(|| (bytes as f64 * 8.0) / secs / 1_000_000.0)
}

impl TransferProgress {
    /// Completion in percent.
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.bytes as f64 / self.total as f64
    }

    /// Average rate so far, in megabits per second.
    pub fn mbits_per_sec(&self) -> Option<f64> {
        mbits_per_sec(self.bytes, self.elapsed)
    }

    /// Estimated time left at the average rate so far.
    #[allow(clippy::cast_precision_loss)]
    pub fn remaining(&self) -> Option<Duration> {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 || self.bytes == 0 {
            return None;
        }
        let rate = self.bytes as f64 / secs;
        let left = self.total.saturating_sub(self.bytes) as f64 / rate;
        Some(Duration::from_secs_f64(left))
    }
}

impl fmt::Display for TransferProgress {
    /// `" 42.00%,  9.87 Mbits/s, 00:01:02 elapsed, 00:01:25 remaining"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:6.2}%, {:5.2} Mbits/s, {} elapsed, {} remaining",
            self.percent(),
            self.mbits_per_sec().unwrap_or(0.0),
            format_hms(self.elapsed),
            self.remaining()
                .map_or_else(|| "--:--:--".to_string(), format_hms),
        )
    }
}

impl TransferSummary {
    /// Size in megabytes (10^6 bytes).
    #[allow(clippy::cast_precision_loss)]
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / 1_000_000.0
    }

    /// Average rate in megabits per second.
    pub fn mbits_per_sec(&self) -> Option<f64> {
        mbits_per_sec(self.bytes, self.elapsed)
    }
}

impl fmt::Display for TransferSummary {
    /// `"12.34 Mbytes in 00:00:10 (9.87 Mbits/s)"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} Mbytes in {} ({:.2} Mbits/s)",
            self.megabytes(),
            format_hms(self.elapsed),
            self.mbits_per_sec().unwrap_or(0.0)
        )
    }
}

/// Format whole seconds as `hh:mm:ss`.
pub fn format_hms(d: Duration) -> String {
    let s = d.as_secs();
    format!("{:02}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60)
}
