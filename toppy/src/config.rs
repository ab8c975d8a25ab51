//! Engine configuration.

use std::time::Duration;

pub use crate::protocol::packet::CrcMode;
use crate::transport::DEFAULT_TIMEOUT;

/// Settings for one [`Toppy`](crate::Toppy) session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How received CRCs are checked.
    pub crc_mode: CrcMode,
    /// Packet dump level: 0 off, 1 headers, 2 and above full packets.
    pub packet_trace: u8,
    /// Suppress transfer progress reports.
    pub quiet: bool,
    /// Timeout per bulk transfer.
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crc_mode: CrcMode::Warn,
            packet_trace: 0,
            quiet: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Config {
    /// Set the CRC mode.
    #[must_use]
    pub fn with_crc_mode(mut self, crc_mode: CrcMode) -> Self {
        self.crc_mode = crc_mode;
        self
    }

    /// Set the packet dump level.
    #[must_use]
    pub fn with_packet_trace(mut self, level: u8) -> Self {
        self.packet_trace = level;
        self
    }

    /// Enable or disable quiet transfers.
    #[must_use]
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Set the per-transfer timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.crc_mode, CrcMode::Warn);
        assert_eq!(config.packet_trace, 0);
        assert!(!config.quiet);
        assert_eq!(config.timeout, Duration::from_millis(11000));
    }

    #[test]
    fn test_builder() {
        let config = Config::default()
            .with_crc_mode(CrcMode::Ignore)
            .with_packet_trace(2)
            .with_quiet(true)
            .with_timeout(Duration::from_secs(3));
        assert_eq!(config.crc_mode, CrcMode::Ignore);
        assert_eq!(config.packet_trace, 2);
        assert!(config.quiet);
        assert_eq!(config.timeout, Duration::from_secs(3));
    }
}
