//! Device timestamps: Modified Julian Day plus wall-clock time.
//!
//! The PVR stores dates as a day count since 1858-11-17 (MJD 0) and a local
//! time of day. The device has no notion of time zones, so timestamps are
//! interpreted in the host's local zone. Both ends are expected to share a
//! zone; nothing here tries to correct for a mismatch.
//!
//! ## Wire format
//!
//! ```text
//! +--------+------+--------+--------+
//! |  MJD   | hour | minute | second |
//! +--------+------+--------+--------+
//! | u16 BE |  u8  |   u8   |   u8   |
//! +--------+------+--------+--------+
//! ```

use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};

use crate::error::{Error, Result};

/// Size of an encoded timestamp.
pub const WIRE_SIZE: usize = 5;

/// Proleptic Gregorian day number (0001-01-01 = 1) of MJD 0, 1858-11-17.
const MJD_EPOCH_DAYS_FROM_CE: i32 = 678_576;

/// A timestamp as stored by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceTime {
    /// Modified Julian Day.
    pub mjd: u16,
    /// Hour (0-23).
    pub hour: u8,
    /// Minute (0-59).
    pub minute: u8,
    /// Second (0-59).
    pub second: u8,
}

impl DeviceTime {
    /// Create a timestamp from its raw fields.
    pub fn new(mjd: u16, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            mjd,
            hour,
            minute,
            second,
        }
    }

    /// Calendar date of the MJD day count.
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_num_days_from_ce_opt(i32::from(self.mjd) + MJD_EPOCH_DAYS_FROM_CE)
    }

    /// Date and time without a zone.
    pub fn to_naive(&self) -> Result<NaiveDateTime> {
        let date = self
            .date()
            .ok_or_else(|| Error::InvalidTimestamp(format!("MJD {} out of range", self.mjd)))?;
        let time = NaiveTime::from_hms_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
        )
        .ok_or_else(|| {
            Error::InvalidTimestamp(format!(
                "{:02}:{:02}:{:02} is not a time of day",
                self.hour, self.minute, self.second
            ))
        })?;
        Ok(date.and_time(time))
    }

    /// Decode into an absolute time in the host's local zone.
    ///
    /// A wall-clock time that occurs twice (DST fall-back) resolves to the
    /// earlier instant; one that never occurs (DST spring-forward) is an error.
    pub fn to_local(&self) -> Result<DateTime<Local>> {
        let naive = self.to_naive()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| Error::InvalidTimestamp(format!("{naive} does not exist locally")))
    }

    /// Decode into a [`SystemTime`], e.g. for setting file times.
    pub fn to_system_time(&self) -> Result<SystemTime> {
        Ok(self.to_local()?.into())
    }

    /// Encode a local date and time.
    #[allow(clippy::cast_possible_truncation)] // chrono bounds hour/minute/second
    pub fn from_naive(dt: &NaiveDateTime) -> Result<Self> {
        let days = dt.date().num_days_from_ce() - MJD_EPOCH_DAYS_FROM_CE;
        let mjd = u16::try_from(days)
            .map_err(|_| Error::InvalidTimestamp(format!("{dt} is outside the MJD range")))?;

        Ok(Self {
            mjd,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        })
    }

    /// Encode an absolute time, expressed in the host's local zone.
    pub fn from_local(dt: &DateTime<Local>) -> Result<Self> {
        Self::from_naive(&dt.naive_local())
    }

    /// Encode a [`SystemTime`], e.g. a file's modification time.
    pub fn from_system_time(t: SystemTime) -> Result<Self> {
        Self::from_local(&DateTime::<Local>::from(t))
    }

    /// Parse from the 5-byte wire form.
    pub fn from_bytes(b: &[u8; WIRE_SIZE]) -> Self {
        Self {
            mjd: u16::from_be_bytes([b[0], b[1]]),
            hour: b[2],
            minute: b[3],
            second: b[4],
        }
    }

    /// Serialize to the 5-byte wire form.
    pub fn to_bytes(&self) -> [u8; WIRE_SIZE] {
        let [hi, lo] = self.mjd.to_be_bytes();
        [hi, lo, self.hour, self.minute, self.second]
    }
}

impl fmt::Display for DeviceTime {
    /// Formats like `ctime(3)`, falling back to the raw fields.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Ok(dt) => write!(f, "{}", dt.format("%a %b %e %H:%M:%S %Y")),
            Err(_) => write!(
                f,
                "MJD {} {:02}:{:02}:{:02}",
                self.mjd, self.hour, self.minute, self.second
            ),
        }
    }
}
