//! On-disk layout of a capture chunk.
//!
//! A chunk is two files sharing one stem, the chunk start as integer
//! milliseconds since the epoch:
//!
//! * `<ms>.iq`   raw `complex64` samples, no header, no length prefix
//! * `<ms>.json` the descriptor ([`ChunkMeta`])
//!
//! The data file is always written before the descriptor, so a readable
//! descriptor next to a data file means the data file is complete.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{complex::DTYPE, error::Result};

pub const DATA_EXT: &str = "iq";
pub const META_EXT: &str = "json";

/// Chunk identity: start time truncated to milliseconds since the epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(pub i64);

impl ChunkId {
    pub fn from_time(time: &DateTime<Utc>) -> Self {
        Self(time.timestamp_millis())
    }

    /// Parse a file stem like `1718000000123`
    pub fn from_stem(stem: &str) -> Option<Self> {
        stem.parse().ok().map(Self)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }

    pub fn data_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{DATA_EXT}", self.0))
    }

    pub fn meta_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{META_EXT}", self.0))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO-8601 UTC timestamps. Always written with a `Z` designator and
/// millisecond precision, any RFC 3339 offset is accepted on read.
pub mod iso_z {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

/// Descriptor of one stored chunk. Unknown fields are ignored on read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub center_freq_hz: u64,
    pub samp_rate_hz: u64,
    #[serde(with = "iso_z")]
    pub timestamp_utc: DateTime<Utc>,
    /// Nominal capture duration. This is the configured value, not the
    /// measured one, and is what retention and extraction reason with.
    pub duration_s: f64,
    pub dtype: String,
}

impl ChunkMeta {
    /// Build a descriptor for a chunk starting at `start` (truncated to ms)
    pub fn new(start: DateTime<Utc>, center_freq_hz: u64, samp_rate_hz: u64, duration_s: f64) -> Self {
        let timestamp_utc = ChunkId::from_time(&start).start_time().unwrap_or(start);
        Self {
            center_freq_hz,
            samp_rate_hz,
            timestamp_utc,
            duration_s,
            dtype: DTYPE.to_owned(),
        }
    }

    pub fn id(&self) -> ChunkId {
        ChunkId::from_time(&self.timestamp_utc)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.timestamp_utc
    }

    /// `None` when the duration can't be represented past the start
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.timestamp_utc.checked_add_signed(seconds(self.duration_s)?)
    }

    /// Whether the descriptor describes a usable time span
    pub fn is_well_formed(&self) -> bool {
        self.duration_s.is_finite() && self.duration_s >= 0.0 && self.end().is_some()
    }
}

/// The window a caller asked for, relative to the moment of the request
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestedWindow {
    pub start_rel_s: f64,
    pub duration_s: f64,
}

/// Descriptor written next to an extraction result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractMeta {
    pub center_freq_hz: u64,
    pub samp_rate_hz: u64,
    #[serde(with = "iso_z")]
    pub timestamp_utc: DateTime<Utc>,
    pub requested_window: RequestedWindow,
}

/// Capture parameters common to both descriptor kinds, as read back by the
/// replay advisory
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct CaptureParams {
    pub center_freq_hz: u64,
    pub samp_rate_hz: u64,
}

/// Sidecar descriptor path for an extraction output: the suffix is appended,
/// `slice.iq` -> `slice.iq.json`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(META_EXT);
    PathBuf::from(raw)
}

pub fn write_descriptor<T: Serialize>(path: &Path, meta: &T) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(meta)?)?;
    Ok(())
}

pub fn read_descriptor<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Fractional seconds to a chrono duration, at microsecond resolution.
/// `None` for non-finite values or anything beyond an i64 of microseconds.
pub fn seconds(secs: f64) -> Option<Duration> {
    let micros = (secs * 1e6).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(Duration::microseconds(micros as i64))
}

/// Render a timestamp the way descriptors do
pub fn format_utc(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
