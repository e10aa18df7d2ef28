//! Error taxonomy shared by capture, retention and extraction

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewindError {
    #[error("unsupported capture driver '{0}'")]
    UnsupportedDriver(String),

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("device configuration failed: {0}")]
    DeviceConfig(String),

    #[error("device read failed: {0}")]
    DeviceRead(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no chunks found for requested window [{start}, {end})")]
    NoChunksInWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("descriptor error: {0}")]
    Descriptor(#[from] serde_json::Error),
}

impl RewindError {
    /// Process exit status for this error.
    ///
    /// Errors raised before any resource is acquired get a distinct status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnsupportedDriver(_) | Self::DeviceUnavailable(_) | Self::InvalidArgument(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, RewindError>;
