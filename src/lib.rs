//! Rolling, disk-backed buffer of SDR IQ samples that can be rewound.
//!
//! A capture session writes fixed-length chunks into a directory and prunes
//! it to the configured buffer length after every chunk. Independently,
//! any slice of the buffered history can be pulled back out as one
//! contiguous `complex64` file.

pub mod capture;
pub mod chunk;
pub mod complex;
pub mod device;
pub mod error;
pub mod extract;
pub mod monitoring;
pub mod replay;
pub mod retention;
pub mod store;

pub use capture::{CaptureConfig, CaptureLoop, CaptureReport, CaptureState, Shutdown, StopHandle};
pub use chunk::{ChunkId, ChunkMeta, ExtractMeta};
pub use complex::{Complex, Complex32};
pub use device::{DeviceConfig, Driver, Gain, SampleSource};
pub use error::{Result, RewindError};
pub use extract::{extract, extract_at, ExtractReport, ExtractRequest, Window};
pub use store::{ChunkEntry, ChunkStore, DirectoryStore, MemoryStore};

/// Default capture sample rate (Hz)
pub const DEFAULT_SAMP_RATE: f64 = 2.4e6;
/// Default chunk length (s)
pub const DEFAULT_CHUNK_S: f64 = 5.0;
/// Default buffer length (s)
pub const DEFAULT_BUFFER_S: f64 = 60.0;
