//! In this module, we summarize what the rolling buffer currently holds.
//! Handy for checking on a running capture from another shell before
//! deciding what to extract.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{
    chunk::format_utc,
    error::Result,
    store::ChunkStore,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BufferStatus {
    pub chunks: usize,
    /// Sum of nominal chunk durations
    pub nominal_s: f64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// End of the newest chunk
    pub covered_until: Option<DateTime<Utc>>,
    pub bytes: u64,
}

impl BufferStatus {
    pub fn scan<S: ChunkStore + ?Sized>(store: &S) -> Result<Self> {
        let chunks = store.chunks()?;
        // A chunk may get pruned between the scan and the stat
        let bytes: u64 = chunks
            .iter()
            .filter_map(|c| store.data_len(c.id).ok())
            .sum();
        let newest = chunks.iter().max_by_key(|c| c.meta.start());
        Ok(Self {
            chunks: chunks.len(),
            nominal_s: chunks.iter().map(|c| c.meta.duration_s).sum(),
            oldest: chunks.iter().map(|c| c.meta.start()).min(),
            newest: newest.map(|c| c.meta.start()),
            covered_until: newest.and_then(|c| c.meta.end()),
            bytes,
        })
    }

    /// How far back an extraction can reach from `now`, in seconds
    pub fn reach_s(&self, now: DateTime<Utc>) -> Option<f64> {
        self.oldest
            .map(|oldest| (now - oldest).num_milliseconds() as f64 / 1e3)
    }
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.oldest, self.covered_until) {
            (Some(oldest), Some(until)) => write!(
                f,
                "{} chunks, {:.1}s nominal, {} bytes, {} .. {}",
                self.chunks,
                self.nominal_s,
                self.bytes,
                format_utc(&oldest),
                format_utc(&until)
            ),
            _ => write!(f, "empty"),
        }
    }
}
