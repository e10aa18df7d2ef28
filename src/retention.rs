//! Retention enforcement: keep the newest chunks covering the buffer length,
//! delete everything older in whole-chunk units.
//!
//! Durations are nominal (the configured chunk length), not measured, so the
//! retained history is always at least `retention_s` once enough has been
//! captured, and less than `retention_s` plus one chunk.

use std::cmp::Reverse;

use tracing::debug;

use crate::{
    chunk::ChunkId,
    error::Result,
    store::{ChunkEntry, ChunkStore},
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PruneReport {
    /// Chunks kept
    pub kept: usize,
    /// Nominal seconds covered by the kept chunks
    pub retained_s: f64,
    /// Chunks deleted, newest first
    pub removed: Vec<ChunkId>,
}

/// Partition `chunks` into (kept, expired), both newest first
pub fn partition(mut chunks: Vec<ChunkEntry>, retention_s: f64) -> (Vec<ChunkEntry>, Vec<ChunkEntry>) {
    chunks.sort_by_key(|c| Reverse((c.meta.start(), c.id)));
    let mut total = 0.0;
    let mut keep = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        total += chunk.meta.duration_s;
        if total >= retention_s {
            keep = i + 1;
            break;
        }
    }
    let expired = chunks.split_off(keep);
    (chunks, expired)
}

/// Delete every chunk that falls outside the retention window
pub fn enforce<S: ChunkStore + ?Sized>(store: &mut S, retention_s: f64) -> Result<PruneReport> {
    let (kept, expired) = partition(store.chunks()?, retention_s);
    let mut removed = Vec::with_capacity(expired.len());
    for chunk in expired {
        store.remove(chunk.id)?;
        removed.push(chunk.id);
    }
    let report = PruneReport {
        kept: kept.len(),
        retained_s: kept.iter().map(|c| c.meta.duration_s).sum(),
        removed,
    };
    debug!(
        kept = report.kept,
        removed = report.removed.len(),
        retained_s = report.retained_s,
        "pruned chunk set"
    );
    Ok(report)
}
