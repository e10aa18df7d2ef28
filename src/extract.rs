//! Rewind: rebuild a contiguous sample stream for a window of past time.
//!
//! Chunks are picked by overlap with the requested window and concatenated
//! whole, in start-time order. Nothing is trimmed, so the output can start
//! before and end after the window by up to one chunk on either side.

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{
    chunk::{seconds, sidecar_path, write_descriptor, ChunkId, ChunkMeta, ExtractMeta, RequestedWindow},
    error::{Result, RewindError},
    store::{ChunkEntry, ChunkStore},
};

/// A window relative to the moment the request is served
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractRequest {
    /// Negative means in the past
    pub start_offset_s: f64,
    pub duration_s: f64,
}

impl ExtractRequest {
    pub fn new(start_offset_s: f64, duration_s: f64) -> Result<Self> {
        if !start_offset_s.is_finite() {
            return Err(RewindError::InvalidArgument(format!(
                "start offset must be finite, got {start_offset_s}"
            )));
        }
        if !(duration_s.is_finite() && duration_s >= 0.0) {
            return Err(RewindError::InvalidArgument(format!(
                "duration must be non-negative, got {duration_s}"
            )));
        }
        Ok(Self {
            start_offset_s,
            duration_s,
        })
    }

    /// Absolute window as seen from `now`. Offsets that land outside the
    /// representable calendar are rejected.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<Window> {
        let out_of_range = || {
            RewindError::InvalidArgument(format!(
                "window {}s + {}s is out of range",
                self.start_offset_s, self.duration_s
            ))
        };
        let start = seconds(self.start_offset_s)
            .and_then(|offset| now.checked_add_signed(offset))
            .ok_or_else(out_of_range)?;
        let end = seconds(self.duration_s)
            .and_then(|len| start.checked_add_signed(len))
            .ok_or_else(out_of_range)?;
        Ok(Window { start, end })
    }
}

/// Absolute `[start, end)` window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn overlaps(&self, meta: &ChunkMeta) -> bool {
        match meta.end() {
            Some(end) => meta.start() <= self.end && end >= self.start,
            None => false,
        }
    }
}

/// Chunks overlapping `window`, oldest first.
/// Ordering comes from the descriptors, never from enumeration order.
pub fn select(chunks: Vec<ChunkEntry>, window: &Window) -> Vec<ChunkEntry> {
    let mut selected: Vec<_> = chunks
        .into_iter()
        .filter(|c| window.overlaps(&c.meta))
        .collect();
    selected.sort_by_key(|c| (c.meta.start(), c.id));
    selected
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractReport {
    pub window: Window,
    pub output: PathBuf,
    pub descriptor: PathBuf,
    /// Chunks concatenated into the output, in order
    pub included: Vec<ChunkId>,
    /// Selected chunks whose data could not be read
    pub skipped: Vec<ChunkId>,
    pub bytes: u64,
}

/// [`extract_at`] against the wall clock
pub fn extract<S: ChunkStore + ?Sized>(
    store: &S,
    request: &ExtractRequest,
    output: &Path,
) -> Result<ExtractReport> {
    extract_at(store, request, Utc::now(), output)
}

/// Write the chunks overlapping `request` (resolved against `now`) to
/// `output`, plus a descriptor at `output` + `.json`.
///
/// Fails with [`RewindError::NoChunksInWindow`] and leaves no files behind
/// when nothing overlaps.
pub fn extract_at<S: ChunkStore + ?Sized>(
    store: &S,
    request: &ExtractRequest,
    now: DateTime<Utc>,
    output: &Path,
) -> Result<ExtractReport> {
    let window = request.resolve(now)?;
    let selected = select(store.chunks()?, &window);
    debug!(
        start = %window.start,
        end = %window.end,
        selected = selected.len(),
        "resolved extraction window"
    );
    if selected.is_empty() {
        return Err(RewindError::NoChunksInWindow {
            start: window.start,
            end: window.end,
        });
    }

    let mut report = ExtractReport {
        window,
        output: output.to_owned(),
        descriptor: sidecar_path(output),
        included: Vec::with_capacity(selected.len()),
        skipped: Vec::new(),
        bytes: 0,
    };
    // Stage next to the destination so an existing file survives a failed run
    let mut staged = NamedTempFile::new_in(staging_dir(output))?;
    let first = match concatenate(store, &selected, staged.as_file_mut(), &mut report)? {
        Some(first) => first,
        // Everything selected was pruned before we could read it
        None => {
            return Err(RewindError::NoChunksInWindow {
                start: window.start,
                end: window.end,
            })
        }
    };
    staged.persist(output).map_err(|e| e.error)?;

    let meta = ExtractMeta {
        center_freq_hz: first.center_freq_hz,
        samp_rate_hz: first.samp_rate_hz,
        timestamp_utc: now,
        requested_window: RequestedWindow {
            start_rel_s: request.start_offset_s,
            duration_s: request.duration_s,
        },
    };
    if let Err(e) = write_descriptor(&report.descriptor, &meta) {
        let _ = fs::remove_file(output);
        return Err(e);
    }
    info!(
        chunks = report.included.len(),
        bytes = report.bytes,
        "Wrote slice -> {}",
        output.display()
    );
    Ok(report)
}

fn staging_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Copy chunk data into `out` in order, returning the descriptor of the
/// first chunk that made it in
fn concatenate<S: ChunkStore + ?Sized, W: Write>(
    store: &S,
    selected: &[ChunkEntry],
    out: W,
    report: &mut ExtractReport,
) -> Result<Option<ChunkMeta>> {
    let mut out = BufWriter::new(out);
    let mut first = None;
    for chunk in selected {
        let data = match store.read_data(chunk.id) {
            Ok(data) => data,
            Err(e) => {
                warn!(id = %chunk.id, "skipping unreadable chunk: {e}");
                report.skipped.push(chunk.id);
                continue;
            }
        };
        out.write_all(&data)?;
        report.bytes += data.len() as u64;
        report.included.push(chunk.id);
        first.get_or_insert_with(|| chunk.meta.clone());
    }
    out.flush()?;
    Ok(first)
}
