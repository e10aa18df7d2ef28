//! The chunk set.
//!
//! Retention and extraction only ever talk to a [`ChunkStore`]. The
//! production store is a plain directory that is rescanned on every call;
//! [`MemoryStore`] keeps an ordered index keyed by start time instead.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    chunk::{read_descriptor, write_descriptor, ChunkId, ChunkMeta, META_EXT},
    error::Result,
};

/// A complete chunk: descriptor parsed and data present
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkEntry {
    pub id: ChunkId,
    pub meta: ChunkMeta,
}

pub trait ChunkStore {
    /// Every complete chunk, in no guaranteed order.
    /// Incomplete or unreadable chunks are left out silently.
    fn chunks(&self) -> Result<Vec<ChunkEntry>>;

    /// Raw sample bytes of a chunk
    fn read_data(&self, id: ChunkId) -> Result<Vec<u8>>;

    /// Size of a chunk's raw data in bytes
    fn data_len(&self, id: ChunkId) -> Result<u64>;

    /// Persist a chunk, data first and descriptor second
    fn write(&mut self, meta: &ChunkMeta, data: &[u8]) -> Result<ChunkId>;

    /// Delete both halves of a chunk. Already missing halves are fine.
    fn remove(&mut self, id: ChunkId) -> Result<()>;
}

/// Directory-as-database: one `<ms>.iq`/`<ms>.json` pair per chunk
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    /// Use `dir` as the chunk set, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_for(&self, path: &Path) -> Option<ChunkEntry> {
        let id = ChunkId::from_stem(path.file_stem()?.to_str()?)?;
        if !id.data_path(&self.dir).is_file() {
            debug!(%id, "descriptor without data, skipping");
            return None;
        }
        match read_descriptor::<ChunkMeta>(path) {
            Ok(meta) if meta.is_well_formed() => Some(ChunkEntry { id, meta }),
            Ok(meta) => {
                warn!(%id, duration_s = meta.duration_s, "descriptor has no usable span, skipping");
                None
            }
            Err(e) => {
                warn!(%id, "unreadable descriptor, skipping: {e}");
                None
            }
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl ChunkStore for DirectoryStore {
    fn chunks(&self) -> Result<Vec<ChunkEntry>> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            // Entries can vanish under us while a prune runs
            let path = match dirent {
                Ok(d) => d.path(),
                Err(_) => continue,
            };
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            if let Some(entry) = self.entry_for(&path) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn read_data(&self, id: ChunkId) -> Result<Vec<u8>> {
        Ok(fs::read(id.data_path(&self.dir))?)
    }

    fn data_len(&self, id: ChunkId) -> Result<u64> {
        Ok(fs::metadata(id.data_path(&self.dir))?.len())
    }

    fn write(&mut self, meta: &ChunkMeta, data: &[u8]) -> Result<ChunkId> {
        let id = meta.id();
        fs::write(id.data_path(&self.dir), data)?;
        write_descriptor(&id.meta_path(&self.dir), meta)?;
        Ok(id)
    }

    fn remove(&mut self, id: ChunkId) -> Result<()> {
        // Descriptor goes first so readers never see it without its data
        remove_if_present(&id.meta_path(&self.dir))?;
        remove_if_present(&id.data_path(&self.dir))?;
        Ok(())
    }
}

/// In-memory chunk set ordered by start time
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    chunks: BTreeMap<ChunkId, (ChunkMeta, Vec<u8>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn missing(id: ChunkId) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("chunk {id} not in store"))
}

impl ChunkStore for MemoryStore {
    fn chunks(&self) -> Result<Vec<ChunkEntry>> {
        Ok(self
            .chunks
            .iter()
            .map(|(id, (meta, _))| ChunkEntry {
                id: *id,
                meta: meta.clone(),
            })
            .collect())
    }

    fn read_data(&self, id: ChunkId) -> Result<Vec<u8>> {
        let (_, data) = self.chunks.get(&id).ok_or_else(|| missing(id))?;
        Ok(data.clone())
    }

    fn data_len(&self, id: ChunkId) -> Result<u64> {
        let (_, data) = self.chunks.get(&id).ok_or_else(|| missing(id))?;
        Ok(data.len() as u64)
    }

    fn write(&mut self, meta: &ChunkMeta, data: &[u8]) -> Result<ChunkId> {
        let id = meta.id();
        self.chunks.insert(id, (meta.clone(), data.to_vec()));
        Ok(id)
    }

    fn remove(&mut self, id: ChunkId) -> Result<()> {
        self.chunks.remove(&id);
        Ok(())
    }
}
