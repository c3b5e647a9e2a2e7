//! Durable store via sled KV store
//!
//! Two trees:
//! - `chunks`: `file_id (16 bytes BE) ++ chunk_index (4 bytes BE)` -> bincode chunk
//! - `metadata`: `file_id (16 bytes BE)` -> JSON [`MetadataRecord`]
//!
//! Big-endian keys keep one file's chunks contiguous and in index order, so range
//! and prefix scans return chunks in arrival order.

use std::path::Path;

use sled::{Batch, Db, Tree};

use crate::error::{Result, StoreError};
use crate::id::FileId;
use crate::model::{FeatureGroup, FileState};

use super::{Chunk, FeatureStore, MetadataRecord};

const CHUNKS_TREE: &str = "chunks";
const METADATA_TREE: &str = "metadata";

fn chunk_key(file_id: FileId, index: u32) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..16].copy_from_slice(&file_id.to_key());
    key[16..].copy_from_slice(&index.to_be_bytes());
    key
}

fn decode_chunk(bytes: &[u8]) -> Result<Chunk> {
    Ok(bincode::deserialize(bytes)?)
}

pub struct SledStore {
    db: Db,
    chunks: Tree,
    metadata: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Store that is removed when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let chunks = db.open_tree(CHUNKS_TREE)?;
        let metadata = db.open_tree(METADATA_TREE)?;
        Ok(Self { db, chunks, metadata })
    }

    /// Approximate on-disk size in bytes
    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }
}

impl FeatureStore for SledStore {
    async fn put_chunk(&self, file_id: FileId, index: u32, groups: &[FeatureGroup]) -> Result<()> {
        let bytes = bincode::serialize(groups)?;
        self.chunks.insert(chunk_key(file_id, index), bytes)?;
        Ok(())
    }

    async fn get_chunk(&self, file_id: FileId, index: u32) -> Result<Option<Chunk>> {
        match self.chunks.get(chunk_key(file_id, index))? {
            Some(bytes) => Ok(Some(decode_chunk(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_chunk_range(&self, file_id: FileId, first: u32, last: u32) -> Result<Vec<Chunk>> {
        if first > last {
            return Ok(Vec::new());
        }
        let mut chunks = Vec::new();
        for item in self.chunks.range(chunk_key(file_id, first)..=chunk_key(file_id, last)) {
            let (_, bytes) = item?;
            chunks.push(decode_chunk(&bytes)?);
        }
        Ok(chunks)
    }

    async fn get_all_chunks(&self, file_id: FileId) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for item in self.chunks.scan_prefix(file_id.to_key()) {
            let (_, bytes) = item?;
            chunks.push(decode_chunk(&bytes)?);
        }
        Ok(chunks)
    }

    async fn delete_file(&self, file_id: FileId) -> Result<()> {
        self.metadata.remove(file_id.to_key())?;

        let mut batch = Batch::default();
        let mut removed = 0usize;
        for key in self.chunks.scan_prefix(file_id.to_key()).keys() {
            batch.remove(key?);
            removed += 1;
        }
        self.chunks.apply_batch(batch)?;

        tracing::debug!("Deleted {} chunks of file {}", removed, file_id);
        Ok(())
    }

    async fn put_metadata(&self, file_id: FileId, state: &FileState) -> Result<()> {
        let bytes = serde_json::to_vec(&MetadataRecord::from(state))?;
        self.metadata.insert(file_id.to_key(), bytes)?;
        Ok(())
    }

    async fn get_metadata(&self, file_id: FileId) -> Result<Option<FileState>> {
        match self.metadata.get(file_id.to_key())? {
            Some(bytes) => {
                let record: MetadataRecord = serde_json::from_slice(&bytes)?;
                Ok(Some(record.into()))
            }
            None => Ok(None),
        }
    }

    async fn list_files(&self) -> Result<Vec<FileId>> {
        let mut files = Vec::new();
        for key in self.metadata.iter().keys() {
            let key = key?;
            let file_id = FileId::from_key(&key)
                .ok_or_else(|| StoreError::Corrupt(format!("metadata key of {} bytes", key.len())))?;
            files.push(file_id);
        }
        Ok(files)
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}
