//! In-process store, for tests and embedders without a disk

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, StoreError};
use crate::id::FileId;
use crate::model::{FeatureGroup, FileState};

use super::{Chunk, FeatureStore, MetadataRecord};

#[derive(Default)]
struct Inner {
    chunks: BTreeMap<(FileId, u32), Chunk>,
    metadata: BTreeMap<FileId, MetadataRecord>,
}

/// Keeps chunks and metadata records in ordered maps
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".into()))
    }

    /// Number of chunks stored for a file
    pub fn chunk_count(&self, file_id: FileId) -> usize {
        self.read()
            .map(|inner| inner.chunks.range((file_id, 0)..=(file_id, u32::MAX)).count())
            .unwrap_or(0)
    }
}

impl FeatureStore for MemoryStore {
    async fn put_chunk(&self, file_id: FileId, index: u32, groups: &[FeatureGroup]) -> Result<()> {
        self.write()?.chunks.insert((file_id, index), groups.to_vec());
        Ok(())
    }

    async fn get_chunk(&self, file_id: FileId, index: u32) -> Result<Option<Chunk>> {
        Ok(self.read()?.chunks.get(&(file_id, index)).cloned())
    }

    async fn get_chunk_range(&self, file_id: FileId, first: u32, last: u32) -> Result<Vec<Chunk>> {
        if first > last {
            return Ok(Vec::new());
        }
        Ok(self
            .read()?
            .chunks
            .range((file_id, first)..=(file_id, last))
            .map(|(_, chunk)| chunk.clone())
            .collect())
    }

    async fn get_all_chunks(&self, file_id: FileId) -> Result<Vec<Chunk>> {
        self.get_chunk_range(file_id, 0, u32::MAX).await
    }

    async fn delete_file(&self, file_id: FileId) -> Result<()> {
        let mut inner = self.write()?;
        inner.metadata.remove(&file_id);
        inner.chunks.retain(|(id, _), _| *id != file_id);
        Ok(())
    }

    async fn put_metadata(&self, file_id: FileId, state: &FileState) -> Result<()> {
        self.write()?.metadata.insert(file_id, MetadataRecord::from(state));
        Ok(())
    }

    async fn get_metadata(&self, file_id: FileId) -> Result<Option<FileState>> {
        Ok(self.read()?.metadata.get(&file_id).cloned().map(FileState::from))
    }

    async fn list_files(&self) -> Result<Vec<FileId>> {
        Ok(self.read()?.metadata.keys().copied().collect())
    }
}
