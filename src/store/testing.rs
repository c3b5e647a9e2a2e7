//! Instrumented store for tests: counts reads and injects write failures

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{Result, StoreError};
use crate::id::FileId;
use crate::model::{FeatureGroup, FileState};

use super::{Chunk, FeatureStore, MemoryStore};

#[derive(Default)]
pub(crate) struct SpyStore {
    pub inner: MemoryStore,
    pub metadata_reads: AtomicUsize,
    pub chunk_reads: AtomicUsize,
    pub range_reads: AtomicUsize,
    /// Chunks returned by single and range reads together
    pub chunks_served: AtomicUsize,
    /// `put_chunk` fails for this chunk index and above
    pub fail_chunk_from: Option<u32>,
    pub fail_metadata_write: bool,
    /// Next `get_chunk` fails once
    pub fail_next_chunk_read: AtomicBool,
}

fn injected() -> StoreError {
    StoreError::Corrupt("injected failure".into())
}

impl SpyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata_reads(&self) -> usize {
        self.metadata_reads.load(Ordering::SeqCst)
    }

    pub fn chunk_reads(&self) -> usize {
        self.chunk_reads.load(Ordering::SeqCst)
    }

    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    pub fn chunks_served(&self) -> usize {
        self.chunks_served.load(Ordering::SeqCst)
    }
}

impl FeatureStore for SpyStore {
    async fn put_chunk(&self, file_id: FileId, index: u32, groups: &[FeatureGroup]) -> Result<()> {
        if self.fail_chunk_from.is_some_and(|from| index >= from) {
            return Err(injected());
        }
        self.inner.put_chunk(file_id, index, groups).await
    }

    async fn get_chunk(&self, file_id: FileId, index: u32) -> Result<Option<Chunk>> {
        self.chunk_reads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_next_chunk_read.swap(false, Ordering::SeqCst) {
            return Err(injected());
        }
        let chunk = self.inner.get_chunk(file_id, index).await?;
        if chunk.is_some() {
            self.chunks_served.fetch_add(1, Ordering::SeqCst);
        }
        Ok(chunk)
    }

    async fn get_chunk_range(&self, file_id: FileId, first: u32, last: u32) -> Result<Vec<Chunk>> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let chunks = self.inner.get_chunk_range(file_id, first, last).await?;
        self.chunks_served.fetch_add(chunks.len(), Ordering::SeqCst);
        Ok(chunks)
    }

    async fn get_all_chunks(&self, file_id: FileId) -> Result<Vec<Chunk>> {
        self.inner.get_all_chunks(file_id).await
    }

    async fn delete_file(&self, file_id: FileId) -> Result<()> {
        self.inner.delete_file(file_id).await
    }

    async fn put_metadata(&self, file_id: FileId, state: &FileState) -> Result<()> {
        if self.fail_metadata_write {
            return Err(injected());
        }
        self.inner.put_metadata(file_id, state).await
    }

    async fn get_metadata(&self, file_id: FileId) -> Result<Option<FileState>> {
        self.metadata_reads.fetch_add(1, Ordering::SeqCst);
        // let concurrent callers pile up on the same load
        tokio::task::yield_now().await;
        self.inner.get_metadata(file_id).await
    }

    async fn list_files(&self) -> Result<Vec<FileId>> {
        self.inner.list_files().await
    }
}
