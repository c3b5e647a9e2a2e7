//! Persistent store: feature chunks keyed by (file, chunk index) and one
//! metadata record per file.
//!
//! Every operation is asynchronous and fallible. The core never retries.

mod memory;
mod record;
mod sled_store;
#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use crate::error::Result;
use crate::id::FileId;
use crate::model::{FeatureGroup, FileState};

pub use memory::MemoryStore;
pub use record::MetadataRecord;
pub use sled_store::SledStore;

/// Ordered batch of feature groups, the unit of storage
pub type Chunk = Vec<FeatureGroup>;

/// Storage backend shared by ingestion runs and proxies
pub trait FeatureStore: Send + Sync {
    /// Write chunk `index` of a file. Chunks are never rewritten by the core.
    fn put_chunk(
        &self,
        file_id: FileId,
        index: u32,
        groups: &[FeatureGroup],
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_chunk(&self, file_id: FileId, index: u32) -> impl Future<Output = Result<Option<Chunk>>> + Send;

    /// Chunks `first..=last` that exist, in index order
    fn get_chunk_range(
        &self,
        file_id: FileId,
        first: u32,
        last: u32,
    ) -> impl Future<Output = Result<Vec<Chunk>>> + Send;

    /// Every chunk of a file, in index order
    fn get_all_chunks(&self, file_id: FileId) -> impl Future<Output = Result<Vec<Chunk>>> + Send;

    /// Remove the metadata record, then every chunk of the file
    fn delete_file(&self, file_id: FileId) -> impl Future<Output = Result<()>> + Send;

    fn put_metadata(&self, file_id: FileId, state: &FileState) -> impl Future<Output = Result<()>> + Send;

    fn get_metadata(&self, file_id: FileId) -> impl Future<Output = Result<Option<FileState>>> + Send;

    /// Files with a metadata record, i.e. completed ingestions
    fn list_files(&self) -> impl Future<Output = Result<Vec<FileId>>> + Send;

    /// Make previous writes durable
    fn flush(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}
