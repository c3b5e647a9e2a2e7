//! Moves parsed groups from the parse buffer into stored chunks
//!
//! Chunks get consecutive indices starting at 0. Every `yield_every` written
//! chunks control goes back to the executor, so a long ingestion does not
//! starve other tasks on the same thread.

use crate::config::IngestConfig;
use crate::error::Result;
use crate::id::FileId;
use crate::model::FeatureGroup;
use crate::parse::ParseCache;
use crate::store::FeatureStore;

pub struct ChunkAccumulator<'a, S: FeatureStore> {
    store: &'a S,
    file_id: FileId,
    chunk_size: usize,
    yield_every: usize,
    next_index: u32,
    groups_written: u64,
    yields: u32,
}

impl<'a, S: FeatureStore> ChunkAccumulator<'a, S> {
    pub fn new(store: &'a S, file_id: FileId, config: &IngestConfig) -> Self {
        Self {
            store,
            file_id,
            chunk_size: config.chunk_size.max(1),
            yield_every: config.yield_every.max(1),
            next_index: 0,
            groups_written: 0,
            yields: 0,
        }
    }

    /// Write every complete chunk sitting in the buffer
    pub async fn drain_full(&mut self, cache: &mut ParseCache) -> Result<()> {
        while cache.buffered() >= self.chunk_size {
            let chunk = cache.take_chunk(self.chunk_size);
            self.write(chunk).await?;
        }
        Ok(())
    }

    /// End of input: write the remaining groups, if any, as the last chunk
    pub async fn finish(&mut self, cache: &mut ParseCache) -> Result<()> {
        self.drain_full(cache).await?;
        if cache.buffered() > 0 {
            let chunk = cache.take_chunk(cache.buffered());
            self.write(chunk).await?;
        }
        Ok(())
    }

    async fn write(&mut self, chunk: Vec<FeatureGroup>) -> Result<()> {
        let index = self.next_index;
        self.store.put_chunk(self.file_id, index, &chunk).await?;
        self.next_index += 1;
        self.groups_written += chunk.len() as u64;

        tracing::debug!(
            "Flushed chunk {} of file {} ({} groups)",
            index,
            self.file_id,
            chunk.len()
        );

        if self.next_index as usize % self.yield_every == 0 {
            tokio::task::yield_now().await;
            self.yields += 1;
        }
        Ok(())
    }

    pub fn chunks_written(&self) -> u32 {
        self.next_index
    }

    pub fn groups_written(&self) -> u64 {
        self.groups_written
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Times control went back to the executor
    pub fn yields(&self) -> u32 {
        self.yields
    }
}
