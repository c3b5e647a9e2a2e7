//! Lazy read-side view of one ingested file
//!
//! Nothing is fetched on construction. Metadata is read once on the first
//! `load_metadata` (concurrent callers share that single read) and chunks are
//! fetched on demand with the same discipline per chunk index. Fetched data
//! stays cached for the lifetime of the proxy.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{OnceCell, OwnedRwLockWriteGuard, RwLock};

use crate::detect::Format;
use crate::error::{NotLoaded, ProxyError, StoreError};
use crate::id::FileId;
use crate::model::{Directives, FeatureGroup, FileState, MinMax, StrandKey};
use crate::store::{Chunk, FeatureStore};

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// Metadata lifecycle of a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// Cache lifecycle of one chunk index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    NotFetched,
    Fetching,
    Cached,
}

/// Cached chunk slot. Write-locked by the task fetching it; `None` after a
/// fetch that failed or was dropped.
type ChunkSlot = Arc<RwLock<Option<Arc<Chunk>>>>;
type FetchGuard = OwnedRwLockWriteGuard<Option<Arc<Chunk>>>;

enum Claim {
    Cached(Arc<Chunk>),
    /// Another task is fetching this chunk
    Wait(ChunkSlot),
    /// This task fetches it and fills the slot through the guard
    Fetch(ChunkSlot, FetchGuard),
}

/// Clears the loading flag even when the load future is dropped midway
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FileProxy<S: FeatureStore> {
    store: Arc<S>,
    file_id: FileId,
    metadata: OnceCell<FileState>,
    loading: AtomicBool,
    chunks: Mutex<HashMap<u32, ChunkSlot>>,
}

impl<S: FeatureStore> FileProxy<S> {
    pub fn new(store: Arc<S>, file_id: FileId) -> Self {
        Self {
            store,
            file_id,
            metadata: OnceCell::new(),
            loading: AtomicBool::new(false),
            chunks: Mutex::new(HashMap::new()),
        }
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn state(&self) -> LoadState {
        if self.metadata.initialized() {
            LoadState::Loaded
        } else if self.loading.load(Ordering::Acquire) {
            LoadState::Loading
        } else {
            LoadState::Unloaded
        }
    }

    // --- metadata accessors ---

    fn loaded(&self, field: &'static str) -> Result<&FileState, NotLoaded> {
        self.metadata.get().ok_or(NotLoaded(field))
    }

    /// Whole metadata record
    pub fn file_state(&self) -> Result<&FileState, NotLoaded> {
        self.loaded("file_state")
    }

    pub fn types(&self) -> Result<&BTreeMap<String, BTreeSet<StrandKey>>, NotLoaded> {
        self.loaded("types").map(|s| &s.types)
    }

    pub fn minmax(&self) -> Result<&BTreeMap<String, BTreeMap<StrandKey, MinMax>>, NotLoaded> {
        self.loaded("minmax").map(|s| &s.minmax)
    }

    pub fn colors(&self) -> Result<&BTreeSet<(String, StrandKey)>, NotLoaded> {
        self.loaded("colors").map(|s| &s.colors)
    }

    /// Header directives of the source file
    pub fn metadata(&self) -> Result<&Directives, NotLoaded> {
        self.loaded("metadata").map(|s| &s.directives)
    }

    pub fn format(&self) -> Result<Option<Format>, NotLoaded> {
        self.loaded("format").map(|s| s.format)
    }

    pub fn total_chunks(&self) -> Result<u32, NotLoaded> {
        self.loaded("total_chunks").map(|s| s.total_chunks)
    }

    pub fn total_features(&self) -> Result<u64, NotLoaded> {
        self.loaded("total_features").map(|s| s.total_features)
    }

    // --- loading ---

    /// Fetch the metadata record once; later and concurrent calls share it
    pub async fn load_metadata(&self) -> ProxyResult<&FileState> {
        self.metadata
            .get_or_try_init(|| async {
                let _flag = LoadingFlag::raise(&self.loading);
                match self.store.get_metadata(self.file_id).await {
                    Ok(Some(state)) => Ok(state),
                    Ok(None) => Err(ProxyError::NotIngested(self.file_id)),
                    Err(e) => Err(ProxyError::Store(e)),
                }
            })
            .await
    }

    fn lock_chunks(&self) -> MutexGuard<'_, HashMap<u32, ChunkSlot>> {
        self.chunks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn claim_locked(chunks: &mut HashMap<u32, ChunkSlot>, index: u32) -> Claim {
        if let Some(slot) = chunks.get(&index) {
            match slot.try_read() {
                Ok(cached) => {
                    if let Some(chunk) = &*cached {
                        return Claim::Cached(Arc::clone(chunk));
                    }
                }
                Err(_) => return Claim::Wait(Arc::clone(slot)),
            }
        }

        // empty or abandoned slot: take it over
        let slot: ChunkSlot = Arc::new(RwLock::new(None));
        let Ok(guard) = Arc::clone(&slot).try_write_owned() else {
            return Claim::Wait(slot);
        };
        chunks.insert(index, Arc::clone(&slot));
        Claim::Fetch(slot, guard)
    }

    fn claim(&self, index: u32) -> Claim {
        Self::claim_locked(&mut self.lock_chunks(), index)
    }

    /// Drop a slot left empty so the next call fetches again
    fn discard(&self, index: u32, slot: &ChunkSlot) {
        let mut chunks = self.lock_chunks();
        if chunks.get(&index).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            chunks.remove(&index);
        }
    }

    pub fn chunk_state(&self, index: u32) -> ChunkState {
        match self.lock_chunks().get(&index) {
            None => ChunkState::NotFetched,
            Some(slot) => match slot.try_read() {
                Ok(cached) if cached.is_some() => ChunkState::Cached,
                Ok(_) => ChunkState::NotFetched,
                Err(_) => ChunkState::Fetching,
            },
        }
    }

    async fn fetch_chunk(&self, index: u32) -> ProxyResult<Arc<Chunk>> {
        match self.store.get_chunk(self.file_id, index).await {
            Ok(Some(chunk)) => Ok(Arc::new(chunk)),
            Ok(None) => Err(ProxyError::Store(StoreError::Corrupt(format!(
                "chunk {} of file {} missing",
                index, self.file_id
            )))),
            Err(e) => Err(ProxyError::Store(e)),
        }
    }

    /// Chunks `first..=last` from the store, one read
    async fn fetch_run(&self, first: u32, last: u32) -> ProxyResult<Vec<Arc<Chunk>>> {
        if first == last {
            return Ok(vec![self.fetch_chunk(first).await?]);
        }
        let fetched = self.store.get_chunk_range(self.file_id, first, last).await?;
        let expected = (last - first) as usize + 1;
        if fetched.len() != expected {
            return Err(StoreError::Corrupt(format!(
                "file {}: expected {} chunks in {}..={}, got {}",
                self.file_id,
                expected,
                first,
                last,
                fetched.len()
            ))
            .into());
        }
        Ok(fetched.into_iter().map(Arc::new).collect())
    }

    /// Cached chunk, or one store read shared by concurrent callers
    pub async fn load_chunk(&self, index: u32) -> ProxyResult<Arc<Chunk>> {
        let total = self.load_metadata().await?.total_chunks;
        if index >= total {
            return Err(ProxyError::OutOfRange {
                index: index as usize,
                len: total as usize,
            });
        }

        loop {
            match self.claim(index) {
                Claim::Cached(chunk) => return Ok(chunk),
                Claim::Wait(slot) => {
                    let cached = slot.read().await.clone();
                    match cached {
                        Some(chunk) => return Ok(chunk),
                        None => self.discard(index, &slot),
                    }
                }
                Claim::Fetch(slot, mut guard) => {
                    return match self.fetch_chunk(index).await {
                        Ok(chunk) => {
                            *guard = Some(Arc::clone(&chunk));
                            Ok(chunk)
                        }
                        Err(e) => {
                            self.discard(index, &slot);
                            Err(e)
                        }
                    };
                }
            }
        }
    }

    /// Chunks `first..=last`. Cached ones are reused, chunks another task is
    /// fetching are awaited, and each contiguous run of the rest is read with
    /// one range read.
    async fn load_chunk_range(&self, first: u32, last: u32) -> ProxyResult<Vec<Arc<Chunk>>> {
        let claims: Vec<Claim> = {
            let mut chunks = self.lock_chunks();
            (first..=last).map(|i| Self::claim_locked(&mut chunks, i)).collect()
        };

        let mut out: Vec<Option<Arc<Chunk>>> = vec![None; claims.len()];
        let mut waits = Vec::new();
        let mut runs: Vec<Vec<(usize, ChunkSlot, FetchGuard)>> = Vec::new();
        for (pos, claim) in claims.into_iter().enumerate() {
            match claim {
                Claim::Cached(chunk) => out[pos] = Some(chunk),
                Claim::Wait(slot) => waits.push((pos, slot)),
                Claim::Fetch(slot, guard) => {
                    let entry = (pos, slot, guard);
                    match runs.last_mut().filter(|run| run.last().is_some_and(|(p, _, _)| p + 1 == pos)) {
                        Some(run) => run.push(entry),
                        None => runs.push(vec![entry]),
                    }
                }
            }
        }

        let mut runs = runs.into_iter();
        while let Some(run) = runs.next() {
            let lo = first + run[0].0 as u32;
            let hi = lo + (run.len() as u32 - 1);
            match self.fetch_run(lo, hi).await {
                Ok(fetched) => {
                    for ((pos, _, mut guard), chunk) in run.into_iter().zip(fetched) {
                        *guard = Some(Arc::clone(&chunk));
                        out[pos] = Some(chunk);
                    }
                }
                Err(e) => {
                    for (pos, slot, _) in run.iter().chain(runs.as_slice().iter().flatten()) {
                        self.discard(first + *pos as u32, slot);
                    }
                    return Err(e);
                }
            }
        }

        // own slots are filled and released before waiting on others
        for (pos, slot) in waits {
            let cached = slot.read().await.clone();
            out[pos] = Some(match cached {
                Some(chunk) => chunk,
                None => {
                    self.discard(first + pos as u32, &slot);
                    self.load_chunk(first + pos as u32).await?
                }
            });
        }

        out.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
            ProxyError::Store(StoreError::Corrupt(format!(
                "file {}: chunks {}..={} incomplete",
                self.file_id, first, last
            )))
        })
    }

    /// Remove the file from the store and reset the proxy to `Unloaded`
    pub async fn delete_file_data(&mut self) -> ProxyResult<()> {
        self.store.delete_file(self.file_id).await?;
        self.metadata = OnceCell::new();
        self.lock_chunks().clear();
        tracing::info!("Deleted file {}", self.file_id);
        Ok(())
    }

    /// Virtual collection over every feature group of the file
    pub fn features(&self) -> FeatureView<'_, S> {
        FeatureView { proxy: self }
    }
}

/// Indexed access to the groups of a file as one sequence
pub struct FeatureView<'p, S: FeatureStore> {
    proxy: &'p FileProxy<S>,
}

impl<'p, S: FeatureStore> FeatureView<'p, S> {
    /// Total groups. Requires loaded metadata.
    pub fn len(&self) -> Result<usize, NotLoaded> {
        self.proxy.loaded("features.len").map(|s| s.total_features as usize)
    }

    pub fn is_empty(&self) -> Result<bool, NotLoaded> {
        self.len().map(|n| n == 0)
    }

    async fn layout(&self) -> ProxyResult<(usize, usize)> {
        let state = self.proxy.load_metadata().await?;
        Ok((state.total_features as usize, state.chunk_size.max(1)))
    }

    /// Group at position `i`
    pub async fn at(&self, i: usize) -> ProxyResult<FeatureGroup> {
        let (len, chunk_size) = self.layout().await?;
        if i >= len {
            return Err(ProxyError::OutOfRange { index: i, len });
        }
        let chunk = self.proxy.load_chunk((i / chunk_size) as u32).await?;
        chunk
            .get(i % chunk_size)
            .cloned()
            .ok_or(ProxyError::OutOfRange { index: i, len })
    }

    /// Groups in `start..end`; `end` is clamped to the length
    pub async fn slice(&self, start: usize, end: usize) -> ProxyResult<Vec<FeatureGroup>> {
        let (len, chunk_size) = self.layout().await?;
        let end = end.min(len);
        if start >= end {
            return Ok(Vec::new());
        }

        let first = start / chunk_size;
        let last = (end - 1) / chunk_size;
        let chunks = if first == last {
            vec![self.proxy.load_chunk(first as u32).await?]
        } else {
            self.proxy.load_chunk_range(first as u32, last as u32).await?
        };

        let skip = start - first * chunk_size;
        Ok(chunks
            .iter()
            .flat_map(|chunk| chunk.iter())
            .skip(skip)
            .take(end - start)
            .cloned()
            .collect())
    }

    /// Sequential walk over every group, chunk by chunk
    pub fn cursor(&self) -> FeatureCursor<'p, S> {
        FeatureCursor {
            proxy: self.proxy,
            next_chunk: 0,
            current: None,
            offset: 0,
        }
    }
}

/// Async iterator returned by [`FeatureView::cursor`]
pub struct FeatureCursor<'p, S: FeatureStore> {
    proxy: &'p FileProxy<S>,
    next_chunk: u32,
    current: Option<Arc<Chunk>>,
    offset: usize,
}

impl<S: FeatureStore> FeatureCursor<'_, S> {
    /// Next group, `None` after the last chunk
    pub async fn next(&mut self) -> ProxyResult<Option<FeatureGroup>> {
        loop {
            if let Some(chunk) = &self.current {
                if let Some(group) = chunk.get(self.offset) {
                    self.offset += 1;
                    return Ok(Some(group.clone()));
                }
            }

            let total = self.proxy.load_metadata().await?.total_chunks;
            if self.next_chunk >= total {
                self.current = None;
                return Ok(None);
            }
            self.current = Some(self.proxy.load_chunk(self.next_chunk).await?);
            self.next_chunk += 1;
            self.offset = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::ChunkAccumulator;
    use crate::config::IngestConfig;
    use crate::parse::{parse_lines, ParseCache};
    use crate::store::testing::SpyStore;
    use std::sync::atomic::Ordering;

    /// `n` BED intervals, stored `chunk_size` groups per chunk
    async fn seeded(n: usize, chunk_size: usize) -> (Arc<SpyStore>, FileId) {
        let store = Arc::new(SpyStore::new());
        let file_id = FileId::from_filename("seed.bed");
        let config = IngestConfig::new().chunk_size(chunk_size);

        let mut state = FileState::new(Format::Bed);
        let mut cache = ParseCache::new();
        let lines = (0..n).map(|i| format!("chr1\t{}\t{}", i, i + 1));
        parse_lines(Format::Bed, lines, &mut state, &mut cache);

        let mut acc = ChunkAccumulator::new(store.as_ref(), file_id, &config);
        acc.finish(&mut cache).await.unwrap();
        state.total_chunks = acc.chunks_written();
        state.total_features = acc.groups_written();
        state.chunk_size = chunk_size;
        store.put_metadata(file_id, &state).await.unwrap();
        (store, file_id)
    }

    fn start_of(group: &FeatureGroup) -> u64 {
        group.features[0].start
    }

    #[tokio::test]
    async fn test_accessors_before_load() {
        let (store, file_id) = seeded(3, 2).await;
        let proxy = FileProxy::new(store, file_id);

        assert_eq!(proxy.state(), LoadState::Unloaded);
        assert_eq!(proxy.types().unwrap_err(), NotLoaded("types"));
        assert!(proxy.minmax().is_err());
        assert!(proxy.features().len().is_err());

        proxy.load_metadata().await.unwrap();
        assert_eq!(proxy.state(), LoadState::Loaded);
        assert_eq!(proxy.features().len().unwrap(), 3);
        assert!(proxy.types().unwrap().contains_key("region"));
        assert_eq!(proxy.minmax().unwrap()["region"][&None], MinMax::new(1, 3));
    }

    #[tokio::test]
    async fn test_concurrent_load_metadata_reads_once() {
        let (store, file_id) = seeded(5, 2).await;
        let proxy = FileProxy::new(store.clone(), file_id);

        let (a, b, c) = tokio::join!(
            proxy.load_metadata(),
            proxy.load_metadata(),
            proxy.load_metadata()
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        proxy.load_metadata().await.unwrap();
        assert_eq!(store.metadata_reads(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_load_chunk_reads_once() {
        let (store, file_id) = seeded(5, 2).await;
        let proxy = FileProxy::new(store.clone(), file_id);
        proxy.load_metadata().await.unwrap();

        let (a, b) = tokio::join!(proxy.load_chunk(1), proxy.load_chunk(1));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(store.chunk_reads(), 1);
        assert_eq!(proxy.chunk_state(1), ChunkState::Cached);
        assert_eq!(proxy.chunk_state(0), ChunkState::NotFetched);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_not_ingested() {
        let store = Arc::new(SpyStore::new());
        let proxy = FileProxy::new(store, FileId(9));
        match proxy.load_metadata().await {
            Err(ProxyError::NotIngested(id)) => assert_eq!(id, FileId(9)),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert_eq!(proxy.state(), LoadState::Unloaded);
    }

    #[tokio::test]
    async fn test_at_and_slice_agree_across_chunk_sizes() {
        for chunk_size in [1, 3, 4, 10, 50] {
            let (store, file_id) = seeded(10, chunk_size).await;
            let proxy = FileProxy::new(store, file_id);
            let view = proxy.features();

            let mut by_index = Vec::new();
            for i in 0..10 {
                by_index.push(start_of(&view.at(i).await.unwrap()));
            }
            assert_eq!(by_index, (1..=10).collect::<Vec<u64>>(), "chunk_size {}", chunk_size);

            let sliced: Vec<u64> = view.slice(2, 9).await.unwrap().iter().map(start_of).collect();
            assert_eq!(sliced, (3..=9).collect::<Vec<u64>>(), "chunk_size {}", chunk_size);
        }
    }

    #[tokio::test]
    async fn test_slice_crossing_boundary_uses_one_range_read() {
        let (store, file_id) = seeded(10, 4).await;
        let proxy = FileProxy::new(store.clone(), file_id);
        let view = proxy.features();

        let groups = view.slice(3, 9).await.unwrap();
        assert_eq!(groups.len(), 6);
        assert_eq!(store.range_reads(), 1);
        assert_eq!(store.chunk_reads(), 0);
        assert_eq!(proxy.chunk_state(0), ChunkState::Cached);
        assert_eq!(proxy.chunk_state(2), ChunkState::Cached);

        // served from cache now
        view.slice(0, 10).await.unwrap();
        view.at(5).await.unwrap();
        assert_eq!(store.range_reads(), 1);
        assert_eq!(store.chunk_reads(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_at_and_slice_fetch_each_chunk_once() {
        let (store, file_id) = seeded(10, 4).await;
        let proxy = FileProxy::new(store.clone(), file_id);
        proxy.load_metadata().await.unwrap();
        let view = proxy.features();

        let (one, many) = tokio::join!(view.at(5), view.slice(3, 9));
        assert_eq!(start_of(&one.unwrap()), 6);
        let starts: Vec<u64> = many.unwrap().iter().map(start_of).collect();
        assert_eq!(starts, (4..=9).collect::<Vec<u64>>());

        assert_eq!(store.chunks_served(), 3);
        for index in 0..3 {
            assert_eq!(proxy.chunk_state(index), ChunkState::Cached);
        }
    }

    #[tokio::test]
    async fn test_concurrent_slices_fetch_each_chunk_once() {
        let (store, file_id) = seeded(12, 4).await;
        let proxy = FileProxy::new(store.clone(), file_id);
        proxy.load_metadata().await.unwrap();
        let view = proxy.features();

        let (a, b) = tokio::join!(view.slice(0, 12), view.slice(2, 10));
        assert_eq!(a.unwrap().len(), 12);
        assert_eq!(b.unwrap().len(), 8);
        assert_eq!(store.chunks_served(), 3);
    }

    #[tokio::test]
    async fn test_slice_reads_only_uncached_chunks() {
        let (store, file_id) = seeded(12, 4).await;
        let proxy = FileProxy::new(store.clone(), file_id);
        proxy.load_chunk(0).await.unwrap();
        assert_eq!(store.chunks_served(), 1);

        // chunks 1 and 2 in one range read
        let groups = proxy.features().slice(2, 12).await.unwrap();
        assert_eq!(groups.len(), 10);
        assert_eq!(store.range_reads(), 1);
        assert_eq!(store.chunks_served(), 3);

        // cached ends, uncached middle
        let (store, file_id) = seeded(12, 4).await;
        let proxy = FileProxy::new(store.clone(), file_id);
        proxy.load_chunk(1).await.unwrap();
        proxy.features().slice(0, 12).await.unwrap();
        assert_eq!(store.range_reads(), 0);
        assert_eq!(store.chunk_reads(), 3);
        assert_eq!(store.chunks_served(), 3);
    }

    #[tokio::test]
    async fn test_slice_bounds() {
        let (store, file_id) = seeded(5, 2).await;
        let proxy = FileProxy::new(store, file_id);
        let view = proxy.features();

        assert!(view.slice(3, 3).await.unwrap().is_empty());
        assert!(view.slice(4, 2).await.unwrap().is_empty());
        assert_eq!(view.slice(3, 100).await.unwrap().len(), 2);
        assert!(matches!(
            view.at(5).await,
            Err(ProxyError::OutOfRange { index: 5, len: 5 })
        ));
    }

    #[tokio::test]
    async fn test_cursor_walks_every_group_in_order() {
        let (store, file_id) = seeded(7, 3).await;
        let proxy = FileProxy::new(store, file_id);
        let mut cursor = proxy.features().cursor();

        let mut starts = Vec::new();
        while let Some(group) = cursor.next().await.unwrap() {
            starts.push(start_of(&group));
        }
        assert_eq!(starts, (1..=7).collect::<Vec<u64>>());
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_chunk_fetch_is_retried() {
        let (store, file_id) = seeded(4, 2).await;
        let proxy = FileProxy::new(store.clone(), file_id);
        proxy.load_metadata().await.unwrap();

        store.fail_next_chunk_read.store(true, Ordering::SeqCst);
        assert!(matches!(proxy.load_chunk(0).await, Err(ProxyError::Store(_))));
        assert_eq!(proxy.chunk_state(0), ChunkState::NotFetched);

        assert_eq!(proxy.load_chunk(0).await.unwrap().len(), 2);
        assert_eq!(store.chunk_reads(), 2);
    }

    #[tokio::test]
    async fn test_delete_file_data_resets() {
        let (store, file_id) = seeded(4, 2).await;
        let mut proxy = FileProxy::new(store.clone(), file_id);
        proxy.load_metadata().await.unwrap();
        proxy.load_chunk(0).await.unwrap();

        proxy.delete_file_data().await.unwrap();
        assert_eq!(proxy.state(), LoadState::Unloaded);
        assert_eq!(proxy.chunk_state(0), ChunkState::NotFetched);
        assert_eq!(store.inner.chunk_count(file_id), 0);
        assert!(matches!(proxy.load_metadata().await, Err(ProxyError::NotIngested(_))));

        // idempotent
        proxy.delete_file_data().await.unwrap();
    }
}
