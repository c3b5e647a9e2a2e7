//! Ingestion driver and database handle
//!
//! One run: sample the head of the stream, detect the format, then parse the
//! whole stream segment by segment. Full chunks are written as soon as they
//! exist, the metadata record is written last. A run that fails after
//! writing anything deletes what it wrote before returning the error.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex as AsyncMutex;

use crate::accumulator::ChunkAccumulator;
use crate::config::{normalize_db_path, IngestConfig};
use crate::detect::{detect, is_supported_filename, Format};
use crate::error::{IngestError, Result};
use crate::id::FileId;
use crate::model::FileState;
use crate::parse::{self, ParseCache};
use crate::proxy::FileProxy;
use crate::store::{FeatureStore, SledStore};
use crate::stream::LineSplitter;

/// Result of a completed ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub file_id: FileId,
    pub format: Format,
    pub total_chunks: u32,
    /// Feature groups stored
    pub total_features: u64,
    /// Data lines dropped as malformed
    pub skipped_lines: u64,
}

/// Store plus ingestion settings. Cheap to share: the store sits behind an `Arc`.
///
/// Runs targeting the same file id are serialized: each one replaces the
/// previous result as a whole. Runs on different ids proceed concurrently.
pub struct Database<S: FeatureStore = SledStore> {
    store: Arc<S>,
    config: IngestConfig,
    running: Mutex<HashMap<FileId, Arc<AsyncMutex<()>>>>,
}

impl Database<SledStore> {
    /// Open (or create) an on-disk database. The path gets a `.gfdb` extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = normalize_db_path(path);
        debug_log!("Database::open() - path: {:?}", path);
        let store = SledStore::open(&path)?;
        tracing::info!("Opened database at {:?}", path);
        Ok(Self::new(store))
    }

    /// Database removed on drop
    pub fn temporary() -> Result<Self> {
        Ok(Self::new(SledStore::temporary()?))
    }
}

impl<S: FeatureStore> Database<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            config: IngestConfig::default(),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Ingest a stream under the id derived from `filename`
    pub async fn ingest<R>(&self, reader: R, filename: &str) -> std::result::Result<IngestOutcome, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        self.ingest_as(FileId::from_filename(filename), reader, filename).await
    }

    /// Ingest a stream under a caller-chosen id. Prior data of that id is replaced.
    pub async fn ingest_as<R>(
        &self,
        file_id: FileId,
        reader: R,
        filename: &str,
    ) -> std::result::Result<IngestOutcome, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        if !is_supported_filename(filename) {
            return Err(IngestError::UnsupportedFormat(filename.to_string()));
        }

        let slot = self.run_slot(file_id);
        let result = {
            let _running = slot.lock().await;
            self.replace(file_id, reader, filename).await
        };
        self.release_slot(file_id, slot);
        result
    }

    fn run_slot(&self, file_id: FileId) -> Arc<AsyncMutex<()>> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(running.entry(file_id).or_default())
    }

    fn release_slot(&self, file_id: FileId, slot: Arc<AsyncMutex<()>>) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        // nobody else holds or waits on it
        if running.get(&file_id).is_some_and(|s| Arc::ptr_eq(s, &slot)) && Arc::strong_count(&slot) == 2 {
            running.remove(&file_id);
        }
    }

    async fn replace<R>(&self, file_id: FileId, reader: R, filename: &str) -> std::result::Result<IngestOutcome, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        tracing::info!("Ingesting {} as file {}", filename, file_id);
        self.store.delete_file(file_id).await?;

        match self.run(file_id, reader, filename).await {
            Ok(outcome) => {
                tracing::info!(
                    "Ingested {} ({}): {} groups in {} chunks, {} lines skipped",
                    filename,
                    outcome.format,
                    outcome.total_features,
                    outcome.total_chunks,
                    outcome.skipped_lines
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete_file(file_id).await {
                    tracing::warn!("Cleanup of file {} after failed ingestion failed: {}", file_id, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Ingest a file from disk, named after its last path component
    pub async fn ingest_path<P: AsRef<Path>>(&self, path: P) -> std::result::Result<IngestOutcome, IngestError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| IngestError::UnsupportedFormat(path.display().to_string()))?;
        let file = tokio::fs::File::open(path).await?;
        self.ingest(file, filename).await
    }

    async fn run<R>(&self, file_id: FileId, mut reader: R, filename: &str) -> std::result::Result<IngestOutcome, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];
        let mut splitter = LineSplitter::new();

        // head of the stream, kept whole: it is parsed once the format is known
        let mut head: Vec<String> = Vec::new();
        let mut non_empty = 0usize;
        let mut eof = false;
        while non_empty < self.config.sample_lines {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                head.extend(splitter.finish());
                eof = true;
                break;
            }
            for line in splitter.push(&buf[..n]) {
                if !line.trim().is_empty() {
                    non_empty += 1;
                }
                head.push(line);
            }
        }

        let sample = head
            .iter()
            .map(String::as_str)
            .filter(|l| !l.trim().is_empty())
            .take(self.config.sample_lines);
        let format = detect(sample, filename);
        debug_log!("ingest({}): {} head lines, format {}", filename, head.len(), format);

        let mut state = FileState::new(format);
        let mut cache = ParseCache::new();
        let mut acc = ChunkAccumulator::new(self.store.as_ref(), file_id, &self.config);

        parse::parse_lines(format, &head, &mut state, &mut cache);
        acc.drain_full(&mut cache).await?;
        drop(head);

        while !eof {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let lines = splitter.push(&buf[..n]);
            parse::parse_lines(format, &lines, &mut state, &mut cache);
            acc.drain_full(&mut cache).await?;
        }
        if let Some(last) = splitter.finish() {
            parse::parse_lines(format, [last], &mut state, &mut cache);
        }
        parse::finish(format, &mut state, &mut cache);
        acc.finish(&mut cache).await?;

        if acc.groups_written() == 0 {
            return Err(IngestError::ParseFailure(format!(
                "no features in {} ({} lines read as {})",
                filename, cache.line_number, format
            )));
        }

        state.total_chunks = acc.chunks_written();
        state.total_features = acc.groups_written();
        state.chunk_size = acc.chunk_size();
        self.store.put_metadata(file_id, &state).await?;
        self.store.flush().await?;

        Ok(IngestOutcome {
            file_id,
            format,
            total_chunks: state.total_chunks,
            total_features: state.total_features,
            skipped_lines: cache.skipped_lines(),
        })
    }

    /// Lazy reader over one file. Nothing is fetched until asked.
    pub fn open_file(&self, file_id: FileId) -> FileProxy<S> {
        FileProxy::new(Arc::clone(&self.store), file_id)
    }

    /// Files whose ingestion completed
    pub async fn list_files(&self) -> Result<Vec<FileId>> {
        self.store.list_files().await
    }

    pub async fn delete_file(&self, file_id: FileId) -> Result<()> {
        self.store.delete_file(file_id).await?;
        tracing::info!("Deleted file {}", file_id);
        Ok(())
    }
}
