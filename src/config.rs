//! Ingestion settings

use std::env;
use std::path::{Path, PathBuf};

/// Groups per stored chunk. Readers use the value recorded at write time.
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Chunks written between two yields to the executor
pub const DEFAULT_YIELD_EVERY: usize = 10;

/// Bytes requested from the input per read
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub yield_every: usize,
    /// Non-empty lines handed to format detection
    pub sample_lines: usize,
    pub read_buffer_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            yield_every: DEFAULT_YIELD_EVERY,
            sample_lines: crate::detect::SAMPLE_LINES,
            read_buffer_size: DEFAULT_READ_BUFFER,
        }
    }
}

impl IngestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `GFDB_CHUNK_SIZE`, `GFDB_YIELD_EVERY`, `GFDB_READ_BUFFER`.
    /// Unparsable or zero values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_usize("GFDB_CHUNK_SIZE") {
            config.chunk_size = v;
        }
        if let Some(v) = env_usize("GFDB_YIELD_EVERY") {
            config.yield_every = v;
        }
        if let Some(v) = env_usize("GFDB_READ_BUFFER") {
            config.read_buffer_size = v;
        }
        config
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n.max(1);
        self
    }

    pub fn yield_every(mut self, n: usize) -> Self {
        self.yield_every = n.max(1);
        self
    }

    pub fn read_buffer_size(mut self, n: usize) -> Self {
        self.read_buffer_size = n.max(1);
        self
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok()?.trim().parse().ok().filter(|v| *v > 0)
}

/// Normalize database path ensuring .gfdb extension
///
/// Examples:
/// - `/path/to/db` -> `/path/to/db.gfdb`
/// - `/path/to/db.db` -> `/path/to/db.gfdb`
/// - `/path/to/db.gfdb` -> `/path/to/db.gfdb` (unchanged)
pub fn normalize_db_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();

    if path.extension().and_then(|s| s.to_str()) == Some("gfdb") {
        return path.to_path_buf();
    }

    if path.extension().is_some() {
        return path.with_extension("gfdb");
    }

    let mut new_path = path.to_path_buf();
    let new_filename = format!(
        "{}.gfdb",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("db")
    );
    new_path.set_file_name(new_filename);
    new_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.chunk_size, 50_000);
        assert_eq!(config.yield_every, 10);
        assert_eq!(config.sample_lines, 50);
    }

    #[test]
    fn test_builder_rejects_zero() {
        let config = IngestConfig::new().chunk_size(0).yield_every(0);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.yield_every, 1);
    }

    #[test]
    fn test_normalize_db_path() {
        assert_eq!(normalize_db_path("/tmp/db"), PathBuf::from("/tmp/db.gfdb"));
        assert_eq!(normalize_db_path("/tmp/db.db"), PathBuf::from("/tmp/db.gfdb"));
        assert_eq!(normalize_db_path("/tmp/db.gfdb"), PathBuf::from("/tmp/db.gfdb"));
    }
}
