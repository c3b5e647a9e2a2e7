//! GFDB - chunked store for genomic feature files
//!
//! # Architecture
//!
//! - **Format detection**: extension table, header patterns, first data line shape
//! - **Streaming parsers**: GFF3/GFF2/GTF, BED/BEDGRAPH/WIG, SAM, VCF, FASTA/FASTQ
//! - **Chunks**: feature groups written in arrival order, 50k groups per chunk
//! - **Deterministic IDs**: BLAKE3(filename)
//! - **Lazy proxy**: metadata and chunks fetched on demand, concurrent fetches coalesced
//!
//! # Usage example
//!
//! ```no_run
//! use gfdb::Database;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open("./genome.gfdb")?;
//!
//! let file = tokio::fs::File::open("annotation.gff3").await?;
//! let outcome = db.ingest(file, "annotation.gff3").await?;
//! println!("{} groups as {}", outcome.total_features, outcome.format);
//!
//! // Чтение по требованию
//! let proxy = db.open_file(outcome.file_id);
//! proxy.load_metadata().await?;
//! let first_ten = proxy.features().slice(0, 10).await?;
//! println!("{:?}", proxy.types()?.keys().collect::<Vec<_>>());
//! # let _ = first_ten;
//! # Ok(())
//! # }
//! ```

// Debug logging macro - enabled via GFDB_DEBUG=1
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if std::env::var("GFDB_DEBUG").is_ok() {
            eprintln!("[GFDB DEBUG] {}", format!($($arg)*));
        }
    };
}

pub mod accumulator;
pub mod config;
pub mod detect;
pub mod error;
pub mod id;
pub mod ingest;
pub mod model;
pub mod parse;
pub mod proxy;
pub mod store;
pub mod stream;

pub use config::IngestConfig;
pub use detect::{detect, Format};
pub use error::{IngestError, NotLoaded, ProxyError, Result, StoreError};
pub use id::FileId;
pub use ingest::{Database, IngestOutcome};
pub use model::{AttrValue, Attributes, Feature, FeatureGroup, FileState, MinMax, Strand};
pub use proxy::{ChunkState, FeatureCursor, FeatureView, FileProxy, LoadState};
pub use store::{FeatureStore, MemoryStore, SledStore};
