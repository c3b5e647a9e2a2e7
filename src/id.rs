//! Deterministic file IDs via BLAKE3

use std::fmt;
use std::str::FromStr;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// Identifier of one ingested file: chunk keys and the metadata key derive from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u128);

impl FileId {
    /// Compute the ID of a file from its name
    ///
    /// # Examples
    /// ```
    /// use gfdb::FileId;
    ///
    /// let id = FileId::from_filename("genes.gff3");
    /// assert_eq!(id, FileId::from_filename("genes.gff3"));
    /// assert_ne!(id, FileId::from_filename("genes.gtf"));
    /// ```
    pub fn from_filename(filename: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"file|");
        hasher.update(filename.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[0..16]);
        FileId(u128::from_le_bytes(bytes))
    }

    /// Big-endian key bytes, so that sled orders keys of one file together
    pub fn to_key(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 16] = key.get(0..16)?.try_into().ok()?;
        Some(FileId(u128::from_be_bytes(bytes)))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for FileId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16).map(FileId)
    }
}
