//! Метаданные файла в хранилище
//!
//! Set-typed registry fields and strand-keyed maps become plain sequences of
//! pairs, so the value encoding needs no set or non-string-key support.

use serde::{Deserialize, Serialize};

use crate::detect::Format;
use crate::model::{Directives, FileState, MinMax, StrandKey};

/// Stored form of [`FileState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub types: Vec<(String, Vec<StrandKey>)>,
    /// Directives as (key, values) entries
    pub metadata: Vec<(String, Vec<String>)>,
    pub minmax: Vec<(String, Vec<(StrandKey, MinMax)>)>,
    pub colors: Vec<(String, StrandKey)>,
    pub format: Option<Format>,
    pub total_chunks: u32,
    pub total_features: u64,
    pub chunk_size: usize,
}

impl From<&FileState> for MetadataRecord {
    fn from(state: &FileState) -> Self {
        Self {
            types: state
                .types
                .iter()
                .map(|(t, strands)| (t.clone(), strands.iter().copied().collect()))
                .collect(),
            metadata: state.directives.clone().into_entries(),
            minmax: state
                .minmax
                .iter()
                .map(|(t, per_strand)| {
                    (t.clone(), per_strand.iter().map(|(s, mm)| (*s, *mm)).collect())
                })
                .collect(),
            colors: state.colors.iter().cloned().collect(),
            format: state.format,
            total_chunks: state.total_chunks,
            total_features: state.total_features,
            chunk_size: state.chunk_size,
        }
    }
}

impl From<MetadataRecord> for FileState {
    fn from(record: MetadataRecord) -> Self {
        Self {
            types: record
                .types
                .into_iter()
                .map(|(t, strands)| (t, strands.into_iter().collect()))
                .collect(),
            minmax: record
                .minmax
                .into_iter()
                .map(|(t, per_strand)| (t, per_strand.into_iter().collect()))
                .collect(),
            colors: record.colors.into_iter().collect(),
            directives: Directives::from_entries(record.metadata),
            format: record.format,
            total_chunks: record.total_chunks,
            total_features: record.total_features,
            chunk_size: record.chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Feature, Strand};

    #[test]
    fn test_record_restores_sets_and_maps() {
        let mut state = FileState::new(Format::Bed);
        let mut f = Feature::new(Some("chr1".into()), "region", 10, 20);
        f.strand = Some(Strand::Forward);
        state.observe(&f);
        f.strand = None;
        state.observe(&f);
        state.mark_colored("region", Some(Strand::Forward));
        state.directives.push("track", "name=x");
        state.total_chunks = 1;
        state.total_features = 2;
        state.chunk_size = 50_000;

        let json = serde_json::to_vec(&MetadataRecord::from(&state)).unwrap();
        let record: MetadataRecord = serde_json::from_slice(&json).unwrap();
        let restored = FileState::from(record);
        assert_eq!(restored, state);
        assert_eq!(restored.types["region"].len(), 2);
    }

    #[test]
    fn test_record_json_shape() {
        let state = FileState::new(Format::Vcf);
        let value = serde_json::to_value(MetadataRecord::from(&state)).unwrap();
        assert_eq!(value["format"], "VCF");
        assert!(value["types"].is_array());
        assert!(value.get("totalChunks").is_some());
    }
}
