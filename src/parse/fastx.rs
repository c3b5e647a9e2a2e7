//! FASTA and FASTQ: multi-line records. A record is pushed when the next
//! header arrives or when the input ends ([`flush_fasta`] / [`flush_fastq`]).

use crate::model::{Feature, FileState};

use super::{split_key_value, Line, ParseCache};

const SEQUENCE: &str = "sequence";
const READ: &str = "read";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Sequence,
    Quality,
}

/// Record under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingRecord {
    id: String,
    description: Option<String>,
    sequence: String,
    quality: String,
    stage: Stage,
}

impl PendingRecord {
    /// `>id description` / `@id description` without the marker
    fn open(header: &str) -> Self {
        let (id, description) = split_key_value(header);
        Self {
            id: id.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            sequence: String::new(),
            quality: String::new(),
            stage: Stage::Sequence,
        }
    }

    fn quality_complete(&self) -> bool {
        self.stage == Stage::Quality && self.quality.len() >= self.sequence.len()
    }

    fn into_feature(self, feature_type: &str) -> Feature {
        let len = self.sequence.len() as u64;
        let mut feature = Feature::new(Some(self.id), feature_type, 1, len);
        if let Some(description) = self.description {
            feature.attributes.insert("description", description);
        }
        feature.attributes.insert("sequence", self.sequence);
        if feature_type == READ {
            feature.attributes.insert("quality", self.quality);
        }
        feature
    }
}

pub(super) fn parse_fasta_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    if let Some(header) = line.strip_prefix('>') {
        flush_fasta(state, cache);
        cache.pending = Some(PendingRecord::open(header));
        return Line::Data;
    }
    if line.starts_with(';') {
        return Line::Meta;
    }

    match cache.pending {
        Some(ref mut record) => {
            record.sequence.push_str(line.trim());
            Line::Data
        }
        None => Line::Skipped,
    }
}

pub(crate) fn flush_fasta(state: &mut FileState, cache: &mut ParseCache) {
    if let Some(record) = cache.pending.take() {
        cache.emit(state, record.into_feature(SEQUENCE), None);
    }
}

pub(super) fn parse_fastq_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    let line = line.trim();

    // Quality strings may start with '@': while quality is short, every line belongs to it
    if let Some(ref mut record) = cache.pending {
        if record.stage == Stage::Quality && !record.quality_complete() {
            record.quality.push_str(line);
            return Line::Data;
        }
    }

    if let Some(header) = line.strip_prefix('@') {
        flush_fastq(state, cache);
        cache.pending = Some(PendingRecord::open(header));
        return Line::Data;
    }

    match cache.pending {
        Some(ref mut record) if record.stage == Stage::Sequence => {
            if line.starts_with('+') {
                record.stage = Stage::Quality;
            } else {
                record.sequence.push_str(line);
            }
            Line::Data
        }
        _ => Line::Skipped,
    }
}

/// Records whose quality does not match the sequence length are dropped
pub(crate) fn flush_fastq(state: &mut FileState, cache: &mut ParseCache) {
    let Some(record) = cache.pending.take() else {
        return;
    };
    if record.stage == Stage::Quality && record.quality.len() == record.sequence.len() {
        cache.emit(state, record.into_feature(READ), None);
    } else {
        cache.skipped_lines += 1;
    }
}
