//! Per-format streaming parsers
//!
//! Every parser folds a batch of lines into the [`FileState`] and the per-file
//! [`ParseCache`]. Calls are incremental: the same cache is passed for every batch
//! of one file, so open groups, WIG cursors and unfinished FASTA/FASTQ records
//! survive batch boundaries.
//!
//! Parsers never fail on a single line. Malformed data lines are counted and skipped.

mod bed;
mod fastx;
mod gff;
mod sam;
mod vcf;

use std::collections::HashMap;

use crate::detect::Format;
use crate::model::{Feature, FeatureGroup, FileState};

pub use bed::signal_value;
pub use gff::{parse_gff3_attributes, parse_gtf_attributes, percent_decode};

pub(crate) use bed::WigStep;
pub(crate) use fastx::PendingRecord;

/// What a single line turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Line {
    Data,
    Meta,
    Skipped,
}

/// Parser state that must persist across line batches of one file
#[derive(Debug, Default)]
pub struct ParseCache {
    /// Lines seen so far (blank lines included)
    pub line_number: u64,
    /// Groups parsed but not yet handed to the store
    pub features: Vec<FeatureGroup>,
    /// Group key -> index into `features`, for groups still buffered
    groups: HashMap<String, usize>,
    data_lines: u64,
    meta_lines: u64,
    skipped_lines: u64,
    /// Total features (not groups) emitted
    emitted: u64,
    pub(crate) wig: Option<WigStep>,
    pub(crate) pending: Option<PendingRecord>,
    pub(crate) vcf_samples: Vec<String>,
    /// GFF3 `##FASTA` section reached: the rest of the file is sequence
    pub(crate) gff_in_fasta: bool,
}

impl ParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature in the state and buffer it.
    ///
    /// With a `key`, the feature joins the buffered group of the same key, or opens one.
    pub(crate) fn emit(&mut self, state: &mut FileState, feature: Feature, key: Option<&str>) {
        state.observe(&feature);
        self.emitted += 1;

        if let Some(key) = key {
            if let Some(&idx) = self.groups.get(key) {
                self.features[idx].push(feature);
                return;
            }
            self.groups.insert(key.to_string(), self.features.len());
        }
        self.features.push(FeatureGroup::single(feature));
    }

    /// Forget open group keys; later features with the same key start new groups
    pub(crate) fn close_groups(&mut self) {
        self.groups.clear();
    }

    /// Remove up to `n` leading groups from the buffer
    ///
    /// Open group indices are rebased; groups that left the buffer are closed
    /// since stored chunks are never rewritten.
    pub fn take_chunk(&mut self, n: usize) -> Vec<FeatureGroup> {
        let n = n.min(self.features.len());
        let chunk: Vec<FeatureGroup> = self.features.drain(..n).collect();
        self.groups.retain(|_, idx| {
            if *idx >= n {
                *idx -= n;
                true
            } else {
                false
            }
        });
        chunk
    }

    pub fn buffered(&self) -> usize {
        self.features.len()
    }

    pub fn data_lines(&self) -> u64 {
        self.data_lines
    }

    pub fn meta_lines(&self) -> u64 {
        self.meta_lines
    }

    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn count(&mut self, line: Line) {
        match line {
            Line::Data => self.data_lines += 1,
            Line::Meta => self.meta_lines += 1,
            Line::Skipped => self.skipped_lines += 1,
        }
    }
}

/// Fold a batch of raw lines into `state`
pub fn parse_lines<I>(format: Format, lines: I, state: &mut FileState, cache: &mut ParseCache)
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    for line in lines {
        let line = line.as_ref().trim_end_matches(['\r', '\n']);
        cache.line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match format {
            Format::Gff3 => gff::parse_gff3_line(line, state, cache),
            Format::Gff2 => gff::parse_gff2_line(line, state, cache),
            Format::Gtf => gff::parse_gtf_line(line, state, cache),
            Format::Bed => bed::parse_bed_line(line, state, cache),
            Format::BedGraph => bed::parse_bedgraph_line(line, state, cache),
            Format::Wig => bed::parse_wig_line(line, state, cache),
            Format::Sam => sam::parse_sam_line(line, state, cache),
            Format::Vcf => vcf::parse_vcf_line(line, state, cache),
            Format::Fasta => fastx::parse_fasta_line(line, state, cache),
            Format::Fastq => fastx::parse_fastq_line(line, state, cache),
        };
        cache.count(outcome);
    }
}

/// End of input: finalize records that are only complete once the next header
/// (or nothing) follows
pub fn finish(format: Format, state: &mut FileState, cache: &mut ParseCache) {
    match format {
        Format::Fasta => fastx::flush_fasta(state, cache),
        Format::Fastq => fastx::flush_fastq(state, cache),
        Format::Gff3
        | Format::Gff2
        | Format::Gtf
        | Format::Bed
        | Format::BedGraph
        | Format::Wig
        | Format::Sam
        | Format::Vcf => {}
    }
}

/// The "no value" sentinel of text formats: `.` (and empty) mean absent
pub fn nullable(field: &str) -> Option<&str> {
    match field.trim() {
        "" | "." => None,
        value => Some(value),
    }
}

/// Optional numeric column: `Some(None)` for the sentinel, `None` when malformed
pub(crate) fn numeric_field(field: &str) -> Option<Option<f64>> {
    match nullable(field) {
        None => Some(None),
        Some(value) => value.parse::<f64>().ok().map(Some),
    }
}

/// Split `key value` on the first run of whitespace
pub(crate) fn split_key_value(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim()),
        None => (s, ""),
    }
}
