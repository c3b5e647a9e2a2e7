//! Format detection from the filename and a sample of leading lines
//!
//! Priority order:
//! 1. Extension table (short-circuits content inspection)
//! 2. Header/meta lines matched against a per-format pattern table
//! 3. Shape of the first data line (column count + per-column patterns)
//! 4. GFF3 fallback

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Number of non-empty lines inspected by [`detect`]
pub const SAMPLE_LINES: usize = 50;

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Format {
    Gff3,
    Gff2,
    Gtf,
    Bed,
    BedGraph,
    Wig,
    Sam,
    Vcf,
    Fasta,
    Fastq,
}

impl Format {
    pub const ALL: [Format; 10] = [
        Format::Gff3,
        Format::Gff2,
        Format::Gtf,
        Format::Bed,
        Format::BedGraph,
        Format::Wig,
        Format::Sam,
        Format::Vcf,
        Format::Fasta,
        Format::Fastq,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Format::Gff3 => "GFF3",
            Format::Gff2 => "GFF2",
            Format::Gtf => "GTF",
            Format::Bed => "BED",
            Format::BedGraph => "BEDGRAPH",
            Format::Wig => "WIG",
            Format::Sam => "SAM",
            Format::Vcf => "VCF",
            Format::Fasta => "FASTA",
            Format::Fastq => "FASTQ",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every extension accepted for ingestion. `gff` is accepted but ambiguous.
pub const RECOGNIZED_EXTENSIONS: &[&str] = &[
    "gff", "gff2", "gff3", "gtf", "gft", "bed", "bedgraph", "bdg", "wig", "wiggle", "sam",
    "vcf", "fa", "fasta", "fas", "fq", "fastq",
];

/// Lower-cased extension of a filename, if any
pub fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// A filename without extension is accepted and detected from content.
pub fn is_supported_filename(filename: &str) -> bool {
    match extension(filename) {
        Some(ext) => RECOGNIZED_EXTENSIONS.contains(&ext.as_str()),
        None => true,
    }
}

/// Exact-match extension table
pub fn format_for_extension(ext: &str) -> Option<Format> {
    match ext {
        "gff3" => Some(Format::Gff3),
        "gff2" => Some(Format::Gff2),
        "gtf" | "gft" => Some(Format::Gtf),
        "bed" => Some(Format::Bed),
        "bedgraph" | "bdg" => Some(Format::BedGraph),
        "wig" | "wiggle" => Some(Format::Wig),
        "sam" => Some(Format::Sam),
        "vcf" => Some(Format::Vcf),
        "fa" | "fasta" | "fas" => Some(Format::Fasta),
        "fq" | "fastq" => Some(Format::Fastq),
        // "gff" could be any GFF flavour
        _ => None,
    }
}

static HEADER_PATTERNS: LazyLock<Vec<(Regex, Format)>> = LazyLock::new(|| {
    [
        (r"^##gff-version\s+3", Format::Gff3),
        (r"^##gff-version\s+2", Format::Gff2),
        (r"^#!genome-(build|version)", Format::Gtf),
        (r"^##gtf", Format::Gtf),
        (r"^@(HD|SQ|RG|PG|CO)(\t|$)", Format::Sam),
        (r"^##fileformat=VCF", Format::Vcf),
        (r"^track\s.*type=wiggle_0", Format::Wig),
        (r"^track\s.*type=bedGraph", Format::BedGraph),
    ]
    .into_iter()
    .filter_map(|(pattern, format)| Regex::new(pattern).ok().map(|re| (re, format)))
    .collect()
});

static SAM_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^@(HD|SQ|RG|PG|CO)(\t|$)").ok());
static READ_ID: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^@\S+").ok());
static INT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\d+$").ok());
static FLOAT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").ok());

fn matches(re: &LazyLock<Option<Regex>>, s: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(s))
}

/// Lines that may carry a header pattern
fn has_header_marker(line: &str) -> bool {
    line.starts_with('#')
        || line.starts_with('@')
        || line.starts_with("track ")
        || line.starts_with("browser ")
}

/// Lines that are not data. `@` lines are headers only when they look like SAM headers.
fn is_header_line(line: &str) -> bool {
    if line.starts_with('@') {
        return matches(&SAM_HEADER, line);
    }
    has_header_marker(line)
}

fn match_header(line: &str) -> Option<Format> {
    HEADER_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(line))
        .map(|(_, format)| *format)
}

/// Classify one data line by its shape
pub fn classify_data_line(line: &str) -> Option<Format> {
    if line.starts_with('>') {
        return Some(Format::Fasta);
    }
    if line.starts_with("fixedStep") || line.starts_with("variableStep") {
        return Some(Format::Wig);
    }
    if line.starts_with('@') && !line.contains('\t') && matches(&READ_ID, line) {
        return Some(Format::Fastq);
    }

    let cols: Vec<&str> = line.split('\t').collect();
    let n = cols.len();
    let int = |i: usize| matches(&INT, cols[i]);

    if n == 9 && int(3) && int(4) && matches!(cols[6], "+" | "-" | ".") {
        if cols[8].contains("gene_id") || cols[8].contains("transcript_id") {
            return Some(Format::Gtf);
        }
        return Some(Format::Gff3);
    }
    if n == 4 && int(1) && int(2) && matches(&FLOAT, cols[3]) {
        return Some(Format::BedGraph);
    }
    if n >= 11 && int(1) && int(3) && int(4) {
        return Some(Format::Sam);
    }
    if (3..=12).contains(&n) && int(1) && int(2) {
        let start: u64 = cols[1].parse().ok()?;
        let end: u64 = cols[2].parse().ok()?;
        if start < end {
            return Some(Format::Bed);
        }
    }
    None
}

/// Detect the format of a file. Never fails: falls back to GFF3.
///
/// Only the first [`SAMPLE_LINES`] non-empty lines of `sample` are looked at, and
/// only the first data line among them is classified.
///
/// # Examples
/// ```
/// use gfdb::detect::{detect, Format};
///
/// let sample = ["##gff-version 3", "chr1\t.\tgene\t1\t100\t.\t+\t.\tID=g1"];
/// assert_eq!(detect(sample, "anything.txt"), Format::Gff3);
/// assert_eq!(detect(["chr1\t1000\t1100\t15.5"], "signal"), Format::BedGraph);
/// ```
pub fn detect<'a>(sample: impl IntoIterator<Item = &'a str>, filename: &str) -> Format {
    if let Some(format) = extension(filename).and_then(|ext| format_for_extension(&ext)) {
        debug_log!("detect({}): extension -> {}", filename, format);
        return format;
    }

    let lines: Vec<&str> = sample
        .into_iter()
        .map(|l| l.trim_end_matches(['\r', '\n']))
        .filter(|l| !l.trim().is_empty())
        .take(SAMPLE_LINES)
        .collect();

    for line in lines.iter().filter(|l| has_header_marker(l)) {
        if let Some(format) = match_header(line) {
            debug_log!("detect({}): header {:?} -> {}", filename, line, format);
            return format;
        }
    }

    if let Some(line) = lines.iter().find(|l| !is_header_line(l)) {
        if let Some(format) = classify_data_line(line) {
            debug_log!("detect({}): data line -> {}", filename, format);
            return format;
        }
    }

    debug_log!("detect({}): fallback -> {}", filename, Format::Gff3);
    Format::Gff3
}
