//! BED family: BED, BEDGRAPH and WIG.
//!
//! BED and BEDGRAPH use 0-based half-open ranges and are shifted to 1-based
//! inclusive here. WIG coordinates are already 1-based.

use crate::model::{AttrValue, Feature, FileState, Strand};

use super::{nullable, numeric_field, split_key_value, Line, ParseCache};

const REGION: &str = "region";
const SIGNAL: &str = "signal";

/// Tab-separated when tabs are present, whitespace-separated otherwise
fn columns(line: &str) -> Vec<&str> {
    if line.contains('\t') {
        line.split('\t').collect()
    } else {
        line.split_whitespace().collect()
    }
}

/// UCSC `track`/`browser` lines and `#` comments. Track and browser lines are kept as directives.
fn fold_header(line: &str, state: &mut FileState) -> bool {
    if line.starts_with("track") || line.starts_with("browser") {
        let (key, value) = split_key_value(line);
        state.directives.push(key, value);
        return true;
    }
    line.starts_with('#')
}

pub(super) fn parse_bed_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    if fold_header(line, state) {
        return Line::Meta;
    }
    let Some((feature, colored)) = bed_record(&columns(line)) else {
        return Line::Skipped;
    };
    if colored {
        state.mark_colored(REGION, feature.strand);
    }
    cache.emit(state, feature, None);
    Line::Data
}

/// Column count decides which optional fields are attempted
fn bed_record(cols: &[&str]) -> Option<(Feature, bool)> {
    let n = cols.len();
    if n < 3 {
        return None;
    }

    let raw_start: u64 = cols[1].trim().parse().ok()?;
    let end: u64 = cols[2].trim().parse().ok()?;
    if end < raw_start {
        return None;
    }

    let mut feature = Feature::new(nullable(cols[0]).map(str::to_string), REGION, raw_start.checked_add(1)?, end);
    let mut colored = false;

    if n >= 4 {
        if let Some(name) = nullable(cols[3]) {
            feature.attributes.insert("name", name);
        }
    }
    if n >= 5 {
        feature.score = numeric_field(cols[4])?;
    }
    if n >= 6 {
        feature.strand = Strand::parse(cols[5].trim());
    }
    if n >= 7 {
        let thick_start: u64 = cols[6].trim().parse().ok()?;
        feature.attributes.insert("thickStart", thick_start.checked_add(1)? as f64);
    }
    if n >= 8 {
        let thick_end: u64 = cols[7].trim().parse().ok()?;
        feature.attributes.insert("thickEnd", thick_end as f64);
    }
    if n >= 9 {
        if let Some(rgb) = nullable(cols[8]).filter(|rgb| *rgb != "0") {
            feature.attributes.insert("itemRgb", rgb);
            colored = true;
        }
    }
    if n >= 10 {
        let block_count: u32 = cols[9].trim().parse().ok()?;
        feature.attributes.insert("blockCount", block_count as f64);
    }
    if n >= 11 {
        feature.attributes.insert("blockSizes", cols[10].trim());
    }
    if n >= 12 {
        feature.attributes.insert("blockStarts", cols[11].trim());
    }

    Some((feature, colored))
}

pub(super) fn parse_bedgraph_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    if fold_header(line, state) {
        return Line::Meta;
    }
    let Some(feature) = bedgraph_record(&columns(line)) else {
        return Line::Skipped;
    };
    cache.emit(state, feature, None);
    Line::Data
}

fn bedgraph_record(cols: &[&str]) -> Option<Feature> {
    if cols.len() < 4 {
        return None;
    }
    let raw_start: u64 = cols[1].trim().parse().ok()?;
    let end: u64 = cols[2].trim().parse().ok()?;
    let value: f64 = cols[3].trim().parse().ok()?;
    if end < raw_start {
        return None;
    }

    let mut feature = Feature::new(nullable(cols[0]).map(str::to_string), SIGNAL, raw_start.checked_add(1)?, end);
    feature.attributes.insert("value", value);
    Some(feature)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Fixed,
    Variable,
}

/// Current WIG section, reset by every step declaration line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WigStep {
    chrom: String,
    kind: StepKind,
    /// Next position for fixedStep
    cursor: u64,
    step: u64,
    span: u64,
}

impl WigStep {
    /// `fixedStep chrom=chr1 start=100 step=10 span=5` / `variableStep chrom=chr1 span=25`
    fn declare(line: &str) -> Option<WigStep> {
        let mut words = line.split_whitespace();
        let kind = match words.next()? {
            "fixedStep" => StepKind::Fixed,
            "variableStep" => StepKind::Variable,
            _ => return None,
        };

        let mut chrom = None;
        let mut start = None;
        let mut step = 1;
        let mut span = 1;
        for word in words {
            let Some((key, value)) = word.split_once('=') else {
                continue;
            };
            match key {
                "chrom" => chrom = Some(value.to_string()),
                "start" => start = Some(value.parse::<u64>().ok()?),
                "step" => step = value.parse::<u64>().ok()?,
                "span" => span = value.parse::<u64>().ok()?.max(1),
                _ => {}
            }
        }

        if kind == StepKind::Fixed && start.is_none() {
            return None;
        }
        Some(WigStep {
            chrom: chrom?,
            kind,
            cursor: start.unwrap_or(1),
            step,
            span,
        })
    }

    fn signal(&self, start: u64, value: f64) -> Option<Feature> {
        let end = start.checked_add(self.span - 1)?;
        let mut feature = Feature::new(Some(self.chrom.clone()), SIGNAL, start, end);
        feature.attributes.insert("value", value);
        Some(feature)
    }
}

pub(super) fn parse_wig_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    if fold_header(line, state) {
        return Line::Meta;
    }
    if line.starts_with("fixedStep") || line.starts_with("variableStep") {
        // An invalid declaration drops the section: its data lines are skipped
        cache.wig = WigStep::declare(line);
        return Line::Meta;
    }

    let Some(ref mut wig) = cache.wig else {
        return Line::Skipped;
    };

    let signal = match wig.kind {
        StepKind::Fixed => {
            let Ok(value) = line.trim().parse::<f64>() else {
                return Line::Skipped;
            };
            let feature = wig.signal(wig.cursor, value);
            wig.cursor = wig.cursor.saturating_add(wig.step);
            feature
        }
        StepKind::Variable => {
            let mut words = line.split_whitespace();
            let position = words.next().and_then(|p| p.parse::<u64>().ok());
            let value = words.next().and_then(|v| v.parse::<f64>().ok());
            match (position, value) {
                (Some(position), Some(value)) => wig.signal(position, value),
                _ => return Line::Skipped,
            }
        }
    };
    let Some(feature) = signal else {
        return Line::Skipped;
    };

    cache.emit(state, feature, None);
    Line::Data
}

/// Value stored by BEDGRAPH and WIG features
pub fn signal_value(feature: &Feature) -> Option<f64> {
    feature.attributes.get("value").and_then(AttrValue::as_number)
}
