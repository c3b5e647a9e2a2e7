//! SAM alignments. The end coordinate is approximated from the read length;
//! the CIGAR string is kept as an attribute but not used for the end.

use crate::model::{AttrValue, Feature, FileState, Strand};

use super::{Line, ParseCache};

const ALIGNMENT: &str = "alignment";

/// FLAG bit: read maps to the reverse strand
const FLAG_REVERSE: u16 = 0x10;

/// MAPQ value meaning "not available"
const MAPQ_MISSING: u8 = 255;

pub(super) fn parse_sam_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    if let Some(rest) = line.strip_prefix('@') {
        let (record_type, value) = rest.split_once('\t').unwrap_or((rest, ""));
        state.directives.push(format!("@{}", record_type), value);
        return Line::Meta;
    }

    let Some(feature) = sam_record(line) else {
        return Line::Skipped;
    };
    cache.emit(state, feature, None);
    Line::Data
}

fn sam_record(line: &str) -> Option<Feature> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 11 {
        return None;
    }

    let flag: u16 = cols[1].parse().ok()?;
    let pos: u64 = cols[3].parse().ok()?;
    let mapq: u8 = cols[4].parse().ok()?;
    let sequence = cols[9];
    let seq_len = if sequence == "*" { 0 } else { sequence.len() as u64 };

    let seqid = match cols[2] {
        "*" => None,
        rname => Some(rname.to_string()),
    };
    let end = if seq_len == 0 { pos } else { pos + seq_len - 1 };

    let mut feature = Feature::new(seqid, ALIGNMENT, pos, end);
    feature.strand = Some(if flag & FLAG_REVERSE != 0 {
        Strand::Reverse
    } else {
        Strand::Forward
    });
    feature.score = (mapq != MAPQ_MISSING).then_some(mapq as f64);

    let attrs = &mut feature.attributes;
    attrs.insert("qname", cols[0]);
    attrs.insert("flag", flag as f64);
    attrs.insert("mapq", mapq as f64);
    attrs.insert("cigar", cols[5]);
    attrs.insert("rnext", cols[6]);
    attrs.insert("pnext", AttrValue::infer(cols[7]));
    attrs.insert("tlen", AttrValue::infer(cols[8]));
    attrs.insert("sequence", sequence);
    attrs.insert("quality", cols[10]);

    // TAG:TYPE:VALUE optional fields
    for tag in &cols[11..] {
        let mut parts = tag.splitn(3, ':');
        let (Some(name), Some(kind), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let value = match kind {
            "i" | "f" => AttrValue::infer(value),
            _ => AttrValue::Text(value.to_string()),
        };
        attrs.insert(name, value);
    }

    Some(feature)
}
