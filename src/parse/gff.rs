//! GFF3, GFF2 and GTF: nine tab-separated columns, differing only in the
//! attribute column and in how features are grouped.

use crate::model::{AttrValue, Attributes, Feature, FileState, Strand};

use super::{nullable, numeric_field, split_key_value, Line, ParseCache};

/// Columns 1-8 shared by the GFF family. Returns the attribute column unparsed.
fn parse_columns(line: &str) -> Option<(Feature, &str)> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() != 9 {
        return None;
    }

    let start: u64 = cols[3].trim().parse().ok()?;
    let end: u64 = cols[4].trim().parse().ok()?;
    let score = numeric_field(cols[5])?;
    let strand = match cols[6].trim() {
        "?" => None,
        s => Some(Strand::parse(s)?),
    };
    let phase = match nullable(cols[7]) {
        None => None,
        Some(p) => Some(p.parse::<u8>().ok().filter(|p| *p <= 2)?),
    };

    let feature = Feature {
        seqid: nullable(cols[0]).map(str::to_string),
        source: nullable(cols[1]).map(str::to_string),
        feature_type: nullable(cols[2]).map(str::to_string),
        start,
        end,
        score,
        strand,
        phase,
        attributes: Attributes::new(),
    };
    Some((feature, cols[8]))
}

/// `##key value` and `#!key value` header lines
fn fold_directive(line: &str, state: &mut FileState) -> bool {
    let Some(rest) = line.strip_prefix("##").or_else(|| line.strip_prefix("#!")) else {
        return false;
    };
    let (key, value) = split_key_value(rest);
    if !key.is_empty() {
        state.directives.push(key, value);
    }
    true
}

pub(super) fn parse_gff3_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    if cache.gff_in_fasta {
        return Line::Meta;
    }
    if line == "###" {
        cache.close_groups();
        return Line::Meta;
    }
    if line.trim() == "##FASTA" || line.starts_with('>') {
        cache.gff_in_fasta = true;
        state.directives.push("FASTA", "");
        return Line::Meta;
    }
    if line.starts_with('#') {
        fold_directive(line, state);
        return Line::Meta;
    }

    let Some((mut feature, attrs)) = parse_columns(line) else {
        return Line::Skipped;
    };
    feature.attributes = parse_gff3_attributes(attrs);
    let key = feature.attributes.get_str("ID").map(str::to_string);
    cache.emit(state, feature, key.as_deref());
    Line::Data
}

pub(super) fn parse_gtf_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    if line.starts_with('#') {
        fold_directive(line, state);
        return Line::Meta;
    }

    let Some((mut feature, attrs)) = parse_columns(line) else {
        return Line::Skipped;
    };
    feature.attributes = parse_gtf_attributes(attrs);
    let key = feature
        .attributes
        .get_str("gene_id")
        .or_else(|| feature.attributes.get_str("transcript_id"))
        .map(str::to_string);
    cache.emit(state, feature, key.as_deref());
    Line::Data
}

pub(super) fn parse_gff2_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    if line.starts_with('#') {
        fold_directive(line, state);
        return Line::Meta;
    }

    let Some((mut feature, attrs)) = parse_columns(line) else {
        return Line::Skipped;
    };
    feature.attributes = parse_gtf_attributes(attrs);
    cache.emit(state, feature, None);
    Line::Data
}

/// `key=value;key2=a%3Bb` with percent-decoding. A key without `=` is a flag.
pub fn parse_gff3_attributes(column: &str) -> Attributes {
    let mut attrs = Attributes::new();
    if nullable(column).is_none() {
        return attrs;
    }

    for pair in column.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((key, value)) => {
                attrs.insert(percent_decode(key.trim()), percent_decode(value.trim()))
            }
            None => attrs.insert(percent_decode(pair), true),
        }
    }
    attrs
}

/// `key "value"; key2 3;` as used by GTF and GFF2.
///
/// Quoted values stay text, bare numbers become numbers, a lone key is a flag.
/// Repeated keys (GTF `tag`) are joined with `,`.
pub fn parse_gtf_attributes(column: &str) -> Attributes {
    let mut attrs = Attributes::new();
    if nullable(column).is_none() {
        return attrs;
    }

    for part in split_unquoted(column, ';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, raw) = split_key_value(part);
        let value = if raw.is_empty() {
            AttrValue::Flag(true)
        } else if let Some(unquoted) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            AttrValue::Text(unquoted.to_string())
        } else {
            AttrValue::infer(raw)
        };

        let joined = match (attrs.get(key), &value) {
            (Some(AttrValue::Text(prev)), AttrValue::Text(next)) => {
                Some(AttrValue::Text(format!("{},{}", prev, next)))
            }
            _ => None,
        };
        attrs.insert(key, joined.unwrap_or(value));
    }
    attrs
}

/// Split on `sep` outside of double quotes
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut last = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&s[last..i]);
            last = i + c.len_utf8();
        }
    }
    parts.push(&s[last..]);
    parts
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// Decode `%XX` escapes. Invalid escapes are kept literally.
pub fn percent_decode(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let (hi, lo) = (bytes[i + 1], bytes[i + 2]);
            if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() {
                out.push((hex_value(hi) << 4) | hex_value(lo));
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Format;
    use crate::parse::{finish, parse_lines};

    fn parse(format: Format, text: &str) -> (FileState, ParseCache) {
        let mut state = FileState::new(format);
        let mut cache = ParseCache::new();
        parse_lines(format, text.lines(), &mut state, &mut cache);
        finish(format, &mut state, &mut cache);
        (state, cache)
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("hello%3Bworld"), "hello;world");
        assert_eq!(percent_decode("key%3Dvalue"), "key=value");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
        assert_eq!(percent_decode("x%+1y"), "x%+1y");
        assert_eq!(percent_decode("%2c%2C"), ",,");
        assert_eq!(percent_decode("%2C"), ",");
    }

    #[test]
    fn test_gff3_attributes() {
        let attrs = parse_gff3_attributes("ID=gene1;Name=ABC%3B1;Note=a%2Cb;Is_circular");
        assert_eq!(attrs.get_str("ID"), Some("gene1"));
        assert_eq!(attrs.get_str("Name"), Some("ABC;1"));
        assert_eq!(attrs.get_str("Note"), Some("a,b"));
        assert_eq!(attrs.get("Is_circular"), Some(&AttrValue::Flag(true)));
        assert!(parse_gff3_attributes(".").is_empty());
    }

    #[test]
    fn test_gtf_attributes() {
        let attrs = parse_gtf_attributes(
            "gene_id \"ENSG1\"; transcript_id \"T1\"; exon_number 2; tag \"basic\"; tag \"CCDS\"; note \"a;b\";",
        );
        assert_eq!(attrs.get_str("gene_id"), Some("ENSG1"));
        assert_eq!(attrs.get("exon_number"), Some(&AttrValue::Number(2.0)));
        assert_eq!(attrs.get_str("tag"), Some("basic,CCDS"));
        assert_eq!(attrs.get_str("note"), Some("a;b"));
    }

    #[test]
    fn test_gff3_line_fields() {
        let (state, cache) = parse(
            Format::Gff3,
            "##gff-version 3\n##sequence-region chr1 1 5000\nchr1\tEnsembl\tCDS\t1200\t1800\t12.5\t-\t1\tID=cds1;Parent=mRNA1",
        );
        let f = &cache.features[0].features[0];
        assert_eq!(f.seqid.as_deref(), Some("chr1"));
        assert_eq!(f.source.as_deref(), Some("Ensembl"));
        assert_eq!(f.feature_type.as_deref(), Some("CDS"));
        assert_eq!((f.start, f.end), (1200, 1800));
        assert_eq!(f.score, Some(12.5));
        assert_eq!(f.strand, Some(Strand::Reverse));
        assert_eq!(f.phase, Some(1));
        assert_eq!(state.directives.get("gff-version"), &["3".to_string()]);
        assert_eq!(state.directives.get("sequence-region"), &["chr1 1 5000".to_string()]);
    }

    #[test]
    fn test_gff3_null_sentinels_do_not_leak() {
        let (_, cache) = parse(Format::Gff3, "chr1\t.\t.\t1\t10\t.\t.\t.\t.");
        let f = &cache.features[0].features[0];
        assert_eq!(f.source, None);
        assert_eq!(f.feature_type, None);
        assert_eq!(f.score, None);
        assert_eq!(f.strand, Some(Strand::Unstranded));
        assert_eq!(f.phase, None);
        assert!(f.attributes.is_empty());
    }

    #[test]
    fn test_gff3_groups_by_id_in_first_seen_order() {
        let text = "\
chr1\t.\tCDS\t100\t200\t.\t+\t0\tID=cds1;Parent=m1
chr1\t.\tgene\t50\t900\t.\t+\t.\tID=g1
chr1\t.\tCDS\t300\t400\t.\t+\t2\tID=cds1;Parent=m1";
        let (_, cache) = parse(Format::Gff3, text);
        assert_eq!(cache.features.len(), 2);
        assert_eq!(cache.features[0].len(), 2);
        assert_eq!(cache.features[0].features[1].start, 300);
        assert_eq!(cache.features[1].first().unwrap().feature_type.as_deref(), Some("gene"));
    }

    #[test]
    fn test_gff3_forward_reference_terminator() {
        let text = "\
chr1\t.\tCDS\t100\t200\t.\t+\t0\tID=x
###
chr1\t.\tCDS\t300\t400\t.\t+\t0\tID=x";
        let (_, cache) = parse(Format::Gff3, text);
        assert_eq!(cache.features.len(), 2);
    }

    #[test]
    fn test_gff3_stops_at_fasta() {
        let text = "\
chr1\t.\tgene\t1\t10\t.\t+\t.\tID=g1
##FASTA
>chr1
ACGTACGTAC";
        let (_, cache) = parse(Format::Gff3, text);
        assert_eq!(cache.features.len(), 1);
    }

    #[test]
    fn test_gtf_groups_by_gene_id() {
        let text = "\
#!genome-build GRCh38
chr1\thavana\tgene\t11\t100\t.\t+\t.\tgene_id \"G1\";
chr1\thavana\texon\t11\t20\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\thavana\texon\t50\t100\t.\t+\t.\tgene_id \"G2\"; transcript_id \"T2\";
chr1\thavana\texon\t150\t200\t.\t+\t.\ttranscript_id \"T3\";
chr1\thavana\tCDS\t160\t190\t.\t+\t0\ttranscript_id \"T3\";";
        let (state, cache) = parse(Format::Gtf, text);
        assert_eq!(cache.features.len(), 3);
        assert_eq!(cache.features[0].len(), 2);
        assert_eq!(cache.features[2].len(), 2);
        assert_eq!(state.directives.get("genome-build"), &["GRCh38".to_string()]);
    }

    #[test]
    fn test_gff2_space_delimited_singletons() {
        let text = "\
##gff-version 2
IV\tcurated\tmRNA\t5506800\t5508917\t.\t+\t.\tSequence B0273.1 ; Note \"Zn finger\"
IV\tcurated\texon\t5506800\t5508917\t.\t+\t.\tSequence B0273.1";
        let (_, cache) = parse(Format::Gff2, text);
        assert_eq!(cache.features.len(), 2);
        let attrs = &cache.features[0].features[0].attributes;
        assert_eq!(attrs.get_str("Sequence"), Some("B0273.1"));
        assert_eq!(attrs.get_str("Note"), Some("Zn finger"));
    }

    #[test]
    fn test_gff_rejects_bad_strand_and_phase() {
        let text = "\
chr1\t.\tCDS\t1\t10\t.\tx\t.\tID=a
chr1\t.\tCDS\t1\t10\t.\t+\t5\tID=b
chr1\t.\tCDS\t1\t10\tNaNx\t+\t0\tID=c";
        let (_, cache) = parse(Format::Gff3, text);
        assert!(cache.features.is_empty());
        assert_eq!(cache.skipped_lines(), 3);
    }
}
