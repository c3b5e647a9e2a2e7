//! VCF variants

use crate::model::{AttrValue, Attributes, Feature, FileState};

use super::{nullable, numeric_field, Line, ParseCache};

const VARIANT: &str = "variant";

pub(super) fn parse_vcf_line(line: &str, state: &mut FileState, cache: &mut ParseCache) -> Line {
    if let Some(rest) = line.strip_prefix("##") {
        let (key, value) = rest.split_once('=').unwrap_or((rest, ""));
        state.directives.push(key, value);
        return Line::Meta;
    }
    if let Some(header) = line.strip_prefix('#') {
        // #CHROM POS ID REF ALT QUAL FILTER INFO [FORMAT sample...]
        cache.vcf_samples = header.split('\t').skip(9).map(str::to_string).collect();
        return Line::Meta;
    }

    let Some(feature) = vcf_record(line, &cache.vcf_samples) else {
        return Line::Skipped;
    };
    cache.emit(state, feature, None);
    Line::Data
}

fn vcf_record(line: &str, samples: &[String]) -> Option<Feature> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 8 {
        return None;
    }

    let pos: u64 = cols[1].trim().parse().ok()?;
    let reference = cols[3];
    let qual = numeric_field(cols[5])?;
    let end = pos + (reference.len() as u64).saturating_sub(1);

    let mut feature = Feature::new(nullable(cols[0]).map(str::to_string), VARIANT, pos, end);
    feature.score = qual;

    let attrs = &mut feature.attributes;
    if let Some(id) = nullable(cols[2]) {
        attrs.insert("ID", id);
    }
    attrs.insert("REF", reference);
    attrs.insert("ALT", cols[4]);
    if let Some(filter) = nullable(cols[6]) {
        attrs.insert("FILTER", filter);
    }
    parse_info(cols[7], attrs);

    if let Some(format) = cols.get(8) {
        attrs.insert("FORMAT", *format);
        for (i, sample) in cols[9..].iter().enumerate() {
            let name = samples
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("sample{}", i + 1));
            attrs.insert(name, *sample);
        }
    }

    Some(feature)
}

/// `DP=14;AF=0.5;DB;AA=T,C` - a key without value is a flag. Lists stay text.
fn parse_info(column: &str, attrs: &mut Attributes) {
    let Some(column) = nullable(column) else {
        return;
    };
    for entry in column.split(';').filter(|e| !e.is_empty()) {
        match entry.split_once('=') {
            Some((key, value)) if value.contains(',') => attrs.insert(key, value),
            Some((key, value)) => attrs.insert(key, AttrValue::infer(value)),
            None => attrs.insert(entry, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Format;
    use crate::parse::parse_lines;

    fn parse(text: &str) -> (FileState, ParseCache) {
        let mut state = FileState::new(Format::Vcf);
        let mut cache = ParseCache::new();
        parse_lines(Format::Vcf, text.lines(), &mut state, &mut cache);
        (state, cache)
    }

    const SAMPLE: &str = "\
##fileformat=VCFv4.2
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">
##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002
20\t14370\trs6054257\tG\tA\t29\tPASS\tDP=14;AF=0.5;DB\tGT:GQ\t0|0:48\t1|0:48
20\t1230237\t.\tTAC\tT\t.\t.\tDP=13;AA=T,C\tGT\t0|0\t0/1";

    #[test]
    fn test_vcf_directives() {
        let (state, _) = parse(SAMPLE);
        assert_eq!(state.directives.get("fileformat"), &["VCFv4.2".to_string()]);
        assert_eq!(state.directives.get("INFO").len(), 2);
    }

    #[test]
    fn test_vcf_record() {
        let (_, cache) = parse(SAMPLE);
        let first = &cache.features[0].features[0];
        assert_eq!(first.seqid.as_deref(), Some("20"));
        assert_eq!((first.start, first.end), (14370, 14370));
        assert_eq!(first.score, Some(29.0));
        assert_eq!(first.attributes.get_str("ID"), Some("rs6054257"));
        assert_eq!(first.attributes.get("DP"), Some(&AttrValue::Number(14.0)));
        assert_eq!(first.attributes.get("DB"), Some(&AttrValue::Flag(true)));
        assert_eq!(first.attributes.get_str("NA00002"), Some("1|0:48"));
        assert_eq!(first.strand, None);
    }

    #[test]
    fn test_vcf_dot_is_null() {
        let (_, cache) = parse(SAMPLE);
        let second = &cache.features[1].features[0];
        assert!(!second.attributes.contains_key("ID"));
        assert!(!second.attributes.contains_key("FILTER"));
        assert_eq!(second.score, None);
        assert_eq!((second.start, second.end), (1230237, 1230239));
        assert_eq!(second.attributes.get_str("AA"), Some("T,C"));
    }

    #[test]
    fn test_vcf_without_header_names_samples_by_position() {
        let (_, cache) = parse("1\t100\t.\tA\tG\t50\tPASS\t.\tGT\t0/1");
        let f = &cache.features[0].features[0];
        assert_eq!(f.attributes.get_str("sample1"), Some("0/1"));
    }

    #[test]
    fn test_vcf_malformed() {
        let (_, cache) = parse("1\tabc\t.\tA\tG\t50\tPASS\t.\n1\t100\t.\tA\tG\tlow\tPASS\t.");
        assert!(cache.features.is_empty());
        assert_eq!(cache.skipped_lines(), 2);
    }
}
