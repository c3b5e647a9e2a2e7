//! Normalized feature model and per-file aggregate state

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::detect::Format;

/// Strand of a feature. Absence of strand information is `None` at the use site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    /// `+`
    Forward,
    /// `-`
    Reverse,
    /// `.` - explicitly not stranded
    Unstranded,
}

impl Strand {
    /// Parse a strand column. `?` and anything unknown map to `None`.
    pub fn parse(s: &str) -> Option<Strand> {
        match s {
            "+" => Some(Strand::Forward),
            "-" => Some(Strand::Reverse),
            "." => Some(Strand::Unstranded),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
            Strand::Unstranded => '.',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Key of the per-strand registries: strand value as observed, `None` included
pub type StrandKey = Option<Strand>;

/// Attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numbers for numeric-looking text, text otherwise
    pub fn infer(raw: &str) -> AttrValue {
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => AttrValue::Number(n),
            _ => AttrValue::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(s) => write!(f, "{}", s),
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Flag(b)
    }
}

/// Ordered attribute mapping. Insertion order is kept; re-inserting a key replaces in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes(Vec<(String, AttrValue)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttrValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One normalized record. Coordinates are 1-based inclusive for every format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub seqid: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub feature_type: Option<String>,
    pub start: u64,
    pub end: u64,
    pub score: Option<f64>,
    pub strand: Option<Strand>,
    pub phase: Option<u8>,
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(seqid: Option<String>, feature_type: &str, start: u64, end: u64) -> Self {
        Self {
            seqid,
            feature_type: Some(feature_type.to_string()),
            start,
            end,
            ..Self::default()
        }
    }

    /// Length in bases (inclusive coordinates)
    pub fn len(&self) -> u64 {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Features rendered and stored together (GFF3 `ID`, GTF `gene_id`, or a singleton)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureGroup {
    pub features: Vec<Feature>,
}

impl FeatureGroup {
    pub fn single(feature: Feature) -> Self {
        Self { features: vec![feature] }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn first(&self) -> Option<&Feature> {
        self.features.first()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    /// Smallest start of the group
    pub fn start(&self) -> Option<u64> {
        self.features.iter().map(|f| f.start).min()
    }

    /// Largest end of the group
    pub fn end(&self) -> Option<u64> {
        self.features.iter().map(|f| f.end).max()
    }
}

/// Coordinate bounds for one (type, strand)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: u64,
    pub max: u64,
}

impl MinMax {
    pub fn new(start: u64, end: u64) -> Self {
        Self { min: start, max: end }
    }

    /// Widen to cover `start..=end`. Never contracts.
    pub fn extend(&mut self, start: u64, end: u64) {
        self.min = self.min.min(start);
        self.max = self.max.max(end);
    }
}

/// Multi-valued header lines, encounter order kept per key and across keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directives {
    entries: Vec<(String, Vec<String>)>,
}

impl Directives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<(String, Vec<String>)> {
        self.entries
    }

    pub(crate) fn from_entries(entries: Vec<(String, Vec<String>)>) -> Self {
        Self { entries }
    }
}

/// Running per-file summary built while parsing, persisted as the metadata record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileState {
    /// Feature type -> strands observed for it
    pub types: BTreeMap<String, BTreeSet<StrandKey>>,
    /// Feature type -> strand -> bounds
    pub minmax: BTreeMap<String, BTreeMap<StrandKey, MinMax>>,
    /// (type, strand) pairs whose color comes from the file itself
    pub colors: BTreeSet<(String, StrandKey)>,
    pub directives: Directives,
    pub format: Option<Format>,
    pub total_chunks: u32,
    pub total_features: u64,
    /// Chunk size used when the chunks were written
    pub chunk_size: usize,
}

impl FileState {
    pub fn new(format: Format) -> Self {
        Self {
            format: Some(format),
            ..Self::default()
        }
    }

    /// Fold one feature into the type registry and bounds
    pub fn observe(&mut self, feature: &Feature) {
        let Some(ref feature_type) = feature.feature_type else {
            return;
        };

        match self.types.get_mut(feature_type) {
            Some(strands) => {
                strands.insert(feature.strand);
            }
            None => {
                self.types
                    .insert(feature_type.clone(), BTreeSet::from([feature.strand]));
            }
        }

        if !self.minmax.contains_key(feature_type) {
            self.minmax.insert(feature_type.clone(), BTreeMap::new());
        }
        if let Some(per_strand) = self.minmax.get_mut(feature_type) {
            per_strand
                .entry(feature.strand)
                .and_modify(|mm| mm.extend(feature.start, feature.end))
                .or_insert_with(|| MinMax::new(feature.start, feature.end));
        }
    }

    pub fn mark_colored(&mut self, feature_type: &str, strand: StrandKey) {
        self.colors.insert((feature_type.to_string(), strand));
    }

    pub fn is_colored(&self, feature_type: &str, strand: StrandKey) -> bool {
        self.colors.contains(&(feature_type.to_string(), strand))
    }

    pub fn bounds(&self, feature_type: &str, strand: StrandKey) -> Option<MinMax> {
        self.minmax.get(feature_type)?.get(&strand).copied()
    }
}
