#![forbid(unsafe_code)]

//! Typed manifest metadata.
//!
//! Manifests carry an open-ended key-value map (release channel tags, branch
//! names, rollout percentages). The map is never interpreted here; it is
//! stored verbatim and consulted only by selection policies through
//! [`ManifestFilters`]. Values are a closed sum of scalar kinds plus an
//! opaque fallback so that store serialization stays deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One metadata value: a known scalar, or the verbatim JSON of anything else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    String(String),
    /// Non-scalar payload (array, object, null) kept verbatim.
    Opaque(serde_json::Value),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Ordered metadata map. `BTreeMap` keeps JSON serialization deterministic,
/// which the store relies on for stable round-trips.
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// Matching criteria used by selection policies to scope comparisons.
///
/// A filter key constrains only updates whose metadata contains that key;
/// updates missing the key pass. This mirrors how release-channel scoping
/// behaves: an unscoped update is compatible with every channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestFilters(pub MetadataMap);

impl ManifestFilters {
    pub fn new(map: MetadataMap) -> Self {
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `metadata` is compatible with every filter entry.
    #[must_use]
    pub fn matches(&self, metadata: &MetadataMap) -> bool {
        self.0.iter().all(|(key, expected)| {
            metadata.get(key).is_none_or(|actual| actual == expected)
        })
    }
}

impl FromIterator<(String, MetadataValue)> for ManifestFilters {
    fn from_iter<I: IntoIterator<Item = (String, MetadataValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn meta(pairs: &[(&str, MetadataValue)]) -> MetadataMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[rstest]
    #[case::empty_filters_match_anything(&[], &[("channel", "beta".into())], true)]
    #[case::equal_scalar(&[("channel", "beta".into())], &[("channel", "beta".into())], true)]
    #[case::unequal_scalar(&[("channel", "beta".into())], &[("channel", "stable".into())], false)]
    #[case::missing_key_passes(&[("channel", "beta".into())], &[], true)]
    #[case::bool_mismatch(&[("rollout", true.into())], &[("rollout", false.into())], false)]
    fn filter_matching(
        #[case] filters: &[(&str, MetadataValue)],
        #[case] metadata: &[(&str, MetadataValue)],
        #[case] expected: bool,
    ) {
        let filters = ManifestFilters::new(meta(filters));
        assert_eq!(filters.matches(&meta(metadata)), expected);
    }

    #[test]
    fn scalar_kinds_deserialize_without_tags() {
        let json = r#"{"branch":"main","percent":12.5,"enabled":true,"extra":{"a":1}}"#;
        let map: MetadataMap = serde_json::from_str(json).unwrap();

        assert_eq!(map["branch"], MetadataValue::String("main".into()));
        assert_eq!(map["percent"], MetadataValue::Number(12.5));
        assert_eq!(map["enabled"], MetadataValue::Bool(true));
        assert!(matches!(map["extra"], MetadataValue::Opaque(_)));
    }

    #[test]
    fn serialization_is_deterministic() {
        let json = r#"{"zeta":"z","alpha":"a","mid":3.0}"#;
        let map: MetadataMap = serde_json::from_str(json).unwrap();

        let a = serde_json::to_string(&map).unwrap();
        let b = serde_json::to_string(&map).unwrap();
        assert_eq!(a, b);
        // BTreeMap ordering: keys come out sorted regardless of input order.
        assert!(a.find("alpha").unwrap() < a.find("zeta").unwrap());
    }
}
