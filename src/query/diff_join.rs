//! Fused DIFF-JOIN evaluation
//!
//! Pushes the differential computation through a PK-FK join without
//! materializing the join output. Phase 1 diffs the encoded foreign-key
//! columns of the two fact tables; phase 2 semi-joins the dimension table
//! against the surviving keys and merges per-value counts; phase 3
//! materializes one result row per surviving value.
//!
//! Caller-enforced assumptions: both joins are natural inner joins over a
//! single shared String key column, exactly one explain column, and the
//! global_ratio metric.

use ahash::{AHashMap, AHashSet};

use crate::ast::Join;
use crate::encoder::AttributeEncoder;
use crate::query::{join, QueryEngine};
use crate::table::ColumnTable;
use crate::{DiffError, Result};

/// Outlier (`a`) and inlier (`b`) counters for one code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct IntPair {
    pub a: u32,
    pub b: u32,
}

impl IntPair {
    fn ratio(&self) -> f64 {
        self.a as f64 / (self.a + self.b) as f64
    }
}

/// Count map from encoded attribute to outlier/inlier counters. Entries are
/// only created by increments or merges, so no key ever holds (0, 0).
#[derive(Debug, Default)]
pub(crate) struct CountMap {
    inner: AHashMap<u32, IntPair>,
}

impl CountMap {
    fn new() -> Self {
        Self::default()
    }

    fn add_outlier(&mut self, key: u32) {
        self.inner.entry(key).or_default().a += 1;
    }

    fn add_inlier(&mut self, key: u32) {
        self.inner.entry(key).or_default().b += 1;
    }

    fn merge(&mut self, key: u32, pair: IntPair) {
        let entry = self.inner.entry(key).or_default();
        entry.a += pair.a;
        entry.b += pair.b;
    }

    fn get_or_default(&self, key: u32) -> IntPair {
        self.inner.get(&key).copied().unwrap_or_default()
    }

    fn contains(&self, key: u32) -> bool {
        self.inner.contains_key(&key)
    }

    fn retain<F: FnMut(&IntPair) -> bool>(&mut self, mut keep: F) {
        self.inner.retain(|_, pair| keep(pair));
    }

    fn iter(&self) -> impl Iterator<Item = (&u32, &IntPair)> {
        self.inner.iter()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl QueryEngine {
    /// Execute DIFF over two PK-FK joins sharing a dimension table
    pub(crate) fn execute_diff_join(
        &mut self,
        first: &Join,
        second: &Join,
        explain_cols: &[String],
        min_ratio: f64,
        min_support: f64,
    ) -> Result<ColumnTable> {
        let outlier_df = self.table_for_relation(&first.left)?;
        let inlier_df = self.table_for_relation(&second.left)?;
        let common = self.table_for_relation(&first.right)?;

        let criteria = first.criteria.as_ref().ok_or_else(|| {
            DiffError::InvalidJoin("no clause (e.g., ON, USING) specified in JOIN".to_string())
        })?;
        let join_col = join::join_column(criteria, &outlier_df.schema(), &common.schema())?;
        let explain_col = &explain_cols[0];

        let outlier_rows = outlier_df.num_rows();
        let min_support_threshold = (min_support * outlier_rows as f64) as i64;
        let global_ratio_denom =
            outlier_rows as f64 / (outlier_rows + inlier_df.num_rows()) as f64;
        let min_ratio_threshold = min_ratio * global_ratio_denom;

        // phase 1: encode all key columns and the explain column with one
        // shared dictionary, then diff the fact-table keys
        let outlier_keys = outlier_df.string_column_by_name(&join_col)?;
        let inlier_keys = inlier_df.string_column_by_name(&join_col)?;
        let common_keys = common.string_column_by_name(&join_col)?;
        let common_values = common.string_column_by_name(explain_col)?;

        let mut encoder = AttributeEncoder::new();
        let encoded = encoder.encode_key_value_attributes(
            &[outlier_keys, inlier_keys, common_keys],
            &[common_values],
        );

        let mut foreign_key_counts = CountMap::new();
        let candidate_keys = diff_keys(
            &encoded[0],
            &encoded[1],
            &mut foreign_key_counts,
            min_ratio_threshold,
        );

        // phase 2: semi-join the dimension table against the candidates and
        // merge counts per explain-column value
        let mut value_counts = CountMap::new();
        semi_join_and_merge(
            &candidate_keys,
            &encoded[2],
            &encoded[3],
            &foreign_key_counts,
            &mut value_counts,
            min_support_threshold,
            min_ratio_threshold,
        );

        // phase 3: one row per surviving value
        let n = value_counts.len();
        let mut values = Vec::with_capacity(n);
        let mut supports = Vec::with_capacity(n);
        let mut ratios = Vec::with_capacity(n);
        let mut outlier_counts = Vec::with_capacity(n);
        let mut total_counts = Vec::with_capacity(n);
        for (&code, pair) in value_counts.iter() {
            values.push(encoder.decode_value(code).to_string());
            supports.push(pair.a as f64 / outlier_rows as f64);
            ratios.push(pair.ratio() / global_ratio_denom);
            outlier_counts.push(pair.a as f64);
            total_counts.push((pair.a + pair.b) as f64);
        }

        let mut result = ColumnTable::new();
        result.add_string_column(explain_col, values)?;
        result.add_double_column("support", supports)?;
        result.add_double_column("global_ratio", ratios)?;
        result.add_double_column("outlier_count", outlier_counts)?;
        result.add_double_column("total_count", total_counts)?;
        Ok(result)
    }
}

/// Count outlier and inlier occurrences per key, returning the keys whose
/// outlier ratio lies strictly above the threshold
fn diff_keys(
    outliers: &[u32],
    inliers: &[u32],
    foreign_key_counts: &mut CountMap,
    min_ratio_threshold: f64,
) -> AHashSet<u32> {
    for &key in outliers {
        foreign_key_counts.add_outlier(key);
    }
    for &key in inliers {
        foreign_key_counts.add_inlier(key);
    }
    foreign_key_counts
        .iter()
        .filter(|(_, pair)| pair.ratio() > min_ratio_threshold)
        .map(|(&key, _)| key)
        .collect()
}

/// Merge key counts into per-value counts across the dimension table, then
/// prune values lacking support or ratio
fn semi_join_and_merge(
    candidate_keys: &AHashSet<u32>,
    key_col: &[u32],
    value_col: &[u32],
    foreign_key_counts: &CountMap,
    value_counts: &mut CountMap,
    min_support_threshold: i64,
    min_ratio_threshold: f64,
) {
    // forward pass: values reached through a candidate key absorb that
    // key's counts
    for (i, &key) in key_col.iter().enumerate() {
        if candidate_keys.contains(&key) {
            value_counts.merge(value_col[i], foreign_key_counts.get_or_default(key));
        }
    }
    // backfill pass: keys that missed the pre-filter still contribute to
    // values that are already present
    for (i, &value) in value_col.iter().enumerate() {
        if !value_counts.contains(value) {
            continue;
        }
        let key = key_col[i];
        if candidate_keys.contains(&key) {
            continue;
        }
        value_counts.merge(value, foreign_key_counts.get_or_default(key));
    }
    // prune strictly below either threshold; values exactly at a threshold
    // survive
    value_counts.retain(|pair| {
        (pair.a as i64) >= min_support_threshold && pair.ratio() >= min_ratio_threshold
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(cols: &[&[&str]]) -> (AttributeEncoder, Vec<Vec<u32>>) {
        let owned: Vec<Vec<String>> = cols
            .iter()
            .map(|c| c.iter().map(|s| s.to_string()).collect())
            .collect();
        let mut encoder = AttributeEncoder::new();
        let refs: Vec<&[String]> = owned.iter().map(|c| c.as_slice()).collect();
        let encoded = encoder.encode_key_value_attributes(&refs, &[]);
        (encoder, encoded)
    }

    #[test]
    fn test_diff_keys_strict_threshold() {
        let (_, encoded) = encode_all(&[&["a", "a", "b", "b"], &["c", "d", "e"]]);
        let mut counts = CountMap::new();
        // n_R=4, n_S=3: denom = 4/7, minRatio 1.5 -> threshold ~0.857
        let threshold = 1.5 * (4.0 / 7.0);
        let candidates = diff_keys(&encoded[0], &encoded[1], &mut counts, threshold);

        assert_eq!(candidates.len(), 2); // a and b, each ratio 1.0
        assert_eq!(counts.get_or_default(encoded[0][0]), IntPair { a: 2, b: 0 });
        assert_eq!(counts.get_or_default(encoded[1][0]), IntPair { a: 0, b: 1 });
    }

    #[test]
    fn test_diff_keys_ratio_exactly_at_threshold_excluded() {
        let (_, encoded) = encode_all(&[&["a"], &["a"]]);
        let mut counts = CountMap::new();
        // key "a" has ratio exactly 0.5; strict > must exclude it
        let candidates = diff_keys(&encoded[0], &encoded[1], &mut counts, 0.5);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_semi_join_and_merge() {
        let (_, encoded) = encode_all(&[
            &["a", "a", "b", "b"],            // R keys
            &["c", "d", "e"],                 // S keys
            &["a", "b", "c", "d", "e"],       // T keys
            &["CA", "CA", "TX", "TX", "FL"],  // T explain values
        ]);
        let mut fk_counts = CountMap::new();
        let threshold = 1.5 * (4.0 / 7.0);
        let candidates = diff_keys(&encoded[0], &encoded[1], &mut fk_counts, threshold);

        let mut value_counts = CountMap::new();
        let min_support_threshold = (0.5 * 4.0) as i64;
        semi_join_and_merge(
            &candidates,
            &encoded[2],
            &encoded[3],
            &fk_counts,
            &mut value_counts,
            min_support_threshold,
            threshold,
        );

        assert_eq!(value_counts.len(), 1);
        let ca = encoded[3][0];
        assert_eq!(value_counts.get_or_default(ca), IntPair { a: 4, b: 0 });
    }

    #[test]
    fn test_backfill_absorbs_non_candidate_keys() {
        // keys k1 (outlier-heavy) and k2 (inlier-heavy) map to the same
        // value; k2 misses the pre-filter but must still contribute
        let (_, encoded) = encode_all(&[
            &["k1", "k1", "k1"], // R
            &["k2", "k2"],       // S
            &["k1", "k2"],       // T keys
            &["V", "V"],         // T values
        ]);
        let mut fk_counts = CountMap::new();
        let threshold = 0.9;
        let candidates = diff_keys(&encoded[0], &encoded[1], &mut fk_counts, threshold);
        assert_eq!(candidates.len(), 1); // only k1

        let mut value_counts = CountMap::new();
        semi_join_and_merge(
            &candidates,
            &encoded[2],
            &encoded[3],
            &fk_counts,
            &mut value_counts,
            0,
            0.0,
        );

        let v = encoded[3][0];
        // a=3 from k1, b=2 backfilled from k2
        assert_eq!(value_counts.get_or_default(v), IntPair { a: 3, b: 2 });
    }

    #[test]
    fn test_prune_keeps_values_at_threshold() {
        let mut value_counts = CountMap::new();
        value_counts.merge(1, IntPair { a: 2, b: 2 }); // ratio 0.5
        value_counts.merge(2, IntPair { a: 1, b: 3 }); // ratio 0.25

        let candidates = AHashSet::new();
        semi_join_and_merge(
            &candidates,
            &[],
            &[],
            &CountMap::new(),
            &mut value_counts,
            2,
            0.5,
        );

        // value 1 sits exactly at both thresholds and survives
        assert_eq!(value_counts.len(), 1);
        assert!(value_counts.contains(1));
    }
}
