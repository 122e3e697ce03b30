//! Outlier summarization
//!
//! The explanation engine behind DIFF: given a table tagged with a binary
//! outlier column, enumerates attribute combinations up to a maximum order
//! and reports the ones whose support and ratio metric clear the configured
//! thresholds. Attribute columns are dictionary-encoded so the counting
//! passes run over dense integer codes.

use ahash::AHashMap;
use rayon::prelude::*;

use crate::encoder::AttributeEncoder;
use crate::table::ColumnTable;
use crate::{DiffError, Result};

/// The supported ratio metric: per-subgroup outlier rate over the global rate
pub const GLOBAL_RATIO: &str = "global_ratio";

const MAX_SUPPORTED_ORDER: usize = 3;

/// Itemset key: attribute codes for one combination, zero-padded
type ItemsetKey = [u32; MAX_SUPPORTED_ORDER];

/// Summarizer for DIFF queries; configure, `process`, then read `results`
#[derive(Debug)]
pub struct OutlierSummarizer {
    ratio_metric: String,
    max_order: usize,
    min_support: f64,
    min_ratio_metric: f64,
    outlier_column: String,
    attributes: Vec<String>,
    num_threads: usize,
    results: Option<Explanation>,
}

impl Default for OutlierSummarizer {
    fn default() -> Self {
        Self {
            ratio_metric: GLOBAL_RATIO.to_string(),
            max_order: MAX_SUPPORTED_ORDER,
            min_support: 0.2,
            min_ratio_metric: 1.5,
            outlier_column: "outlier_col".to_string(),
            attributes: Vec::new(),
            num_threads: 1,
            results: None,
        }
    }
}

impl OutlierSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ratio_metric(&mut self, metric: &str) -> &mut Self {
        self.ratio_metric = metric.to_string();
        self
    }

    pub fn set_max_order(&mut self, order: usize) -> &mut Self {
        self.max_order = order;
        self
    }

    pub fn set_min_support(&mut self, min_support: f64) -> &mut Self {
        self.min_support = min_support;
        self
    }

    pub fn set_min_ratio_metric(&mut self, min_ratio: f64) -> &mut Self {
        self.min_ratio_metric = min_ratio;
        self
    }

    pub fn set_outlier_column(&mut self, column: &str) -> &mut Self {
        self.outlier_column = column.to_string();
        self
    }

    pub fn set_attributes(&mut self, attributes: &[String]) -> &mut Self {
        self.attributes = attributes.to_vec();
        self
    }

    pub fn set_num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.num_threads = num_threads.max(1);
        self
    }

    /// Enumerate and score attribute combinations over the tagged table
    pub fn process(&mut self, table: &ColumnTable) -> Result<()> {
        if self.ratio_metric != GLOBAL_RATIO {
            return Err(DiffError::UnsupportedOperator(format!(
                "ratio metric {}",
                self.ratio_metric
            )));
        }
        if self.max_order == 0 || self.max_order > MAX_SUPPORTED_ORDER {
            return Err(DiffError::UnsupportedQuery(format!(
                "max combination order {} (supported: 1..={})",
                self.max_order, MAX_SUPPORTED_ORDER
            )));
        }

        let outlier_vals = table.double_column_by_name(&self.outlier_column)?;
        let is_outlier: Vec<bool> = outlier_vals.iter().map(|&v| v != 0.0).collect();
        let attr_cols = table.string_cols_by_name(&self.attributes)?;

        let mut encoder = AttributeEncoder::new();
        let encoded = encoder.encode_key_value_attributes(&[], &attr_cols);

        let num_rows = table.num_rows();
        let outlier_total = is_outlier.iter().filter(|&&o| o).count();
        let global_rate = outlier_total as f64 / num_rows as f64;

        let mut items = Vec::new();
        let order_cap = self.max_order.min(self.attributes.len());
        for k in 1..=order_cap {
            for combo in combinations(self.attributes.len(), k) {
                let counts = self.count_itemsets(&combo, &encoded, &is_outlier);
                for (key, (outliers, count)) in counts {
                    let support = outliers as f64 / outlier_total as f64;
                    let ratio = (outliers as f64 / count as f64) / global_rate;
                    if support >= self.min_support && ratio >= self.min_ratio_metric {
                        let values = combo
                            .iter()
                            .enumerate()
                            .map(|(slot, &attr_idx)| {
                                (attr_idx, encoder.decode_value(key[slot]).to_string())
                            })
                            .collect();
                        items.push(ExplanationItem {
                            values,
                            support,
                            ratio,
                            outliers: outliers as f64,
                            count: count as f64,
                        });
                    }
                }
            }
        }

        self.results = Some(Explanation {
            attributes: self.attributes.clone(),
            ratio_metric: self.ratio_metric.clone(),
            items,
        });
        Ok(())
    }

    /// Results of the last `process` call
    pub fn results(&self) -> Result<&Explanation> {
        self.results
            .as_ref()
            .ok_or_else(|| DiffError::UnsupportedQuery("summarizer has no results".to_string()))
    }

    // (outlier rows, total rows) per itemset of one attribute combination
    fn count_itemsets(
        &self,
        combo: &[usize],
        encoded: &[Vec<u32>],
        is_outlier: &[bool],
    ) -> AHashMap<ItemsetKey, (u32, u32)> {
        let num_rows = is_outlier.len();
        let key_for_row = |i: usize| {
            let mut key: ItemsetKey = [0; MAX_SUPPORTED_ORDER];
            for (slot, &attr_idx) in combo.iter().enumerate() {
                key[slot] = encoded[attr_idx][i];
            }
            key
        };

        if self.num_threads > 1 {
            (0..num_rows)
                .into_par_iter()
                .fold(AHashMap::default, |mut map: AHashMap<ItemsetKey, (u32, u32)>, i| {
                    let entry = map.entry(key_for_row(i)).or_insert((0, 0));
                    if is_outlier[i] {
                        entry.0 += 1;
                    }
                    entry.1 += 1;
                    map
                })
                .reduce(AHashMap::default, |mut acc, partial| {
                    for (key, (a, c)) in partial {
                        let entry = acc.entry(key).or_insert((0, 0));
                        entry.0 += a;
                        entry.1 += c;
                    }
                    acc
                })
        } else {
            let mut map: AHashMap<ItemsetKey, (u32, u32)> = AHashMap::default();
            for i in 0..num_rows {
                let entry = map.entry(key_for_row(i)).or_insert((0, 0));
                if is_outlier[i] {
                    entry.0 += 1;
                }
                entry.1 += 1;
            }
            map
        }
    }
}

/// Scored attribute combinations from one summarization run
#[derive(Debug, Clone)]
pub struct Explanation {
    attributes: Vec<String>,
    ratio_metric: String,
    items: Vec<ExplanationItem>,
}

#[derive(Debug, Clone)]
struct ExplanationItem {
    /// (attribute index, decoded value) pairs for the combination
    values: Vec<(usize, String)>,
    support: f64,
    ratio: f64,
    outliers: f64,
    count: f64,
}

impl Explanation {
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Materialize as a table: one attribute column per configured attribute
    /// (empty string where the combination does not bind it), then
    /// `support`, the ratio metric column, `outliers`, and `count`.
    pub fn to_column_table(&self) -> Result<ColumnTable> {
        let n = self.items.len();
        let mut table = ColumnTable::new();
        for (attr_idx, attr) in self.attributes.iter().enumerate() {
            let mut col = vec![String::new(); n];
            for (row, item) in self.items.iter().enumerate() {
                if let Some((_, v)) = item.values.iter().find(|(i, _)| *i == attr_idx) {
                    col[row] = v.clone();
                }
            }
            table.add_string_column(attr, col)?;
        }
        table.add_double_column("support", self.items.iter().map(|i| i.support).collect())?;
        table.add_double_column(
            &self.ratio_metric,
            self.items.iter().map(|i| i.ratio).collect(),
        )?;
        table.add_double_column("outliers", self.items.iter().map(|i| i.outliers).collect())?;
        table.add_double_column("count", self.items.iter().map(|i| i.count).collect())?;
        Ok(table)
    }
}

// k-subsets of 0..n in lexicographic order
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    let mut current = Vec::with_capacity(k);
    fn recurse(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            recurse(i + 1, n, k, current, out);
            current.pop();
        }
    }
    recurse(0, n, k, &mut current, &mut result);
    result
}
