//! Columnar table storage
//!
//! A `ColumnTable` is a small header (row count + column list) over
//! refcounted column arrays. `copy()` clones the header only; the data
//! arrays are shared, so copies are cheap and mutation on a copy (adding or
//! renaming columns) never leaks back into the original.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{DiffError, Result};

/// Scalar column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Double,
    String,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Double => write!(f, "DOUBLE"),
            DataType::String => write!(f, "STRING"),
        }
    }
}

const WORD_BITS: usize = 64;

/// Bit vector for row masks, packed into 64-bit words
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BitVec {
    words: Vec<u64>,
    num_bits: usize,
}

impl BitVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: Vec::with_capacity(Self::words_for(capacity)),
            num_bits: 0,
        }
    }

    /// All-zero mask of the given length
    pub fn zeros(len: usize) -> Self {
        Self {
            words: vec![0; Self::words_for(len)],
            num_bits: len,
        }
    }

    /// All-one mask of the given length
    pub fn ones(len: usize) -> Self {
        let mut mask = Self::zeros(len);
        mask.flip_all();
        mask
    }

    fn words_for(bits: usize) -> usize {
        bits.div_ceil(WORD_BITS)
    }

    // word index and single-bit mask for a position
    fn slot(index: usize) -> (usize, u64) {
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }

    #[inline]
    pub fn push(&mut self, value: bool) {
        if self.num_bits % WORD_BITS == 0 {
            self.words.push(0);
        }
        if value {
            let (word, bit) = Self::slot(self.num_bits);
            self.words[word] |= bit;
        }
        self.num_bits += 1;
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        if index >= self.num_bits {
            return false;
        }
        let (word, bit) = Self::slot(index);
        self.words[word] & bit != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        if index >= self.num_bits {
            self.num_bits = index + 1;
            self.words.resize(Self::words_for(self.num_bits), 0);
        }
        let (word, bit) = Self::slot(index);
        if value {
            self.words[word] |= bit;
        } else {
            self.words[word] &= !bit;
        }
    }

    pub fn len(&self) -> usize {
        self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Count set bits
    pub fn count_ones(&self) -> usize {
        self.words.iter().fold(0, |acc, w| acc + w.count_ones() as usize)
    }

    /// In-place intersection with another mask of the same length
    pub fn and_with(&mut self, other: &BitVec) {
        for (i, word) in self.words.iter_mut().enumerate() {
            *word &= other.words.get(i).copied().unwrap_or(0);
        }
    }

    /// In-place union with another mask of the same length
    pub fn or_with(&mut self, other: &BitVec) {
        if other.num_bits > self.num_bits {
            self.num_bits = other.num_bits;
            self.words.resize(other.words.len(), 0);
        }
        for (i, word) in self.words.iter_mut().enumerate() {
            *word |= other.words.get(i).copied().unwrap_or(0);
        }
    }

    /// Flip every bit in [0, len)
    pub fn flip_all(&mut self) {
        for word in &mut self.words {
            *word = !*word;
        }
        self.mask_tail();
    }

    /// Indices of set bits, ascending
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let base = w * WORD_BITS;
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let next = base + rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(next)
            })
        })
    }

    // zero any bits at positions >= num_bits in the final word; every
    // mutation path keeps the tail clean so iter_ones and count_ones can
    // trust the raw words
    fn mask_tail(&mut self) {
        let used = self.num_bits % WORD_BITS;
        if used > 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << used) - 1;
            }
        }
    }
}

/// Refcounted column data; clones share the underlying array
#[derive(Debug, Clone)]
pub enum ColumnData {
    Double(Arc<Vec<f64>>),
    String(Arc<Vec<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Double(v) => v.len(),
            ColumnData::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Double(_) => DataType::Double,
            ColumnData::String(_) => DataType::String,
        }
    }
}

/// A named column
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Ordered column schema with O(1) name lookup
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<(String, DataType)>,
    name_to_index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<(String, DataType)>) -> Self {
        let name_to_index = columns
            .iter()
            .enumerate()
            .map(|(i, (n, _))| (n.clone(), i))
            .collect();
        Self { columns, name_to_index }
    }

    pub fn get_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn get_type(&self, index: usize) -> Option<DataType> {
        self.columns.get(index).map(|(_, t)| *t)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Names of all columns of the given type, in schema order
    pub fn names_by_type(&self, dtype: DataType) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, t)| *t == dtype)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    pub fn has_columns(&self, names: &[String]) -> bool {
        names.iter().all(|n| self.has_column(n))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// In-memory columnar table
#[derive(Debug, Clone, Default)]
pub struct ColumnTable {
    columns: Vec<Column>,
    num_rows: usize,
}

impl ColumnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| (c.name.clone(), c.data.data_type()))
                .collect(),
        )
    }

    /// Shallow copy: new header, shared column arrays
    pub fn copy(&self) -> ColumnTable {
        self.clone()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Append a column; the first column fixes the row count
    pub fn add_column(&mut self, name: &str, data: ColumnData) -> Result<()> {
        if self.columns.is_empty() {
            self.num_rows = data.len();
        } else if data.len() != self.num_rows {
            return Err(DiffError::TypeMismatch(format!(
                "column {} has {} rows, table has {}",
                name,
                data.len(),
                self.num_rows
            )));
        }
        self.columns.push(Column {
            name: name.to_string(),
            data,
        });
        Ok(())
    }

    pub fn add_double_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        self.add_column(name, ColumnData::Double(Arc::new(values)))
    }

    pub fn add_string_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        self.add_column(name, ColumnData::String(Arc::new(values)))
    }

    pub fn rename_column(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let idx = self
            .column_index(old_name)
            .ok_or_else(|| DiffError::ColumnNotFound(old_name.to_string()))?;
        self.columns[idx].name = new_name.to_string();
        Ok(())
    }

    pub fn double_column(&self, index: usize) -> Result<&[f64]> {
        match &self.columns[index].data {
            ColumnData::Double(v) => Ok(v),
            ColumnData::String(_) => Err(DiffError::TypeMismatch(format!(
                "column {} is STRING, expected DOUBLE",
                self.columns[index].name
            ))),
        }
    }

    pub fn string_column(&self, index: usize) -> Result<&[String]> {
        match &self.columns[index].data {
            ColumnData::String(v) => Ok(v),
            ColumnData::Double(_) => Err(DiffError::TypeMismatch(format!(
                "column {} is DOUBLE, expected STRING",
                self.columns[index].name
            ))),
        }
    }

    pub fn double_column_by_name(&self, name: &str) -> Result<&[f64]> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| DiffError::ColumnNotFound(name.to_string()))?;
        self.double_column(idx)
    }

    pub fn string_column_by_name(&self, name: &str) -> Result<&[String]> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| DiffError::ColumnNotFound(name.to_string()))?;
        self.string_column(idx)
    }

    /// String columns for the given names, preserving name order
    pub fn string_cols_by_name(&self, names: &[String]) -> Result<Vec<&[String]>> {
        names
            .iter()
            .map(|n| self.string_column_by_name(n))
            .collect()
    }

    /// Keep only the named columns, in the given order
    pub fn project(&self, names: &[String]) -> Result<ColumnTable> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .column_index(name)
                .ok_or_else(|| DiffError::ColumnNotFound(name.clone()))?;
            columns.push(self.columns[idx].clone());
        }
        Ok(ColumnTable {
            columns,
            num_rows: self.num_rows,
        })
    }

    /// Keep rows whose mask bit is set
    pub fn filter(&self, mask: &BitVec) -> ColumnTable {
        let indices: Vec<usize> = mask.iter_ones().collect();
        self.gather(&indices)
    }

    /// Sort by one column; stable, ascending or descending
    pub fn order_by(&self, column: &str, ascending: bool) -> Result<ColumnTable> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| DiffError::ColumnNotFound(column.to_string()))?;
        let mut indices: Vec<usize> = (0..self.num_rows).collect();
        match &self.columns[idx].data {
            ColumnData::Double(v) => {
                indices.sort_by(|&a, &b| v[a].total_cmp(&v[b]));
            }
            ColumnData::String(v) => {
                indices.sort_by(|&a, &b| v[a].cmp(&v[b]));
            }
        }
        if !ascending {
            indices.reverse();
        }
        Ok(self.gather(&indices))
    }

    /// First n rows
    pub fn limit(&self, n: usize) -> ColumnTable {
        if n >= self.num_rows {
            return self.copy();
        }
        let indices: Vec<usize> = (0..n).collect();
        self.gather(&indices)
    }

    /// Vertical concatenation; all tables must share the first table's schema
    pub fn union_all(tables: &[ColumnTable]) -> Result<ColumnTable> {
        let first = match tables.first() {
            Some(t) => t,
            None => return Ok(ColumnTable::new()),
        };
        let mut result = ColumnTable::new();
        for col in &first.columns {
            match &col.data {
                ColumnData::Double(_) => {
                    let mut merged: Vec<f64> = Vec::new();
                    for t in tables {
                        merged.extend_from_slice(t.double_column_by_name(&col.name)?);
                    }
                    result.add_double_column(&col.name, merged)?;
                }
                ColumnData::String(_) => {
                    let mut merged: Vec<String> = Vec::new();
                    for t in tables {
                        merged.extend_from_slice(t.string_column_by_name(&col.name)?);
                    }
                    result.add_string_column(&col.name, merged)?;
                }
            }
        }
        Ok(result)
    }

    /// Row mask from a predicate over a Double column
    pub fn mask_for_double_filter<P>(&self, col_index: usize, predicate: P) -> Result<BitVec>
    where
        P: Fn(f64) -> bool,
    {
        let values = self.double_column(col_index)?;
        let mut mask = BitVec::with_capacity(values.len());
        for &v in values {
            mask.push(predicate(v));
        }
        Ok(mask)
    }

    /// Row mask from a predicate over a String column
    pub fn mask_for_string_filter<P>(&self, col_index: usize, predicate: P) -> Result<BitVec>
    where
        P: Fn(&str) -> bool,
    {
        let values = self.string_column(col_index)?;
        let mut mask = BitVec::with_capacity(values.len());
        for v in values {
            mask.push(predicate(v));
        }
        Ok(mask)
    }

    /// Materialize the given rows, in order, into a new table
    pub(crate) fn gather(&self, indices: &[usize]) -> ColumnTable {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let data = match &c.data {
                    ColumnData::Double(v) => {
                        ColumnData::Double(Arc::new(indices.iter().map(|&i| v[i]).collect()))
                    }
                    ColumnData::String(v) => ColumnData::String(Arc::new(
                        indices.iter().map(|&i| v[i].clone()).collect(),
                    )),
                };
                Column {
                    name: c.name.clone(),
                    data,
                }
            })
            .collect();
        ColumnTable {
            columns,
            num_rows: indices.len(),
        }
    }
}
