//! Shared-dictionary attribute encoding
//!
//! Dictionary-encodes string columns into dense integer codes so the
//! DIFF-JOIN and summarizer passes can count over machine integers. All
//! columns of one encoding batch share a single dictionary: identical
//! strings receive identical codes regardless of source column.

use ahash::AHashMap;

/// Dictionary encoder; codes are dense and start at 1
#[derive(Debug, Default)]
pub struct AttributeEncoder {
    codes: AHashMap<String, u32>,
    values: Vec<String>,
}

impl AttributeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode key columns then value columns, preserving positional order.
    /// Returns one code array per input column.
    pub fn encode_key_value_attributes(
        &mut self,
        key_columns: &[&[String]],
        value_columns: &[&[String]],
    ) -> Vec<Vec<u32>> {
        let mut encoded = Vec::with_capacity(key_columns.len() + value_columns.len());
        for col in key_columns.iter().chain(value_columns.iter()) {
            encoded.push(col.iter().map(|s| self.encode(s)).collect());
        }
        encoded
    }

    /// Code for a string, assigning the next dense code on first sight
    pub fn encode(&mut self, value: &str) -> u32 {
        if let Some(&code) = self.codes.get(value) {
            return code;
        }
        let code = self.values.len() as u32 + 1;
        self.codes.insert(value.to_string(), code);
        self.values.push(value.to_string());
        code
    }

    /// Original string for a previously issued code
    pub fn decode_value(&self, code: u32) -> &str {
        &self.values[(code - 1) as usize]
    }

    /// Number of distinct strings seen
    pub fn cardinality(&self) -> usize {
        self.values.len()
    }
}
