//! Process-local table store
//!
//! Maps table names to loaded tables. Reads hand out shallow copies so that
//! downstream column additions never reach the stored table. Mutation is
//! confined to import operations; under the engine's single-threaded
//! contract no locking is needed.

use ahash::AHashMap;

use crate::table::ColumnTable;
use crate::{DiffError, Result};

/// Name → table mapping, mutated only by imports
#[derive(Debug, Default)]
pub struct TableStore {
    tables: AHashMap<String, ColumnTable>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under a name, replacing any previous entry
    pub fn insert(&mut self, name: &str, table: ColumnTable) {
        self.tables.insert(name.to_string(), table);
    }

    /// Shallow copy of the named table
    pub fn get(&self, name: &str) -> Result<ColumnTable> {
        self.tables
            .get(name)
            .map(ColumnTable::copy)
            .ok_or_else(|| DiffError::TableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
