//! Secondary indexes over a sorted key-value store.
//!
//! An index is a RocksDB column family whose keys are built by the
//! order-preserving row-key codec: the encoded field values (in definition
//! order) followed by the row identifier. Values are a MessagePack-encoded
//! map of payload columns.
//!
//! ## Module Structure
//!
//! - `mod.rs` - [`Index`] operations and the [`QueryResult`] cursor
//! - `definition.rs` - [`IndexDefinition`] and field kinds
//! - `entry.rs` - [`IndexEntry`] and [`Query`]
//! - `store.rs` - RocksDB database, column family lifecycle, cache config
//! - `manager.rs` - [`IndexManager`]
//!
//! The backend never spans multiple entries with a transaction: every
//! `add_entry`/`remove_entry` is an independent durable write, and callers
//! that need crash consistency across rows sequence their writes accordingly.

use std::collections::BTreeMap;
use std::sync::Arc;

use rocksdb::{Direction, IteratorMode};

use crate::error::{Error, Result};

mod definition;
mod entry;
mod manager;
mod store;

pub use definition::{IndexDefinition, IndexFieldKind};
pub use entry::{IndexEntry, Query};
pub use manager::IndexManager;
pub use store::{BlockCacheConfig, StoreConfig};

use store::{Db, IndexStore};

// ============================================================================
// Index
// ============================================================================

/// Handle on one index table.
#[derive(Clone)]
pub struct Index {
    definition: IndexDefinition,
    store: Arc<IndexStore>,
}

impl Index {
    pub(crate) fn new(definition: IndexDefinition, store: Arc<IndexStore>) -> Self {
        Index { definition, store }
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub(crate) fn store_config(&self) -> &StoreConfig {
        self.store.config()
    }

    fn entry_key(&self, entry: &IndexEntry) -> Result<Vec<u8>> {
        let mut key = self.definition.encode_entry_fields(entry.fields())?;
        key.extend_from_slice(entry.identifier());
        Ok(key)
    }

    /// Add (or overwrite) a row. Upsert semantics: an existing row with the
    /// same fields and identifier is replaced whole.
    pub fn add_entry(&self, entry: &IndexEntry) -> Result<()> {
        let key = self.entry_key(entry)?;
        let value = rmp_serde::to_vec(entry.data())
            .map_err(|e| Error::Encoding(format!("data map serialization failed: {e}")))?;
        let cf = self.store.cf(self.definition.name())?;
        self.store.db().put_cf(&cf, key, value)?;
        Ok(())
    }

    /// Remove a row. Idempotent: removing an absent row succeeds.
    pub fn remove_entry(&self, entry: &IndexEntry) -> Result<()> {
        let key = self.entry_key(entry)?;
        let cf = self.store.cf(self.definition.name())?;
        self.store.db().delete_cf(&cf, key)?;
        Ok(())
    }

    /// Run an equality query, returning a cursor over matching rows in key
    /// order.
    ///
    /// Dropping the cursor releases the backend iterator.
    pub fn perform_query(&self, query: &Query) -> Result<QueryResult<'_>> {
        let prefix = self.definition.encode_query_prefix(query.conditions())?;
        let cf = self.store.cf(self.definition.name())?;
        let iter = self
            .store
            .db()
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        Ok(QueryResult {
            iter,
            prefix,
            done: false,
        })
    }
}

// ============================================================================
// QueryResult
// ============================================================================

/// One row yielded by a query: the identifier and the payload columns.
#[derive(Debug, Clone)]
pub struct IndexRow {
    identifier: Vec<u8>,
    data: BTreeMap<String, Vec<u8>>,
}

impl IndexRow {
    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    pub fn data(&self, column: &str) -> Option<&[u8]> {
        self.data.get(column).map(Vec::as_slice)
    }
}

/// Forward-only cursor over the rows matching a query, in key order.
pub struct QueryResult<'a> {
    iter: rocksdb::DBIteratorWithThreadMode<'a, Db>,
    prefix: Vec<u8>,
    done: bool,
}

impl QueryResult<'_> {
    /// Advance to the next matching row, or `None` when exhausted.
    pub fn next_row(&mut self) -> Result<Option<IndexRow>> {
        if self.done {
            return Ok(None);
        }
        match self.iter.next() {
            None => {
                self.done = true;
                Ok(None)
            }
            Some(item) => {
                let (key, value) = item?;
                if !key.starts_with(&self.prefix) {
                    self.done = true;
                    return Ok(None);
                }
                let data: BTreeMap<String, Vec<u8>> = rmp_serde::from_slice(&value)
                    .map_err(|e| Error::CorruptEncoding(format!("bad row data map: {e}")))?;
                Ok(Some(IndexRow {
                    identifier: key[self.prefix.len()..].to_vec(),
                    data,
                }))
            }
        }
    }
}
