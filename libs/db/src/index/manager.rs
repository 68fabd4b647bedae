//! Index lifecycle: opening the store, creating and dropping index tables.

use std::sync::Arc;

use crate::error::Result;

use super::definition::IndexDefinition;
use super::store::{IndexStore, StoreConfig};
use super::Index;

/// Opens the index store and hands out [`Index`] handles.
///
/// Cloning is cheap; all clones share the same open database.
#[derive(Clone)]
pub struct IndexManager {
    store: Arc<IndexStore>,
}

impl IndexManager {
    /// Open (or create) the index store at the configured path.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Ok(IndexManager {
            store: Arc::new(IndexStore::open(config)?),
        })
    }

    /// Get an index handle, creating its table on first use.
    pub fn get_index(&self, definition: IndexDefinition) -> Result<Index> {
        self.store.create_cf_if_missing(definition.name())?;
        Ok(Index::new(definition, Arc::clone(&self.store)))
    }

    /// Whether an index table exists.
    pub fn has_index(&self, name: &str) -> bool {
        self.store.has_cf(name)
    }

    /// Drop an index table.
    ///
    /// Fails with [`crate::Error::IndexNotFound`] when the table is absent.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        self.store.drop_cf(name)
    }

    /// Names of the index tables in the store.
    pub fn index_names(&self) -> Vec<String> {
        self.store.table_names()
    }
}
