//! RocksDB-backed storage for index tables.
//!
//! One database holds every index table of a store path; each table is a
//! column family named after the index. The database is opened in
//! multi-threaded column-family mode so tables can be created and dropped at
//! runtime without reopening.

use std::path::PathBuf;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, Cache, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
};

use crate::error::{Error, Result};

pub(crate) type Db = DBWithThreadMode<MultiThreaded>;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the shared RocksDB block cache.
///
/// One LRU cache is shared by all index column families so memory is
/// allocated by access pattern rather than per table.
#[derive(Debug, Clone)]
pub struct BlockCacheConfig {
    /// Total block cache size in bytes. Default: 64MB.
    pub cache_size_bytes: usize,

    /// Block size for index column families. Default: 4KB.
    pub block_size: usize,

    /// Whether to cache index and filter blocks in the block cache.
    /// Default: true.
    pub cache_index_and_filter_blocks: bool,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        Self {
            cache_size_bytes: 64 * 1024 * 1024,
            block_size: 4 * 1024,
            cache_index_and_filter_blocks: true,
        }
    }
}

impl BlockCacheConfig {
    /// Create config with the specified cache size, defaults otherwise.
    pub fn with_cache_size(cache_size_bytes: usize) -> Self {
        Self {
            cache_size_bytes,
            ..Default::default()
        }
    }
}

/// Configuration for an index store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory.
    pub path: PathBuf,
    /// Shared block cache settings.
    pub block_cache: BlockCacheConfig,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache: BlockCacheConfig::default(),
        }
    }
}

// ============================================================================
// IndexStore
// ============================================================================

/// The open database behind an [`crate::index::IndexManager`].
pub(crate) struct IndexStore {
    db: Db,
    block_cache: Cache,
    config: StoreConfig,
}

impl IndexStore {
    /// Open the database, preserving every existing column family.
    #[tracing::instrument(skip(config), fields(path = ?config.path))]
    pub(crate) fn open(config: StoreConfig) -> Result<Self> {
        if config.path.is_file() {
            return Err(Error::InvalidStorePath(format!(
                "path is a file: {}",
                config.path.display()
            )));
        }
        if config.path.is_symlink() {
            return Err(Error::InvalidStorePath(format!(
                "path is a symlink: {}",
                config.path.display()
            )));
        }

        let block_cache = Cache::new_lru_cache(config.block_cache.cache_size_bytes);

        // A missing database has no column families to list.
        let existing = Db::list_cf(&Options::default(), &config.path).unwrap_or_default();
        let descriptors: Vec<ColumnFamilyDescriptor> = existing
            .iter()
            .map(|name| {
                ColumnFamilyDescriptor::new(name, cf_options(&block_cache, &config.block_cache))
            })
            .collect();

        let db = Db::open_cf_descriptors(&open_options(), &config.path, descriptors)?;

        tracing::info!(
            cache_mb = config.block_cache.cache_size_bytes / (1024 * 1024),
            tables = existing.len().saturating_sub(1),
            "[IndexStore] Opened"
        );

        Ok(Self {
            db,
            block_cache,
            config,
        })
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Handle for an existing index column family.
    pub(crate) fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    pub(crate) fn has_cf(&self, name: &str) -> bool {
        self.db.cf_handle(name).is_some()
    }

    /// Create an index column family if it does not exist yet.
    pub(crate) fn create_cf_if_missing(&self, name: &str) -> Result<()> {
        if self.db.cf_handle(name).is_some() {
            return Ok(());
        }
        self.db
            .create_cf(name, &cf_options(&self.block_cache, &self.config.block_cache))?;
        tracing::debug!(table = name, "[IndexStore] Created index table");
        Ok(())
    }

    /// Drop an index column family.
    pub(crate) fn drop_cf(&self, name: &str) -> Result<()> {
        if self.db.cf_handle(name).is_none() {
            return Err(Error::IndexNotFound(name.to_string()));
        }
        self.db.drop_cf(name)?;
        tracing::info!(table = name, "[IndexStore] Dropped index table");
        Ok(())
    }

    /// Column family names of the index tables currently open.
    pub(crate) fn table_names(&self) -> Vec<String> {
        Db::list_cf(&Options::default(), &self.config.path)
            .unwrap_or_default()
            .into_iter()
            .filter(|name| name != "default")
            .collect()
    }
}

/// Database-level options: create on first open, allow runtime CF churn.
fn open_options() -> Options {
    let mut options = Options::default();
    options.set_error_if_exists(false);
    options.create_if_missing(true);
    options.create_missing_column_families(true);

    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get() as i32)
        .unwrap_or(4);
    options.increase_parallelism(num_cpus);
    options.set_max_background_jobs(num_cpus.min(8));

    options
}

/// Per-column-family options built around the shared block cache.
///
/// Index keys are variable length, so no prefix extractor is configured;
/// queries bound their scans by comparing against the encoded prefix instead.
fn cf_options(cache: &Cache, config: &BlockCacheConfig) -> Options {
    let mut opts = Options::default();
    let mut block_opts = rocksdb::BlockBasedOptions::default();

    block_opts.set_block_cache(cache);
    block_opts.set_block_size(config.block_size);
    if config.cache_index_and_filter_blocks {
        block_opts.set_cache_index_and_filter_blocks(true);
    }

    opts.set_block_based_table_factory(&block_opts);
    opts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_create_drop_cycle() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::open(StoreConfig::new(temp_dir.path().join("db"))).unwrap();

        assert!(!store.has_cf("idx"));
        store.create_cf_if_missing("idx").unwrap();
        assert!(store.has_cf("idx"));
        // creating again is a no-op
        store.create_cf_if_missing("idx").unwrap();

        store.drop_cf("idx").unwrap();
        assert!(!store.has_cf("idx"));
        assert!(matches!(
            store.drop_cf("idx"),
            Err(Error::IndexNotFound(_))
        ));
    }

    #[test]
    fn reopen_preserves_tables() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db");

        {
            let store = IndexStore::open(StoreConfig::new(&path)).unwrap();
            store.create_cf_if_missing("kept").unwrap();
        }

        let store = IndexStore::open(StoreConfig::new(&path)).unwrap();
        assert!(store.has_cf("kept"));
        assert_eq!(store.table_names(), vec!["kept".to_string()]);
    }

    #[test]
    fn file_path_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("not_a_dir");
        std::fs::write(&file_path, b"x").unwrap();

        assert!(matches!(
            IndexStore::open(StoreConfig::new(&file_path)),
            Err(Error::InvalidStorePath(_))
        ));
    }
}
