//! Storage-side library of the tessera content repository: record and schema
//! identity, order-preserving secondary indexes over RocksDB, and the
//! dereference dependency map that keeps the search index's derived values
//! re-indexable.
//!
//! ## Module Structure
//!
//! - `id` - Record ids (master + variant properties) and 16-byte schema ids
//! - `rowkey` - Order-preserving key field encodings
//! - `index` - Secondary index tables over RocksDB column families
//! - `deref` - The dereference dependency map built on two index tables
//! - `error` - Error kinds shared across the crate

pub mod deref;
pub mod error;
pub mod id;
pub mod index;
pub mod rowkey;

pub use deref::{
    DependantRecordIdsIterator, DependingRecord, DerefMap, Entry, VariantPropertiesPattern,
};
pub use error::{Error, Result};
pub use id::{IdGenerator, RecordId, SchemaId};
pub use index::{
    BlockCacheConfig, Index, IndexDefinition, IndexEntry, IndexManager, Query, StoreConfig,
};

// ============================================================================
// SystemInfo - Telemetry
// ============================================================================

/// Static configuration info for a deref map instance.
///
/// Implements [`tessera_core::telemetry::SubsystemInfo`] for consistent
/// startup formatting.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Block cache configuration of the backing store.
    pub block_cache_config: BlockCacheConfig,
    /// Names of the open index tables.
    pub tables: Vec<String>,
}

impl tessera_core::telemetry::SubsystemInfo for SystemInfo {
    fn name(&self) -> &'static str {
        "Deref Map (RocksDB)"
    }

    fn info_lines(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "Block Cache Size",
                format_bytes(self.block_cache_config.cache_size_bytes),
            ),
            (
                "Block Size",
                format_bytes(self.block_cache_config.block_size),
            ),
            (
                "Cache Index/Filter",
                self.block_cache_config.cache_index_and_filter_blocks.to_string(),
            ),
            ("Tables", self.tables.join(", ")),
        ]
    }
}

/// Render a byte count with the largest binary unit it fills.
fn format_bytes(bytes: usize) -> String {
    const UNITS: [(usize, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];
    for (scale, unit) in UNITS {
        if bytes >= scale {
            return format!("{} {unit}", bytes / scale);
        }
    }
    format!("{bytes} B")
}

#[cfg(test)]
mod lib_tests {
    use super::*;
    use tessera_core::telemetry::SubsystemInfo;

    #[test]
    fn system_info_lines() {
        let info = SystemInfo {
            block_cache_config: BlockCacheConfig::default(),
            tables: vec!["deref-forward-idx".to_string(), "deref-backward-idx".to_string()],
        };
        assert_eq!(info.name(), "Deref Map (RocksDB)");
        let lines = info.info_lines();
        assert!(lines.iter().any(|(k, v)| *k == "Block Cache Size" && v == "64 MB"));
        assert!(lines
            .iter()
            .any(|(k, v)| *k == "Tables" && v.contains("deref-forward-idx")));
    }

    #[test]
    fn format_bytes_buckets() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(4 * 1024), "4 KB");
        assert_eq!(format_bytes(64 * 1024 * 1024), "64 MB");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2 GB");
    }
}
