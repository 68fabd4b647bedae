//! The dereference dependency map.
//!
//! Index field definitions may compute their value by *dereferencing* links:
//! following a link field on the indexed record to another record and reading
//! a field there. When the linked-to record changes, every record whose
//! indexed value was computed through it has to be re-indexed. The deref map
//! is the durable bookkeeping that makes the reverse question answerable:
//! given a record that just changed, which dependant records must be
//! re-indexed, and through which field did they depend on it?
//!
//! Two index tables back each named deref map:
//!
//! - **Forward**: one row per `(dependant record, vtag)` listing the master
//!   ids and vtags it depends on. Read back at update time to diff old
//!   against new.
//! - **Backward**: one row per `(depending master, vtag, dependant)` carrying
//!   the fields through which the dependant depends on it and a
//!   variant-properties pattern selecting which variants of the depending
//!   record are covered.
//!
//! ## Module Structure
//!
//! - `mod.rs` - [`DerefMap`], update and query protocols, the dependant cursor
//! - `pattern.rs` - [`VariantPropertiesPattern`]
//! - `encoding.rs` - row payload serialization
//!
//! ## Write ordering
//!
//! `update_dependencies` issues its writes in a fixed order: backward
//! deletions, then the forward overwrite, then backward additions. The two
//! tables are never covered by one transaction; the ordering alone guarantees
//! that whatever prefix of the sequence survives a crash, the backward index
//! never points at a dependency the forward index cannot account for. A
//! re-run of the same update converges to the correct state.
//!
//! ## Concurrency
//!
//! Calls are synchronous and may block on store I/O. Concurrent updates for
//! *different* `(dependant, vtag)` pairs are safe. Concurrent updates for the
//! same pair race on the read-diff-write of the forward row and can lose
//! dependencies; the caller must serialize them (the indexer holds a
//! per-record lock).

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::id::{IdGenerator, RecordId, SchemaId};
use crate::index::{Index, IndexDefinition, IndexEntry, IndexManager, Query, QueryResult};

mod encoding;
mod pattern;

pub use pattern::VariantPropertiesPattern;


/// Forward row column holding the serialized depending records.
const DEPENDING_RECORDS_COLUMN: &str = "depending";
/// Backward row column holding the serialized field set.
const FIELDS_COLUMN: &str = "fields";
/// Backward row column holding the serialized variant-properties pattern.
const VARIANT_PROPERTIES_PATTERN_COLUMN: &str = "pattern";

/// Forward rows are keyed entirely by their fields; the identifier slot is
/// filled with a fixed dummy byte.
const DUMMY_IDENTIFIER: &[u8] = &[0];

fn forward_index_name(index_name: &str) -> String {
    format!("deref-forward-{index_name}")
}

fn backward_index_name(index_name: &str) -> String {
    format!("deref-backward-{index_name}")
}

// ============================================================================
// Value types
// ============================================================================

/// A record being depended on, under a specific version tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependingRecord {
    record_id: RecordId,
    vtag: SchemaId,
}

impl DependingRecord {
    pub fn new(record_id: RecordId, vtag: SchemaId) -> Self {
        DependingRecord { record_id, vtag }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    pub fn vtag(&self) -> &SchemaId {
        &self.vtag
    }

    /// The same dependency at master granularity, the unit at which forward
    /// rows store it and backward rows are keyed.
    fn to_master(&self) -> DependingRecord {
        DependingRecord {
            record_id: self.record_id.master(),
            vtag: self.vtag,
        }
    }
}

/// One dependency declared by a dependant: the depending record plus the
/// names of *additional* variant dimensions beyond those on the depending
/// record's id.
///
/// The extra names widen the backward row's pattern: the dependant depends on
/// any record that has the depending record's concrete dimensions plus these
/// dimensions with any value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    depending_record: DependingRecord,
    more_dimensioned_variants: BTreeSet<String>,
}

impl Entry {
    pub fn new(depending_record: DependingRecord) -> Self {
        Entry {
            depending_record,
            more_dimensioned_variants: BTreeSet::new(),
        }
    }

    pub fn with_more_dimensioned_variants(
        mut self,
        more_dimensioned_variants: BTreeSet<String>,
    ) -> Self {
        self.more_dimensioned_variants = more_dimensioned_variants;
        self
    }

    pub fn depending_record(&self) -> &DependingRecord {
        &self.depending_record
    }

    pub fn more_dimensioned_variants(&self) -> &BTreeSet<String> {
        &self.more_dimensioned_variants
    }
}

// ============================================================================
// DerefMap
// ============================================================================

/// The dereference dependency map for one named search index.
pub struct DerefMap {
    forward_index: Index,
    backward_index: Index,
    id_generator: IdGenerator,
}

impl DerefMap {
    /// Open the deref map for a given index, creating the forward and
    /// backward tables on first use.
    pub fn create(
        index_name: &str,
        manager: &IndexManager,
        id_generator: IdGenerator,
    ) -> Result<DerefMap> {
        // For the record id we use a variable-length byte field whose first
        // two bytes are fixed. The first byte is the record id type byte; the
        // second is the first byte of the identifier proper (present because
        // an id payload is never empty). Keeping both out of the variable
        // encoder leaves them unescaped in the key head, so store-side range
        // splits can be configured against the original input.
        let mut forward_def = IndexDefinition::new(forward_index_name(index_name));
        forward_def.add_var_bytes_field("dependant_recordid", 2);
        forward_def.add_fixed_bytes_field("dependant_vtag", SchemaId::SIZE);
        let forward_index = manager.get_index(forward_def)?;

        let mut backward_def = IndexDefinition::new(backward_index_name(index_name));
        backward_def.add_var_bytes_field("depending_masterrecordid", 2);
        backward_def.add_fixed_bytes_field("depending_vtag", SchemaId::SIZE);
        let backward_index = manager.get_index(backward_def)?;

        Ok(DerefMap {
            forward_index,
            backward_index,
            id_generator,
        })
    }

    /// Drop both tables of a deref map.
    ///
    /// Fails with [`Error::IndexNotFound`] when either table is absent.
    pub fn delete(index_name: &str, manager: &IndexManager) -> Result<()> {
        let forward = forward_index_name(index_name);
        let backward = backward_index_name(index_name);
        for name in [&forward, &backward] {
            if !manager.has_index(name) {
                return Err(Error::IndexNotFound(name.clone()));
            }
        }
        manager.delete_index(&forward)?;
        manager.delete_index(&backward)
    }

    /// Replace the dependency set of `(dependant, vtag)` with
    /// `new_dependencies`, a map from each dependency entry to the fields on
    /// the depending record through which the dependant depends on it.
    ///
    /// Concurrent calls for the same `(dependant, vtag)` pair must be
    /// serialized by the caller.
    #[tracing::instrument(
        skip(self, new_dependencies),
        fields(
            dependant = %dependant_record_id,
            vtag = %dependant_vtag,
            dependencies = new_dependencies.len(),
        )
    )]
    pub fn update_dependencies(
        &self,
        dependant_record_id: &RecordId,
        dependant_vtag: &SchemaId,
        new_dependencies: &HashMap<Entry, HashSet<SchemaId>>,
    ) -> Result<()> {
        let existing = self.find_dependencies(dependant_record_id, dependant_vtag)?;

        // Key the new dependencies at master granularity. When several
        // entries share a depending record, one of them represents it in the
        // backward row.
        let mut new_by_master: HashMap<DependingRecord, &Entry> = HashMap::new();
        for entry in new_dependencies.keys() {
            new_by_master
                .entry(entry.depending_record().to_master())
                .or_insert(entry);
        }

        // The order in which changes are applied is not arbitrary: if the
        // process fails in between, no state may remain in the backward index
        // that cannot be found via the forward index.

        // delete removed from the backward index
        let mut removed = 0usize;
        for existing_record in &existing {
            if new_by_master.contains_key(existing_record) {
                continue;
            }
            let backward_entry =
                self.backward_entry(existing_record, dependant_record_id, None, None);
            self.backward_index.remove_entry(&backward_entry)?;
            removed += 1;
        }

        // update the forward index (removals and additions land together, it
        // is a single row)
        let forward_entry =
            self.forward_entry(dependant_record_id, dependant_vtag, new_by_master.keys());
        self.forward_index.add_entry(&forward_entry)?;

        // add added to the backward index
        let mut added = 0usize;
        for (master, entry) in &new_by_master {
            if existing.contains(master) {
                continue;
            }
            let fields = &new_dependencies[*entry];
            let pattern = VariantPropertiesPattern::from_properties(
                entry.depending_record().record_id().variant_properties(),
                entry.more_dimensioned_variants(),
            );
            let backward_entry =
                self.backward_entry(master, dependant_record_id, Some(fields), Some(&pattern));
            self.backward_index.add_entry(&backward_entry)?;
            added += 1;
        }

        tracing::debug!(removed, added, "Updated dependencies");
        Ok(())
    }

    fn forward_entry<'a>(
        &self,
        dependant_record_id: &RecordId,
        dependant_vtag: &SchemaId,
        depending_records: impl IntoIterator<Item = &'a DependingRecord>,
    ) -> IndexEntry {
        let mut entry = IndexEntry::new();
        entry.set_field("dependant_recordid", dependant_record_id.to_bytes());
        entry.set_field("dependant_vtag", dependant_vtag.as_bytes().to_vec());

        // the identifier is not used; all we are interested in is the data
        entry.set_identifier(DUMMY_IDENTIFIER.to_vec());

        entry.add_data(
            DEPENDING_RECORDS_COLUMN,
            encoding::serialize_depending_records(depending_records),
        );
        entry
    }

    /// Build a backward entry. Data columns are omitted when the entry is
    /// built for removal.
    fn backward_entry(
        &self,
        depending_master: &DependingRecord,
        dependant_record_id: &RecordId,
        fields: Option<&HashSet<SchemaId>>,
        pattern: Option<&VariantPropertiesPattern>,
    ) -> IndexEntry {
        let mut entry = IndexEntry::new();
        entry.set_field(
            "depending_masterrecordid",
            depending_master.record_id().master().to_bytes(),
        );
        entry.set_field(
            "depending_vtag",
            depending_master.vtag().as_bytes().to_vec(),
        );

        // the identifier is the dependant which depends on the depending record
        entry.set_identifier(dependant_record_id.to_bytes());

        if let Some(fields) = fields {
            entry.add_data(FIELDS_COLUMN, encoding::serialize_fields(fields));
        }
        if let Some(pattern) = pattern {
            entry.add_data(
                VARIANT_PROPERTIES_PATTERN_COLUMN,
                encoding::serialize_variant_properties_pattern(pattern),
            );
        }
        entry
    }

    /// The set of `(master record id, vtag)` pairs the given record depends
    /// on, read from its forward row. A missing row and a row with an empty
    /// list are equivalent.
    pub(crate) fn find_dependencies(
        &self,
        record_id: &RecordId,
        vtag: &SchemaId,
    ) -> Result<HashSet<DependingRecord>> {
        let mut query = Query::new();
        query.add_equals_condition("dependant_recordid", record_id.to_bytes());
        query.add_equals_condition("dependant_vtag", vtag.as_bytes().to_vec());

        let mut query_result = self.forward_index.perform_query(&query)?;
        let result = match query_result.next_row()? {
            Some(row) => {
                let serialized = row.data(DEPENDING_RECORDS_COLUMN).ok_or_else(|| {
                    Error::CorruptEncoding(format!(
                        "forward row without {DEPENDING_RECORDS_COLUMN:?} column"
                    ))
                })?;
                let depending =
                    encoding::deserialize_depending_records(serialized, &self.id_generator)?;

                if query_result.next_row()?.is_some() {
                    return Err(Error::InvariantViolation(format!(
                        "expected at most one matching row in {}",
                        self.forward_index.definition().name()
                    )));
                }
                depending
            }
            None => HashSet::new(),
        };
        Ok(result)
    }

    /// Stream the record ids of all dependants that depend on
    /// `depending_record` via `field`, in key order.
    ///
    /// The cursor borrows the map; dropping it releases the backend query.
    pub fn find_dependants_of(
        &self,
        depending_record: &DependingRecord,
        field: &SchemaId,
    ) -> Result<DependantRecordIdsIterator<'_>> {
        let master = depending_record.record_id().master();

        let mut query = Query::new();
        query.add_equals_condition("depending_masterrecordid", master.to_bytes());
        query.add_equals_condition(
            "depending_vtag",
            depending_record.vtag().as_bytes().to_vec(),
        );

        let query_result = self.backward_index.perform_query(&query)?;
        Ok(DependantRecordIdsIterator {
            query_result,
            depending_record_id: depending_record.record_id().clone(),
            queried_field: *field,
            id_generator: self.id_generator,
            next: None,
        })
    }

    /// Diagnostic info for startup reporting.
    pub fn system_info(&self) -> crate::SystemInfo {
        let config = self.forward_index.store_config();
        crate::SystemInfo {
            block_cache_config: config.block_cache.clone(),
            tables: vec![
                self.forward_index.definition().name().to_string(),
                self.backward_index.definition().name().to_string(),
            ],
        }
    }
}

// ============================================================================
// DependantRecordIdsIterator
// ============================================================================

/// Forward-only cursor over the dependants of a record.
///
/// `has_next` and `next` share a single stored slot: either populates it from
/// the underlying query, and `next` consumes it. Advancement is exclusive
/// through `&mut self`; the cursor is single-pass and not restartable.
pub struct DependantRecordIdsIterator<'a> {
    query_result: QueryResult<'a>,
    depending_record_id: RecordId,
    queried_field: SchemaId,
    id_generator: IdGenerator,
    next: Option<RecordId>,
}

impl DependantRecordIdsIterator<'_> {
    fn fetch_next(&mut self) -> Result<Option<RecordId>> {
        while let Some(row) = self.query_result.next_row()? {
            // the identifier is the record id of the record that depends on
            // the queried record, but it only qualifies if the dependency is
            // via the queried field AND the variant properties match
            let fields_bytes = row.data(FIELDS_COLUMN).ok_or_else(|| {
                Error::CorruptEncoding(format!("backward row without {FIELDS_COLUMN:?} column"))
            })?;
            let depending_fields =
                encoding::deserialize_fields(fields_bytes, &self.id_generator)?;

            let pattern_bytes = row.data(VARIANT_PROPERTIES_PATTERN_COLUMN).ok_or_else(|| {
                Error::CorruptEncoding(format!(
                    "backward row without {VARIANT_PROPERTIES_PATTERN_COLUMN:?} column"
                ))
            })?;
            let pattern = encoding::deserialize_variant_properties_pattern(pattern_bytes)?;

            if depending_fields.contains(&self.queried_field)
                && pattern.matches(self.depending_record_id.variant_properties())
            {
                return Ok(Some(self.id_generator.record_id_from_bytes(row.identifier())?));
            }
        }
        Ok(None)
    }

    /// Whether another dependant is available.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.next.is_none() {
            self.next = self.fetch_next()?;
        }
        Ok(self.next.is_some())
    }

    /// The next dependant record id, or `None` when exhausted.
    pub fn next(&mut self) -> Result<Option<RecordId>> {
        if let Some(next) = self.next.take() {
            return Ok(Some(next));
        }
        self.fetch_next()
    }
}
