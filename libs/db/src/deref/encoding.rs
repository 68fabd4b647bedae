//! Serialization of deref row payloads.
//!
//! Three payload formats live in the deref tables' data columns:
//!
//! - `"depending"` (forward rows): repeated terminated records, each a
//!   variable-length master record id followed by the fixed 16-byte vtag.
//! - `"fields"` (backward rows): plain concatenation of 16-byte schema ids.
//! - `"pattern"` (backward rows): alternating terminated strings
//!   `name, value, name, value, …` where a value may be the null marker.
//!
//! Deserializers consume until the stream is exhausted and fail with
//! `CorruptEncoding` when it ends mid-field.

use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};
use crate::id::{IdGenerator, SchemaId};
use crate::rowkey;

use super::pattern::VariantPropertiesPattern;
use super::DependingRecord;

/// Serialize depending records for a forward row.
///
/// Only the master portion of each record id is written; variant properties
/// live in the backward rows' patterns.
pub(crate) fn serialize_depending_records<'a>(
    records: impl IntoIterator<Item = &'a DependingRecord>,
) -> Vec<u8> {
    let mut serialized = Vec::new();
    for record in records {
        rowkey::put_var_bytes(&mut serialized, &record.record_id().master().to_bytes());
        rowkey::put_fixed_bytes(&mut serialized, record.vtag().as_bytes());
    }
    serialized
}

pub(crate) fn deserialize_depending_records(
    serialized: &[u8],
    id_generator: &IdGenerator,
) -> Result<HashSet<DependingRecord>> {
    let mut input = serialized;
    let mut result = HashSet::new();
    while !input.is_empty() {
        let master_bytes = rowkey::take_var_bytes(&mut input)?;
        let vtag_bytes = rowkey::take_fixed_bytes(&mut input, SchemaId::SIZE)?;
        result.insert(DependingRecord::new(
            id_generator.record_id_from_bytes(&master_bytes)?,
            id_generator.schema_id_from_bytes(vtag_bytes)?,
        ));
    }
    Ok(result)
}

/// Serialize a field set as `n × 16` bytes. Set order, not preserved.
pub(crate) fn serialize_fields(fields: &HashSet<SchemaId>) -> Vec<u8> {
    let mut serialized = Vec::with_capacity(SchemaId::SIZE * fields.len());
    for field in fields {
        serialized.extend_from_slice(field.as_bytes());
    }
    serialized
}

pub(crate) fn deserialize_fields(
    serialized: &[u8],
    id_generator: &IdGenerator,
) -> Result<HashSet<SchemaId>> {
    if serialized.len() % SchemaId::SIZE != 0 {
        return Err(Error::CorruptEncoding(format!(
            "field set length {} is not a multiple of {}",
            serialized.len(),
            SchemaId::SIZE
        )));
    }
    serialized
        .chunks_exact(SchemaId::SIZE)
        .map(|chunk| id_generator.schema_id_from_bytes(chunk))
        .collect()
}

/// Serialize a variant-properties pattern as alternating terminated strings.
/// Wildcards are written as the null string marker.
pub(crate) fn serialize_variant_properties_pattern(
    pattern: &VariantPropertiesPattern,
) -> Vec<u8> {
    let mut serialized = Vec::new();
    for (name, value) in pattern.entries() {
        rowkey::put_opt_str(&mut serialized, Some(name));
        rowkey::put_opt_str(&mut serialized, value);
    }
    serialized
}

pub(crate) fn deserialize_variant_properties_pattern(
    serialized: &[u8],
) -> Result<VariantPropertiesPattern> {
    let mut input = serialized;
    let mut pattern = BTreeMap::new();
    while !input.is_empty() {
        let name = rowkey::take_opt_str(&mut input)?
            .ok_or_else(|| Error::CorruptEncoding("null pattern name".to_string()))?;
        let value = rowkey::take_opt_str(&mut input)?;
        pattern.insert(name, value);
    }
    Ok(VariantPropertiesPattern::new(pattern))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::id::RecordId;

    fn ids() -> IdGenerator {
        IdGenerator::new()
    }

    fn user_id(name: &str) -> RecordId {
        ids().user_record_id(name).unwrap()
    }

    #[test]
    fn depending_records_round_trip() {
        let id_generator = ids();
        let records = vec![
            DependingRecord::new(user_id("r1"), id_generator.new_schema_id()),
            DependingRecord::new(user_id("r2"), id_generator.new_schema_id()),
            DependingRecord::new(id_generator.uuid_record_id(), id_generator.new_schema_id()),
        ];
        let serialized = serialize_depending_records(&records);
        let deserialized = deserialize_depending_records(&serialized, &id_generator).unwrap();
        let expected: HashSet<DependingRecord> = records.iter().cloned().collect();
        assert_eq!(deserialized, expected);
    }

    #[test]
    fn depending_records_keep_only_masters() {
        let id_generator = ids();
        let master = user_id("doc");
        let variant = id_generator
            .variant_record_id(
                &master,
                [("lang".to_string(), "en".to_string())].into(),
            )
            .unwrap();
        let vtag = id_generator.new_schema_id();
        let records = vec![DependingRecord::new(variant, vtag)];

        let serialized = serialize_depending_records(&records);
        let deserialized = deserialize_depending_records(&serialized, &id_generator).unwrap();
        let expected: HashSet<DependingRecord> =
            [DependingRecord::new(master, vtag)].into_iter().collect();
        assert_eq!(deserialized, expected);
    }

    #[test]
    fn empty_depending_records() {
        let id_generator = ids();
        let serialized = serialize_depending_records(std::iter::empty::<&DependingRecord>());
        assert!(serialized.is_empty());
        assert!(deserialize_depending_records(&serialized, &id_generator)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn truncated_depending_records_are_corrupt() {
        let id_generator = ids();
        let records = vec![DependingRecord::new(user_id("r1"), id_generator.new_schema_id())];
        let serialized = serialize_depending_records(&records);
        let truncated = &serialized[..serialized.len() - 1];
        assert!(matches!(
            deserialize_depending_records(truncated, &id_generator),
            Err(Error::CorruptEncoding(_))
        ));
    }

    #[test]
    fn fields_round_trip_and_length() {
        let id_generator = ids();
        for n in [0usize, 1, 3] {
            let fields: HashSet<SchemaId> =
                (0..n).map(|_| id_generator.new_schema_id()).collect();
            let serialized = serialize_fields(&fields);
            assert_eq!(serialized.len(), SchemaId::SIZE * n);
            assert_eq!(
                deserialize_fields(&serialized, &id_generator).unwrap(),
                fields
            );
        }
    }

    #[test]
    fn ragged_field_set_is_corrupt() {
        let id_generator = ids();
        assert!(matches!(
            deserialize_fields(&[0u8; 17], &id_generator),
            Err(Error::CorruptEncoding(_))
        ));
    }

    #[test]
    fn pattern_round_trip() {
        let pattern = VariantPropertiesPattern::new(
            [
                ("lang".to_string(), Some("en".to_string())),
                ("country".to_string(), None),
                ("edition".to_string(), Some("".to_string())),
            ]
            .into(),
        );
        let serialized = serialize_variant_properties_pattern(&pattern);
        assert_eq!(
            deserialize_variant_properties_pattern(&serialized).unwrap(),
            pattern
        );
    }

    #[test]
    fn empty_pattern_round_trip() {
        let pattern = VariantPropertiesPattern::new(BTreeMap::new());
        let serialized = serialize_variant_properties_pattern(&pattern);
        assert!(serialized.is_empty());
        assert_eq!(
            deserialize_variant_properties_pattern(&serialized).unwrap(),
            pattern
        );
    }

    #[test]
    fn pattern_from_entry_shape_round_trips() {
        let concrete: BTreeMap<String, String> =
            [("lang".to_string(), "en".to_string())].into();
        let widened: BTreeSet<String> = ["country".to_string()].into();
        let pattern = VariantPropertiesPattern::from_properties(&concrete, &widened);
        let serialized = serialize_variant_properties_pattern(&pattern);
        assert_eq!(
            deserialize_variant_properties_pattern(&serialized).unwrap(),
            pattern
        );
    }

    #[test]
    fn truncated_pattern_is_corrupt() {
        let pattern = VariantPropertiesPattern::new(
            [("lang".to_string(), Some("en".to_string()))].into(),
        );
        let serialized = serialize_variant_properties_pattern(&pattern);
        // cut inside the value field
        let truncated = &serialized[..serialized.len() - 1];
        assert!(matches!(
            deserialize_variant_properties_pattern(truncated),
            Err(Error::CorruptEncoding(_))
        ));
    }
}
