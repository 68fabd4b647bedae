//! Index definitions: the ordered field list of an index and its key encoding.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::rowkey;

/// How a field is laid out inside the composite key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFieldKind {
    /// Exactly `len` bytes, stored verbatim.
    FixedBytes { len: usize },
    /// Variable-length bytes whose first `fixed_prefix` bytes are stored
    /// verbatim ahead of the terminated remainder.
    VarBytes { fixed_prefix: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct IndexField {
    pub(crate) name: String,
    pub(crate) kind: IndexFieldKind,
}

/// Definition of an index: its table name and ordered key fields.
///
/// Field order is key order; an equality query must cover a leading run of
/// the fields.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    name: String,
    fields: Vec<IndexField>,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        IndexDefinition {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a fixed-length byte field.
    pub fn add_fixed_bytes_field(&mut self, name: impl Into<String>, len: usize) -> &mut Self {
        self.fields.push(IndexField {
            name: name.into(),
            kind: IndexFieldKind::FixedBytes { len },
        });
        self
    }

    /// Append a variable-length byte field with a `fixed_prefix`-byte verbatim
    /// head.
    pub fn add_var_bytes_field(&mut self, name: impl Into<String>, fixed_prefix: usize) -> &mut Self {
        self.fields.push(IndexField {
            name: name.into(),
            kind: IndexFieldKind::VarBytes { fixed_prefix },
        });
        self
    }

    /// The index (and column family) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn encode_field(&self, field: &IndexField, value: &[u8], key: &mut Vec<u8>) -> Result<()> {
        match field.kind {
            IndexFieldKind::FixedBytes { len } => {
                if value.len() != len {
                    return Err(Error::Encoding(format!(
                        "field {:?} of {} needs exactly {len} bytes, got {}",
                        field.name,
                        self.name,
                        value.len()
                    )));
                }
                rowkey::put_fixed_bytes(key, value);
                Ok(())
            }
            IndexFieldKind::VarBytes { fixed_prefix } => {
                rowkey::put_var_bytes_with_prefix(key, value, fixed_prefix)
            }
        }
    }

    /// Encode all fields of an entry, in definition order, into key bytes.
    pub(crate) fn encode_entry_fields(&self, values: &HashMap<String, Vec<u8>>) -> Result<Vec<u8>> {
        let mut key = Vec::new();
        for field in &self.fields {
            let value = values.get(&field.name).ok_or_else(|| {
                Error::Encoding(format!("entry is missing field {:?} of {}", field.name, self.name))
            })?;
            self.encode_field(field, value, &mut key)?;
        }
        if values.len() != self.fields.len() {
            return Err(Error::Encoding(format!(
                "entry sets {} fields, {} defines {}",
                values.len(),
                self.name,
                self.fields.len()
            )));
        }
        Ok(key)
    }

    /// Encode equality conditions into a key prefix.
    ///
    /// Conditions must cover a leading run of the fields; a condition on a
    /// field after a gap cannot be expressed as a key prefix.
    pub(crate) fn encode_query_prefix(&self, conditions: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
        let by_name: HashMap<&str, &[u8]> = conditions
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_slice()))
            .collect();
        if by_name.len() != conditions.len() {
            return Err(Error::Encoding(format!(
                "duplicate equality condition in query on {}",
                self.name
            )));
        }

        let mut key = Vec::new();
        let mut consumed = 0;
        for field in &self.fields {
            match by_name.get(field.name.as_str()) {
                Some(value) => {
                    self.encode_field(field, value, &mut key)?;
                    consumed += 1;
                }
                None => break,
            }
        }
        if consumed != conditions.len() {
            return Err(Error::Encoding(format!(
                "equality conditions must cover a prefix of the fields of {}",
                self.name
            )));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> IndexDefinition {
        let mut def = IndexDefinition::new("test-index");
        def.add_var_bytes_field("record", 2);
        def.add_fixed_bytes_field("vtag", 4);
        def
    }

    fn values(pairs: &[(&str, &[u8])]) -> HashMap<String, Vec<u8>> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_vec()))
            .collect()
    }

    #[test]
    fn encodes_fields_in_definition_order() {
        let def = definition();
        let key = def
            .encode_entry_fields(&values(&[("vtag", &[9, 9, 9, 9]), ("record", b"abc")]))
            .unwrap();
        // 2 raw bytes + terminated "c" + 4 vtag bytes
        assert_eq!(key, vec![b'a', b'b', b'c', 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn missing_field_is_an_error() {
        let def = definition();
        assert!(matches!(
            def.encode_entry_fields(&values(&[("record", b"abc")])),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let def = definition();
        let result = def.encode_entry_fields(&values(&[
            ("record", b"abc"),
            ("vtag", &[1, 2, 3, 4]),
            ("extra", b"x"),
        ]));
        assert!(matches!(result, Err(Error::Encoding(_))));
    }

    #[test]
    fn fixed_length_is_enforced() {
        let def = definition();
        assert!(matches!(
            def.encode_entry_fields(&values(&[("record", b"abc"), ("vtag", &[1, 2])])),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn query_prefix_on_first_field() {
        let def = definition();
        let prefix = def
            .encode_query_prefix(&[("record".to_string(), b"abc".to_vec())])
            .unwrap();
        assert_eq!(prefix, vec![b'a', b'b', b'c', 0, 0]);
    }

    #[test]
    fn query_prefix_with_gap_is_an_error() {
        let def = definition();
        assert!(matches!(
            def.encode_query_prefix(&[("vtag".to_string(), vec![1, 2, 3, 4])]),
            Err(Error::Encoding(_))
        ));
    }
}
