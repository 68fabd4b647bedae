//! Index entries and queries.

use std::collections::{BTreeMap, HashMap};

/// A row to add to or remove from an index.
///
/// Field values make up the key (in definition order), the identifier
/// discriminates rows sharing the same field values, and the data map holds
/// the row's payload columns. Data may be left empty when building an entry
/// for removal.
#[derive(Debug, Clone, Default)]
pub struct IndexEntry {
    fields: HashMap<String, Vec<u8>>,
    identifier: Vec<u8>,
    data: BTreeMap<String, Vec<u8>>,
}

impl IndexEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key field value. Validated against the definition when the entry
    /// is applied.
    pub fn set_field(&mut self, name: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Set the row identifier.
    pub fn set_identifier(&mut self, identifier: Vec<u8>) -> &mut Self {
        self.identifier = identifier;
        self
    }

    /// Add a payload column.
    pub fn add_data(&mut self, column: impl Into<String>, payload: Vec<u8>) -> &mut Self {
        self.data.insert(column.into(), payload);
        self
    }

    pub(crate) fn fields(&self) -> &HashMap<String, Vec<u8>> {
        &self.fields
    }

    pub(crate) fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    pub(crate) fn data(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.data
    }
}

/// An equality query over a leading run of an index's fields.
#[derive(Debug, Clone, Default)]
pub struct Query {
    conditions: Vec<(String, Vec<u8>)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_equals_condition(&mut self, field: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.conditions.push((field.into(), value));
        self
    }

    pub(crate) fn conditions(&self) -> &[(String, Vec<u8>)] {
        &self.conditions
    }
}
