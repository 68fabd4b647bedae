//! Structural wildcard matching over variant-property maps.

use std::collections::{BTreeMap, BTreeSet};

/// A pattern over variant properties. A `None` value means "any value";
/// everything else must match exactly.
///
/// A pattern only matches maps with exactly its own name set: a dependant
/// that depends on `lang=en` does not depend on `lang=en, country=us` (that
/// is a different record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPropertiesPattern {
    pattern: BTreeMap<String, Option<String>>,
}

impl VariantPropertiesPattern {
    pub fn new(pattern: BTreeMap<String, Option<String>>) -> Self {
        VariantPropertiesPattern { pattern }
    }

    /// Build a pattern from concrete properties plus names widened to "any".
    ///
    /// A widened name that is also concrete loses its value: the dependant
    /// declared the dimension variable, so the concrete value no longer pins
    /// it.
    pub fn from_properties(
        props_with_value: &BTreeMap<String, String>,
        props_without_value: &BTreeSet<String>,
    ) -> Self {
        let mut pattern: BTreeMap<String, Option<String>> = props_with_value
            .iter()
            .map(|(name, value)| (name.clone(), Some(value.clone())))
            .collect();
        for name in props_without_value {
            pattern.insert(name.clone(), None);
        }
        VariantPropertiesPattern { pattern }
    }

    /// Whether a concrete variant-property map matches this pattern.
    pub fn matches(&self, variant_properties: &BTreeMap<String, String>) -> bool {
        if variant_properties.len() != self.pattern.len() {
            return false;
        }
        for (name, value) in variant_properties {
            match self.pattern.get(name) {
                None => return false,
                Some(None) => {}
                Some(Some(pattern_value)) => {
                    if pattern_value != value {
                        return false;
                    }
                }
            }
        }
        true
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.pattern
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}
