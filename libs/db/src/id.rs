//! Record and schema identity.
//!
//! A [`RecordId`] is a master identity — a user-chosen name or a generated
//! UUID — optionally qualified by *variant properties*, an ordered map of
//! named string axes (e.g. `lang=en, country=us`). A [`SchemaId`] is the
//! opaque 16-byte identifier used for field types, record types, and version
//! tags; its text form is the canonical hyphenated UUID.
//!
//! The byte form of a record id is canonical and round-trippable:
//!
//! ```text
//! [kind][master payload][0x1E name 0x1F value]*
//! ```
//!
//! Kind `0x01` is a user id (payload = the name's UTF-8 bytes), kind `0x02` a
//! UUID (payload = 16 raw bytes). Names and values are non-empty and free of
//! control characters, so the separators cannot be forged; property pairs are
//! emitted in map order and a parser rejects unsorted or duplicated names.
//! Every id is at least two bytes long (kind byte plus non-empty payload),
//! which is what lets index keys hold a 2-byte verbatim prefix ahead of the
//! variable encoding.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

const KIND_USER: u8 = 0x01;
const KIND_UUID: u8 = 0x02;
const PROP_SEPARATOR: u8 = 0x1E;
const PROP_ASSIGN: u8 = 0x1F;

// ============================================================================
// SchemaId
// ============================================================================

/// Opaque 16-byte schema identifier derived from a 128-bit UUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaId([u8; 16]);

impl SchemaId {
    /// Size of a schema id in bytes (always 16).
    pub const SIZE: usize = 16;

    /// Derive a schema id from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        SchemaId(*uuid.as_bytes())
    }

    /// Create from raw bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        SchemaId(bytes)
    }

    /// Get the raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaId({})", Uuid::from_bytes(self.0))
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // canonical 8-4-4-4-12 hex form
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

// ============================================================================
// RecordId
// ============================================================================

/// Master identity of a record: a user-chosen name or a generated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
enum Master {
    User(String),
    Uuid([u8; 16]),
}

/// Identity of a record: a master id plus ordered variant properties.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    master: Master,
    variant_properties: BTreeMap<String, String>,
}

impl RecordId {
    /// The master record id: this id with its variant properties stripped.
    pub fn master(&self) -> RecordId {
        RecordId {
            master: self.master.clone(),
            variant_properties: BTreeMap::new(),
        }
    }

    /// Whether this id carries variant properties.
    pub fn is_variant(&self) -> bool {
        !self.variant_properties.is_empty()
    }

    /// The variant properties, ordered by name.
    pub fn variant_properties(&self) -> &BTreeMap<String, String> {
        &self.variant_properties
    }

    /// Canonical byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(24);
        match &self.master {
            Master::User(name) => {
                bytes.push(KIND_USER);
                bytes.extend_from_slice(name.as_bytes());
            }
            Master::Uuid(raw) => {
                bytes.push(KIND_UUID);
                bytes.extend_from_slice(raw);
            }
        }
        for (name, value) in &self.variant_properties {
            bytes.push(PROP_SEPARATOR);
            bytes.extend_from_slice(name.as_bytes());
            bytes.push(PROP_ASSIGN);
            bytes.extend_from_slice(value.as_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<RecordId> {
        let (&kind, rest) = bytes
            .split_first()
            .ok_or_else(|| Error::CorruptEncoding("empty record id".to_string()))?;

        let (master, mut cursor) = match kind {
            KIND_USER => {
                let end = rest
                    .iter()
                    .position(|&b| b == PROP_SEPARATOR)
                    .unwrap_or(rest.len());
                let name = std::str::from_utf8(&rest[..end])
                    .map_err(|e| Error::CorruptEncoding(format!("record id is not utf-8: {e}")))?;
                validate_segment("record id name", name)
                    .map_err(|e| Error::CorruptEncoding(e.to_string()))?;
                (Master::User(name.to_string()), &rest[end..])
            }
            KIND_UUID => {
                if rest.len() < 16 {
                    return Err(Error::CorruptEncoding(format!(
                        "uuid record id needs 16 bytes, got {}",
                        rest.len()
                    )));
                }
                let mut raw = [0u8; 16];
                raw.copy_from_slice(&rest[..16]);
                (Master::Uuid(raw), &rest[16..])
            }
            other => {
                return Err(Error::CorruptEncoding(format!(
                    "unknown record id kind 0x{other:02x}"
                )))
            }
        };

        let mut variant_properties = BTreeMap::new();
        let mut last_name: Option<String> = None;
        while !cursor.is_empty() {
            if cursor[0] != PROP_SEPARATOR {
                return Err(Error::CorruptEncoding(
                    "expected variant property separator".to_string(),
                ));
            }
            cursor = &cursor[1..];
            let assign = cursor
                .iter()
                .position(|&b| b == PROP_ASSIGN)
                .ok_or_else(|| Error::CorruptEncoding("variant property has no value".to_string()))?;
            let name = std::str::from_utf8(&cursor[..assign])
                .map_err(|e| Error::CorruptEncoding(format!("property name is not utf-8: {e}")))?
                .to_string();
            cursor = &cursor[assign + 1..];
            let end = cursor
                .iter()
                .position(|&b| b == PROP_SEPARATOR)
                .unwrap_or(cursor.len());
            let value = std::str::from_utf8(&cursor[..end])
                .map_err(|e| Error::CorruptEncoding(format!("property value is not utf-8: {e}")))?
                .to_string();
            cursor = &cursor[end..];

            validate_segment("property name", &name)
                .and_then(|_| validate_segment("property value", &value))
                .map_err(|e| Error::CorruptEncoding(e.to_string()))?;
            // the byte form is canonical: names strictly ascending
            if let Some(prev) = &last_name {
                if name.as_str() <= prev.as_str() {
                    return Err(Error::CorruptEncoding(format!(
                        "variant properties out of order: {prev:?} before {name:?}"
                    )));
                }
            }
            last_name = Some(name.clone());
            variant_properties.insert(name, value);
        }

        Ok(RecordId {
            master,
            variant_properties,
        })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.master {
            Master::User(name) => write!(f, "USER.{name}")?,
            Master::Uuid(raw) => write!(f, "UUID.{}", Uuid::from_bytes(*raw))?,
        }
        let mut first = true;
        for (name, value) in &self.variant_properties {
            if first {
                write!(f, ".")?;
                first = false;
            } else {
                write!(f, ",")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({self})")
    }
}

fn validate_segment(what: &str, s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::InvalidId(format!("{what} must not be empty")));
    }
    if let Some(c) = s.chars().find(|c| c.is_control()) {
        return Err(Error::InvalidId(format!(
            "{what} contains control character {c:?}"
        )));
    }
    Ok(())
}

// ============================================================================
// IdGenerator
// ============================================================================

/// The id authority: constructs record and schema ids and parses their byte
/// forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn new() -> Self {
        IdGenerator
    }

    /// A record id with a user-chosen name.
    pub fn user_record_id(&self, name: &str) -> Result<RecordId> {
        validate_segment("record id name", name)?;
        Ok(RecordId {
            master: Master::User(name.to_string()),
            variant_properties: BTreeMap::new(),
        })
    }

    /// A freshly generated UUID record id.
    pub fn uuid_record_id(&self) -> RecordId {
        self.uuid_record_id_from(Uuid::new_v4())
    }

    /// A UUID record id from an existing UUID.
    pub fn uuid_record_id_from(&self, uuid: Uuid) -> RecordId {
        RecordId {
            master: Master::Uuid(*uuid.as_bytes()),
            variant_properties: BTreeMap::new(),
        }
    }

    /// A variant of `master` qualified by `properties`.
    ///
    /// Any variant properties already on `master` are discarded; the new id is
    /// built from its master portion.
    pub fn variant_record_id(
        &self,
        master: &RecordId,
        properties: BTreeMap<String, String>,
    ) -> Result<RecordId> {
        for (name, value) in &properties {
            validate_segment("property name", name)?;
            validate_segment("property value", value)?;
        }
        Ok(RecordId {
            master: master.master.clone(),
            variant_properties: properties,
        })
    }

    /// Parse a record id from its canonical byte form.
    pub fn record_id_from_bytes(&self, bytes: &[u8]) -> Result<RecordId> {
        RecordId::from_bytes(bytes)
    }

    /// Parse a schema id from exactly 16 bytes.
    pub fn schema_id_from_bytes(&self, bytes: &[u8]) -> Result<SchemaId> {
        let raw: [u8; 16] = bytes.try_into().map_err(|_| {
            Error::CorruptEncoding(format!(
                "schema id needs {} bytes, got {}",
                SchemaId::SIZE,
                bytes.len()
            ))
        })?;
        Ok(SchemaId(raw))
    }

    /// A freshly generated schema id.
    pub fn new_schema_id(&self) -> SchemaId {
        SchemaId::from_uuid(Uuid::new_v4())
    }
}
