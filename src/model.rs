use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SyncError};

/// Identifier of a content record (product, appointment, staff, order...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for RecordId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(RecordId)
            .map_err(|_| SyncError::NotFound(format!("'{}' is not a record id", s)))
    }
}

/// Identifier of a row in a linked-record table
pub type RowId = u64;

/// A language slug as used by the translation registry ("en", "fr", "pt-br")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Language(String);

impl Language {
    const MAX_LEN: usize = 16;

    pub fn parse(slug: &str) -> Result<Self> {
        let valid = !slug.is_empty()
            && slug.len() <= Self::MAX_LEN
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

        if valid {
            Ok(Self(slug.to_string()))
        } else {
            Err(SyncError::InvalidLanguage(slug.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Language {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Language::parse(&value)
    }
}

impl From<Language> for String {
    fn from(lang: Language) -> Self {
        lang.0
    }
}

/// Content kind of a record ("product", "wc_appointment", "shop_order"...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKind(pub String);

impl RecordKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: RecordId,
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RecordId>,
}

/// Sibling records of one logical entity, one per language
pub type TranslationGroup = BTreeMap<Language, RecordId>;

/// A stored metadata value
pub type MetaValue = Value;

/// Full metadata of one owner, values in insertion order per key
pub type MetaMap = BTreeMap<String, Vec<MetaValue>>;

/// Interpret a metadata value as a record reference.
///
/// Accepts non-negative integers and strings holding one.
pub fn as_record_id(value: &MetaValue) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_u64().map(RecordId),
        Value::String(s) => s.trim().parse::<u64>().ok().map(RecordId),
        _ => None,
    }
}

/// Build a value referencing `id` with the same representation as `like`.
pub fn reference_like(like: &MetaValue, id: RecordId) -> MetaValue {
    match like {
        Value::String(_) => Value::String(id.to_string()),
        _ => Value::from(id.0),
    }
}

/// Whether a value counts as "no value" for interception purposes.
pub fn is_empty_value(value: &MetaValue) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Tables of rows owned by a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkedTable {
    /// Product to staff (provider) relationships
    Relationships,
    /// Availability rules of the product
    Availability,
}

impl fmt::Display for LinkedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkedTable::Relationships => f.write_str("relationships"),
            LinkedTable::Availability => f.write_str("availability"),
        }
    }
}

impl FromStr for LinkedTable {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "relationships" | "providers" => Ok(LinkedTable::Relationships),
            "availability" | "availabilities" => Ok(LinkedTable::Availability),
            _ => Err(SyncError::Config(format!(
                "Invalid table '{}'. Valid tables: relationships, availability",
                s
            ))),
        }
    }
}

/// Identity of a linked row independent of its parent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(pub String);

impl NaturalKey {
    pub fn staff(staff_id: RecordId) -> Self {
        Self(format!("staff:{}", staff_id))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One availability rule attached to a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub kind: String,
    pub range_type: String,
    #[serde(default)]
    pub from_range: String,
    #[serde(default)]
    pub to_range: String,
    #[serde(default)]
    pub appointable: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub qty: i64,
}

impl AvailabilityRule {
    /// Canonical form of the defining fields, used as the natural key.
    pub fn signature(&self) -> String {
        // Field order of a derived Serialize is fixed, so the JSON is canonical.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    pub parent_id: RecordId,
    pub natural_key: NaturalKey,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl LinkedRecord {
    pub fn relationship(parent_id: RecordId, staff_id: RecordId, sort_order: i64) -> Self {
        let mut payload = Map::new();
        payload.insert("staff_id".to_string(), Value::from(staff_id.0));

        Self {
            id: None,
            parent_id,
            natural_key: NaturalKey::staff(staff_id),
            sort_order,
            payload,
        }
    }

    pub fn availability(parent_id: RecordId, rule: &AvailabilityRule, ordering: i64) -> Self {
        let payload = match serde_json::to_value(rule) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        Self {
            id: None,
            parent_id,
            natural_key: NaturalKey(rule.signature()),
            sort_order: ordering,
            payload,
        }
    }

    /// Fields a reconciliation may overwrite on an existing row
    pub fn mutable_fields(&self) -> RowUpdate {
        RowUpdate {
            sort_order: self.sort_order,
            payload: self.payload.clone(),
        }
    }
}

/// Mutable part of a linked row
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub sort_order: i64,
    pub payload: Map<String, Value>,
}
