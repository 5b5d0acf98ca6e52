//! Field and table metadata resolution.
//!
//! The compiler never talks to a metadata store directly; it resolves field
//! and table ids through the [`FieldResolver`] trait supplied by the caller.
//! Resolution must look synchronous to the compiler and be safe for
//! concurrent reads - compilation itself never blocks on I/O.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{BaseType, FieldId, SpecialType, TableId};

/// A resolved field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub id: FieldId,
    /// Name of this path segment, without any ancestor prefix.
    pub name: String,
    /// Enclosing document field, for nested paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<FieldId>,
    pub base_type: BaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_type: Option<SpecialType>,
}

impl FieldRecord {
    /// Whether the field can be bucketed by a calendar unit.
    ///
    /// Dates and datetimes qualify, as do numeric fields whose special type
    /// is a UNIX timestamp. Time-of-day fields are temporal but have no
    /// calendar position, so they do not.
    pub fn is_bucketable(&self) -> bool {
        match self.base_type {
            BaseType::Date | BaseType::DateTime => true,
            BaseType::Time => false,
            _ => self.special_type.is_some_and(SpecialType::is_temporal),
        }
    }
}

/// A resolved table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub id: TableId,
    /// Collection name in the document store.
    pub name: String,
}

/// Lookup from metadata ids to records.
///
/// Implementations must be safe for concurrent reads; the records they
/// return are treated as immutable for the duration of a compile.
pub trait FieldResolver: Send + Sync {
    fn field(&self, id: FieldId) -> Option<FieldRecord>;
    fn table(&self, id: TableId) -> Option<TableRecord>;
}

/// In-memory metadata, loadable from JSON.
///
/// This is the reference [`FieldResolver`] implementation, used by the CLI
/// and the test suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StaticMetadataRepr", into = "StaticMetadataRepr")]
pub struct StaticMetadata {
    fields: HashMap<FieldId, FieldRecord>,
    tables: HashMap<TableId, TableRecord>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, id: TableId, name: impl Into<String>) -> Self {
        self.tables.insert(id, TableRecord {
            id,
            name: name.into(),
        });
        self
    }

    pub fn with_field(mut self, field: FieldRecord) -> Self {
        self.fields.insert(field.id, field);
        self
    }
}

impl FieldResolver for StaticMetadata {
    fn field(&self, id: FieldId) -> Option<FieldRecord> {
        self.fields.get(&id).cloned()
    }

    fn table(&self, id: TableId) -> Option<TableRecord> {
        self.tables.get(&id).cloned()
    }
}

/// Serialized form: flat record lists rather than keyed maps.
#[derive(Serialize, Deserialize)]
struct StaticMetadataRepr {
    #[serde(default)]
    fields: Vec<FieldRecord>,
    #[serde(default)]
    tables: Vec<TableRecord>,
}

impl From<StaticMetadataRepr> for StaticMetadata {
    fn from(repr: StaticMetadataRepr) -> Self {
        Self {
            fields: repr.fields.into_iter().map(|f| (f.id, f)).collect(),
            tables: repr.tables.into_iter().map(|t| (t.id, t)).collect(),
        }
    }
}

impl From<StaticMetadata> for StaticMetadataRepr {
    fn from(meta: StaticMetadata) -> Self {
        let mut fields: Vec<_> = meta.fields.into_values().collect();
        let mut tables: Vec<_> = meta.tables.into_values().collect();
        fields.sort_by_key(|f| f.id);
        tables.sort_by_key(|t| t.id);
        Self { fields, tables }
    }
}
