//! Logical records.
//!
//! A record is identified by its master file number (mfn), carries an
//! ordered list of fields and remembers where its previous physical
//! version lives. Nothing here touches disk: records reach the master file
//! only through [`MasterStore::write`](crate::master::MasterStore::write).

mod position;
mod tags;

pub use position::{Position, BLOCK_SIZE};
pub use tags::{TagDefinition, TagTable};

use serde::{Deserialize, Serialize};

use crate::errors::{MstError, MstResult};

/// Record status as seen through the cross-reference index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    Active,
    LogicallyDeleted,
    PhysicallyDeleted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::LogicallyDeleted => "logically_deleted",
            RecordStatus::PhysicallyDeleted => "physically_deleted",
        }
    }
}

/// Refinement of [`RecordStatus::Active`], taken from the pointer flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveStatus {
    /// Indexed and unchanged since
    Normal,
    /// Modified since the last index update
    PendingIndexUpdate,
    /// Created since the last index update
    New,
}

/// One tagged field. The content is opaque text; subfield markup is left to
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub tag: u32,
    pub content: String,
}

impl Field {
    pub fn new(tag: u32, content: impl Into<String>) -> Self {
        Self {
            tag,
            content: content.into(),
        }
    }

    /// Builds a field from a symbolic tag name.
    pub fn named(table: &TagTable, name: &str, content: impl Into<String>) -> MstResult<Self> {
        let tag = table
            .resolve(name)
            .ok_or_else(|| MstError::range(format!("unknown tag name '{}'", name)))?;
        Ok(Self::new(tag, content))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// 0 until the record has been written for the first time.
    pub mfn: u32,
    pub status: RecordStatus,
    /// Set on reads of active records; ignored on writes.
    pub active_status: Option<ActiveStatus>,
    pub fields: Vec<Field>,
    /// Physical location of the previous version, or [`Position::NONE`].
    pub back_pointer: Position,
    /// Sign of the stored length word on disk. Informational only.
    pub locked: bool,
}

impl Record {
    /// A fresh record with no mfn assigned.
    pub fn new() -> Self {
        Self {
            mfn: 0,
            status: RecordStatus::Active,
            active_status: None,
            fields: Vec::new(),
            back_pointer: Position::NONE,
            locked: false,
        }
    }

    /// A record that should land at a specific mfn.
    pub fn with_mfn(mfn: u32) -> Self {
        Self {
            mfn,
            ..Self::new()
        }
    }

    /// Minimal stand-in returned for numbers that only have a tombstone.
    pub fn placeholder(mfn: u32, status: RecordStatus) -> Self {
        Self {
            mfn,
            status,
            ..Self::new()
        }
    }

    pub fn add_field(&mut self, tag: u32, content: impl Into<String>) -> &mut Self {
        self.fields.push(Field::new(tag, content));
        self
    }

    /// Builder-style variant of [`add_field`](Self::add_field).
    pub fn field_with(mut self, tag: u32, content: impl Into<String>) -> Self {
        self.fields.push(Field::new(tag, content));
        self
    }

    /// Content of the first occurrence of `tag`.
    pub fn field(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.content.as_str())
    }

    pub fn fields_with_tag(&self, tag: u32) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(move |f| f.tag == tag)
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_unassigned_and_active() {
        let record = Record::new();
        assert_eq!(record.mfn, 0);
        assert!(record.is_active());
        assert!(record.back_pointer.is_none());
    }

    #[test]
    fn test_field_lookup_returns_first_occurrence() {
        let record = Record::new()
            .field_with(70, "Smith, J.")
            .field_with(24, "A title")
            .field_with(70, "Doe, A.");
        assert_eq!(record.field(70), Some("Smith, J."));
        assert_eq!(record.fields_with_tag(70).count(), 2);
        assert_eq!(record.field(99), None);
    }

    #[test]
    fn test_named_field() {
        let mut table = TagTable::new();
        table.insert(24, "title", "").unwrap();
        let field = Field::named(&table, "title", "Hello").unwrap();
        assert_eq!(field.tag, 24);
        assert!(Field::named(&table, "nope", "x").is_err());
    }
}
