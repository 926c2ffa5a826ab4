//! Records and read results.

use crate::ids::{RecordId, Revision};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// JSON key of the id marker.
pub const ID_MARKER: &str = "$id";

/// JSON key of the revision marker.
pub const REVISION_MARKER: &str = "$revision";

/// A record as exchanged with the backing store.
///
/// The `$id` and `$revision` markers are only populated from data the store
/// returned (a read, or the result of a create/update). Callers never supply
/// them for a record that has not been persisted yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Id marker, populated by the store.
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    /// Revision marker, populated by the store.
    #[serde(rename = "$revision", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    /// Field values keyed by field code.
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Record {
    /// Creates an empty record with no markers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record as returned by the store.
    pub fn persisted(id: impl Into<RecordId>, revision: impl Into<Revision>) -> Self {
        Self {
            id: Some(id.into()),
            revision: Some(revision.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field value.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Sets a field value, returning the previous one.
    pub fn set_field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Returns a copy without the given field.
    #[must_use]
    pub fn without_field(&self, name: &str) -> Self {
        let mut copy = self.clone();
        copy.fields.remove(name);
        copy
    }

    /// Returns a copy carrying the given markers.
    #[must_use]
    pub fn with_markers(mut self, id: RecordId, revision: Revision) -> Self {
        self.id = Some(id);
        self.revision = Some(revision);
        self
    }

    /// Returns a copy carrying only the listed fields.
    ///
    /// Markers survive only when listed as `$id` / `$revision`.
    #[must_use]
    pub fn project(&self, fields: &[String]) -> Self {
        let wants = |name: &str| fields.iter().any(|f| f == name);
        Self {
            id: self.id.clone().filter(|_| wants(ID_MARKER)),
            revision: self.revision.clone().filter(|_| wants(REVISION_MARKER)),
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| wants(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// Overwrites this record's fields with those of `other`.
    ///
    /// Fields absent from `other` are kept; markers are left untouched.
    pub fn merge_fields(&mut self, other: &Record) {
        for (name, value) in &other.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// Returns true if the field holds the given value.
    #[must_use]
    pub fn field_equals(&self, name: &str, value: &serde_json::Value) -> bool {
        self.fields.get(name) == Some(value)
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created {
    /// Assigned record id.
    pub id: RecordId,
    /// Initial revision.
    pub revision: Revision,
}

/// Result of a multi-record read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    /// Records in store order, possibly field-projected.
    pub records: Vec<Record>,
    /// Total number of matches, when it was requested.
    #[serde(rename = "totalCount", default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl RecordPage {
    /// Creates a page without a total count.
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            total_count: None,
        }
    }

    /// Sets the total count.
    #[must_use]
    pub fn with_total_count(mut self, total: u64) -> Self {
        self.total_count = Some(total);
        self
    }
}
