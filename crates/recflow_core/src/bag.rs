//! Named results threaded through a program.

use recflow_protocol::{Record, RecordPage};
use serde_json::Value;

/// The value stored under one tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Result of a point read, create or update. `None` when absent.
    Record(Option<Record>),
    /// Result of a multi-record read.
    Page(RecordPage),
    /// Result of a caller computation.
    Value(Value),
}

impl Slot {
    /// Returns the record, if this slot holds one.
    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Slot::Record(record) => record.as_ref(),
            _ => None,
        }
    }

    /// Returns the page, if this slot holds one.
    #[must_use]
    pub fn as_page(&self) -> Option<&RecordPage> {
        match self {
            Slot::Page(page) => Some(page),
            _ => None,
        }
    }

    /// Returns the computed value, if this slot holds one.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Slot::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Converts into the record, if this slot holds one.
    #[must_use]
    pub fn into_record(self) -> Option<Record> {
        match self {
            Slot::Record(record) => record,
            _ => None,
        }
    }

    /// Converts into the page, if this slot holds one.
    #[must_use]
    pub fn into_page(self) -> Option<RecordPage> {
        match self {
            Slot::Page(page) => Some(page),
            _ => None,
        }
    }

    /// Returns true for an absent record or a null value.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Slot::Record(None) | Slot::Value(Value::Null))
    }
}

impl From<Option<Record>> for Slot {
    fn from(record: Option<Record>) -> Self {
        Slot::Record(record)
    }
}

impl From<Record> for Slot {
    fn from(record: Record) -> Self {
        Slot::Record(Some(record))
    }
}

impl From<RecordPage> for Slot {
    fn from(page: RecordPage) -> Self {
        Slot::Page(page)
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::Value(value)
    }
}

/// Insertion-ordered mapping from tag to result.
///
/// Tags are only added, except that re-inserting an existing tag replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bag {
    entries: Vec<(String, Slot)>,
}

impl Bag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a tag, returning the previous value.
    pub fn insert(&mut self, tag: impl Into<String>, slot: Slot) -> Option<Slot> {
        let tag = tag.into();
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, existing)) => Some(std::mem::replace(existing, slot)),
            None => {
                self.entries.push((tag, slot));
                None
            }
        }
    }

    /// Returns the value under a tag.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&Slot> {
        self.entries.iter().find(|(t, _)| t == tag).map(|(_, s)| s)
    }

    /// Returns the record under a tag, if present and not absent.
    #[must_use]
    pub fn record(&self, tag: &str) -> Option<&Record> {
        self.get(tag).and_then(Slot::as_record)
    }

    /// Returns the records of the page under a tag.
    #[must_use]
    pub fn records(&self, tag: &str) -> Option<&[Record]> {
        self.get(tag)
            .and_then(Slot::as_page)
            .map(|page| page.records.as_slice())
    }

    /// Returns the computed value under a tag.
    #[must_use]
    pub fn value(&self, tag: &str) -> Option<&Value> {
        self.get(tag).and_then(Slot::as_value)
    }

    /// Removes a tag, returning its value.
    pub fn remove(&mut self, tag: &str) -> Option<Slot> {
        let index = self.entries.iter().position(|(t, _)| t == tag)?;
        Some(self.entries.remove(index).1)
    }

    /// Returns true if the tag is present.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    /// Returns the tags in insertion order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    /// Returns the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.entries.iter().map(|(t, s)| (t.as_str(), s))
    }

    /// Returns the number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no tag is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
