//! Identity types.
//!
//! Backing stores accept app ids, record ids and revisions either as numbers
//! or as strings. All three are carried as opaque strings here.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new value from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the raw string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of an app (a record table in the backing store).
    AppId
);

string_id!(
    /// Identifier of a record within an app.
    RecordId
);

string_id!(
    /// Opaque version token, bumped by the store on every successful write.
    Revision
);

impl RecordId {
    /// Parses the id as a number, for stores that assign numeric ids.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Revision {
    /// Parses the revision as a number, for stores that use counters.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Returns the following numeric revision, if this one is numeric.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        self.as_u64().map(|n| Self::from(n + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_agree() {
        assert_eq!(RecordId::from(7u64), RecordId::from("7"));
        assert_eq!(AppId::from(12u64).as_str(), "12");
    }

    #[test]
    fn revision_next() {
        assert_eq!(Revision::from("3").next(), Some(Revision::from("4")));
        assert_eq!(Revision::from("abc").next(), None);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&RecordId::from("42")).unwrap();
        assert_eq!(json, "\"42\"");
    }
}
