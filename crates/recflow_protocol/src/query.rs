//! Multi-record read parameters.

use crate::ids::AppId;

/// Parameters of a multi-record read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// App to read from.
    pub app: AppId,
    /// Field projection. `None` returns every field and both markers.
    pub fields: Option<Vec<String>>,
    /// Store-specific query string.
    pub query: Option<String>,
    /// Whether to ask the store for the total match count.
    pub total_count: bool,
}

impl RecordQuery {
    /// Creates a query returning every record of the app.
    pub fn new(app: impl Into<AppId>) -> Self {
        Self {
            app: app.into(),
            fields: None,
            query: None,
            total_count: false,
        }
    }

    /// Restricts the returned fields.
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Requests the total match count.
    #[must_use]
    pub fn with_total_count(mut self) -> Self {
        self.total_count = true;
        self
    }

    /// Returns true if a non-empty projection was requested.
    ///
    /// An empty field list means "all fields", as with the store API.
    #[must_use]
    pub fn is_projected(&self) -> bool {
        self.fields.as_ref().is_some_and(|f| !f.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder() {
        let q = RecordQuery::new("7")
            .with_fields(["a", "b"])
            .with_query("a = \"x\"")
            .with_total_count();

        assert_eq!(q.app, AppId::from("7"));
        assert_eq!(q.fields, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(q.query.as_deref(), Some("a = \"x\""));
        assert!(q.total_count);
        assert!(q.is_projected());
    }

    #[test]
    fn empty_projection_means_all_fields() {
        let q = RecordQuery::new("7").with_fields(Vec::<String>::new());
        assert!(!q.is_projected());
        assert!(!RecordQuery::new("7").is_projected());
    }
}
