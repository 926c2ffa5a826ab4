//! Configuration for the REST store.

use std::time::Duration;

/// Default path prepended to every API path.
pub const DEFAULT_API_PREFIX: &str = "/k/v1";

/// Default suffix appended to every API path.
pub const DEFAULT_API_SUFFIX: &str = ".json";

/// Default error code for a missing record.
pub const DEFAULT_NOT_FOUND_CODE: &str = "GAIA_RE01";

/// Default error code for a revision mismatch.
pub const DEFAULT_CONFLICT_CODE: &str = "GAIA_CO02";

/// Configuration for [`RestStore`](crate::RestStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestConfig {
    /// Server origin, e.g. `https://example.invalid`.
    pub base_url: String,
    /// Path prepended to every API path.
    pub api_prefix: String,
    /// Suffix appended to every API path.
    pub api_suffix: String,
    /// Error code the server uses for a missing record.
    pub not_found_code: String,
    /// Error code the server uses for a revision mismatch.
    pub conflict_code: String,
    /// Request timeout, passed to the HTTP client.
    pub timeout: Duration,
}

impl RestConfig {
    /// Creates a configuration for a server.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_prefix: DEFAULT_API_PREFIX.into(),
            api_suffix: DEFAULT_API_SUFFIX.into(),
            not_found_code: DEFAULT_NOT_FOUND_CODE.into(),
            conflict_code: DEFAULT_CONFLICT_CODE.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the API path prefix.
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Sets the API path suffix.
    pub fn with_api_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.api_suffix = suffix.into();
        self
    }

    /// Sets the not-found error code.
    pub fn with_not_found_code(mut self, code: impl Into<String>) -> Self {
        self.not_found_code = code.into();
        self
    }

    /// Sets the conflict error code.
    pub fn with_conflict_code(mut self, code: impl Into<String>) -> Self {
        self.conflict_code = code.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the full URL of an API path.
    pub fn url(&self, api: &str) -> String {
        format!(
            "{}{}{}{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix,
            api,
            self.api_suffix
        )
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_parts() {
        let config = RestConfig::new("https://example.invalid/");
        assert_eq!(
            config.url("/record"),
            "https://example.invalid/k/v1/record.json"
        );

        let config = config.with_api_prefix("/api").with_api_suffix("");
        assert_eq!(config.url("/records"), "https://example.invalid/api/records");
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = RestConfig::default()
            .with_not_found_code("NF")
            .with_conflict_code("CF")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.not_found_code, "NF");
        assert_eq!(config.conflict_code, "CF");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.api_prefix, DEFAULT_API_PREFIX);
    }
}
