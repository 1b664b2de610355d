use std::fmt;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Connection settings for a [`crate::MetaBaseClient`].
#[derive(Clone, Eq, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the MetaBase API, without trailing slash.
    pub url: String,
    /// API key sent as `Authorization: Bearer <api_key>`.
    pub api_key: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Extra headers applied after the defaults; they win on collision.
    pub headers: Vec<(String, String)>,
    /// Emit request/response diagnostics through `tracing`.
    pub debug: bool,
}

impl ClientConfig {
    /// Creates a config with default timeout, no extra headers and debug off.
    ///
    /// Trailing slashes are stripped from `url`.
    pub fn new(url: impl AsRef<str>, api_key: impl Into<String>) -> Self {
        Self {
            url: normalize_base_url(url.as_ref()),
            api_key: api_key.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            headers: Vec::new(),
            debug: false,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Adds a header. A later call with the same name replaces the earlier value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("headers", &self.headers)
            .field("debug", &self.debug)
            .finish()
    }
}

pub(crate) fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_owned()
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, DEFAULT_TIMEOUT_MS};

    #[test]
    fn new_strips_trailing_slashes() {
        let config = ClientConfig::new("http://localhost:7609//", "key");
        assert_eq!(config.url, "http://localhost:7609");
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(!config.debug);
    }

    #[test]
    fn with_header_replaces_same_name() {
        let config = ClientConfig::new("http://x", "key")
            .with_header("X-Tenant", "a")
            .with_header("x-tenant", "b");
        assert_eq!(config.headers, vec![("x-tenant".to_owned(), "b".to_owned())]);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ClientConfig::new("http://x", "secret-key");
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-key"));
    }
}
