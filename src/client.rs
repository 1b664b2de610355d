use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, RequestBuilder,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    decode::{decode_error, decode_success, decode_typed},
    options::normalize_base_url,
    ApiError, ApiResponse, ClientConfig, MetaBaseError, QueryParams, Result,
};

/// `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!("metabase-client-rust/", env!("CARGO_PKG_VERSION"));

/// Joins a base URL and an endpoint with exactly one separating slash.
///
/// Example: `("http://host/", "/rest/v1")` → `"http://host/rest/v1"`
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Percent-encodes one path segment (table name, record or resource id).
///
/// `/`, `?`, `#` and `%` are escaped so the value stays a single segment.
/// Empty, `.` and `..` segments are rejected with [`MetaBaseError::Invalid`].
pub(crate) fn path_segment(segment: &str) -> Result<String> {
    if matches!(segment, "" | "." | "..") {
        return Err(MetaBaseError::Invalid(format!(
            "invalid path segment '{segment}'"
        )));
    }
    let invalid = || MetaBaseError::Invalid(format!("cannot encode path segment '{segment}'"));
    let mut url = reqwest::Url::parse("http://segment.invalid/").map_err(|_| invalid())?;
    url.path_segments_mut().map_err(|_| invalid())?.pop_if_empty().push(segment);
    Ok(url.path().trim_start_matches('/').to_owned())
}

#[derive(Clone)]
/// HTTP client for the MetaBase API.
///
/// Clones share one transport session. The session is released by
/// [`MetaBaseClient::close`] or when the last clone is dropped.
pub struct MetaBaseClient {
    http: Arc<RwLock<Option<reqwest::Client>>>,
    config: Arc<ClientConfig>,
}

impl fmt::Debug for MetaBaseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaBaseClient")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Raw outcome of one HTTP exchange: status and full body, or a transport error.
pub(crate) type Exchange = std::result::Result<(u16, Vec<u8>), ApiError>;

impl MetaBaseClient {
    /// Creates a client and opens its transport session.
    ///
    /// Fails with [`MetaBaseError::Config`] for an unusable url, an empty
    /// API key, a zero timeout or an invalid header.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut config = config;
        config.url = normalize_base_url(&config.url);
        validate_config(&config)?;

        let http = reqwest::Client::builder()
            .default_headers(default_headers(&config)?)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| MetaBaseError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http: Arc::new(RwLock::new(Some(http))),
            config: Arc::new(config),
        })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `METABASE_URL`: API base url (e.g. `http://localhost:7609`)
    /// - `METABASE_API_KEY`: API key
    /// - `METABASE_TIMEOUT_MS`: optional timeout in milliseconds
    /// - `METABASE_DEBUG`: optional, `1` or `true` enables diagnostics
    ///
    /// # Example
    ///
    /// ```no_run
    /// use metabase_client::MetaBaseClient;
    ///
    /// let client = MetaBaseClient::from_env().expect("missing METABASE_* env vars");
    /// ```
    pub fn from_env() -> Result<Self> {
        let url = required_env("METABASE_URL")?;
        let api_key = required_env("METABASE_API_KEY")?;
        let mut config = ClientConfig::new(url, api_key);

        if let Ok(timeout) = std::env::var("METABASE_TIMEOUT_MS") {
            let timeout_ms = timeout.trim().parse::<u64>().map_err(|err| {
                MetaBaseError::Config(format!("invalid METABASE_TIMEOUT_MS '{timeout}': {err}"))
            })?;
            config = config.with_timeout_ms(timeout_ms);
        }
        if let Ok(debug) = std::env::var("METABASE_DEBUG") {
            let debug = debug.trim();
            config = config.with_debug(debug == "1" || debug.eq_ignore_ascii_case("true"));
        }

        Self::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.url
    }

    /// Releases the transport session.
    ///
    /// Calling it again is a no-op; any request made afterwards fails with
    /// [`MetaBaseError::Closed`].
    pub fn close(&self) {
        let released = self
            .http
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() && self.config.debug {
            tracing::debug!(url = %self.config.url, "metabase session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Sends one request and normalizes the outcome.
    ///
    /// Transport failures and error statuses come back as
    /// [`ApiResponse::Error`]; `Err` is returned only when the session has
    /// been closed.
    pub async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        params: &QueryParams,
    ) -> Result<ApiResponse<Value>> {
        let url = self.url(endpoint);
        let mut request = self.http()?.request(method.clone(), &url);
        self.trace_request(
            &method,
            &url,
            body.as_ref().map(|body| body as &dyn fmt::Display),
            params,
        );

        if !params.is_empty() {
            request = request.query(params.pairs());
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        Ok(match self.send(request).await {
            Ok((status, body)) => classify(status, &body),
            Err(error) => ApiResponse::Error(error),
        })
    }

    /// Like [`MetaBaseClient::execute`], decoding the payload into `T`.
    pub(crate) async fn execute_as<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        params: &QueryParams,
    ) -> Result<ApiResponse<T>> {
        let response = self.execute(method, endpoint, body, params).await?;
        Ok(decode_typed(response))
    }

    pub(crate) fn http(&self) -> Result<reqwest::Client> {
        self.http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(MetaBaseError::Closed)
    }

    /// Emits the outgoing request when debug mode is on.
    pub(crate) fn trace_request(
        &self,
        method: &Method,
        url: &str,
        body: Option<&dyn fmt::Display>,
        params: &QueryParams,
    ) {
        if !self.config.debug {
            return;
        }
        match body {
            Some(body) => tracing::debug!(
                method = %method,
                url = %url,
                body = %body,
                params = ?params.pairs(),
                "metabase request"
            ),
            None => tracing::debug!(
                method = %method,
                url = %url,
                params = ?params.pairs(),
                "metabase request"
            ),
        }
    }

    pub(crate) fn url(&self, endpoint: &str) -> String {
        join_url(&self.config.url, endpoint)
    }

    /// Executes a prepared request and reads the whole body.
    ///
    /// A failure while reading the body is a transport failure too; no
    /// partial body is ever returned.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Exchange {
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return Err(self.network_error(err)),
        };

        let status = response.status();
        if self.config.debug {
            tracing::debug!(status = status.as_u16(), url = %response.url(), "metabase response");
        }

        match response.bytes().await {
            Ok(body) => Ok((status.as_u16(), body.to_vec())),
            Err(err) => Err(self.network_error(err)),
        }
    }

    fn network_error(&self, err: reqwest::Error) -> ApiError {
        if self.config.debug {
            tracing::debug!(error = %err, timeout = err.is_timeout(), "metabase request failed");
        }
        ApiError::network(err.to_string())
    }
}

/// Maps a complete HTTP exchange onto the response envelope.
pub(crate) fn classify(status: u16, body: &[u8]) -> ApiResponse<Value> {
    let text = String::from_utf8_lossy(body);
    if status >= 400 {
        ApiResponse::Error(decode_error(status, &text))
    } else {
        decode_success(&text)
    }
}

fn validate_config(config: &ClientConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(MetaBaseError::Config("url must not be empty".to_owned()));
    }
    let parsed = reqwest::Url::parse(&config.url)
        .map_err(|err| MetaBaseError::Config(format!("invalid url '{}': {err}", config.url)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MetaBaseError::Config(format!(
            "unsupported url scheme '{}'; expected http or https",
            parsed.scheme()
        )));
    }
    if config.api_key.trim().is_empty() {
        return Err(MetaBaseError::Config("api key must not be empty".to_owned()));
    }
    if config.timeout_ms == 0 {
        return Err(MetaBaseError::Config(
            "timeout_ms must be greater than zero".to_owned(),
        ));
    }
    Ok(())
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    let mut authorization = header_value(&format!("Bearer {}", config.api_key.trim()))?;
    authorization.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, authorization);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

    // Caller headers go last so they override the defaults.
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| MetaBaseError::Config(format!("invalid header name '{name}': {err}")))?;
        headers.insert(name, header_value(value)?);
    }

    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| MetaBaseError::Config(format!("invalid header value: {err}")))
}

fn required_env(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .map_err(|_| MetaBaseError::Config(format!("missing {name} environment variable")))?;
    if value.trim().is_empty() {
        return Err(MetaBaseError::Config(format!("{name} is set but empty")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use reqwest::header;
    use serde_json::json;

    use super::{classify, default_headers, join_url, path_segment, MetaBaseClient, USER_AGENT};
    use crate::{ClientConfig, MetaBaseError};

    #[test]
    fn path_segment_escapes_separators() {
        assert_eq!(path_segment("users").expect("plain"), "users");
        assert_eq!(path_segment("u-1").expect("plain"), "u-1");
        assert_eq!(
            path_segment("a/../../keys/x").expect("escaped"),
            "a%2F..%2F..%2Fkeys%2Fx"
        );
        assert_eq!(path_segment("a b?c#d").expect("escaped"), "a%20b%3Fc%23d");
        assert_eq!(path_segment("50%").expect("escaped"), "50%25");
    }

    #[test]
    fn path_segment_rejects_dot_segments() {
        for segment in ["", ".", ".."] {
            assert!(matches!(path_segment(segment), Err(MetaBaseError::Invalid(_))));
        }
    }

    #[test]
    fn join_url_produces_one_separator() {
        let expected = "http://host:1/rest/v1/users";
        for base in ["http://host:1", "http://host:1/"] {
            for endpoint in ["rest/v1/users", "/rest/v1/users"] {
                assert_eq!(join_url(base, endpoint), expected);
            }
        }
    }

    #[test]
    fn default_headers_carry_bearer_and_user_agent() {
        let headers = default_headers(&ClientConfig::new("http://x", "abc")).expect("headers");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer abc");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::USER_AGENT], USER_AGENT);
    }

    #[test]
    fn caller_headers_override_defaults() {
        let config = ClientConfig::new("http://x", "abc")
            .with_header("User-Agent", "custom/1.0")
            .with_header("X-Project", "p1");
        let headers = default_headers(&config).expect("headers");
        assert_eq!(headers[header::USER_AGENT], "custom/1.0");
        assert_eq!(headers["x-project"], "p1");
        assert_eq!(headers.get_all(header::USER_AGENT).iter().count(), 1);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let cases = [
            ClientConfig::new("", "key"),
            ClientConfig::new("not a url", "key"),
            ClientConfig::new("ftp://host", "key"),
            ClientConfig::new("http://host", "  "),
            ClientConfig::new("http://host", "key").with_timeout_ms(0),
            ClientConfig::new("http://host", "key").with_header("bad header", "v"),
        ];
        for config in cases {
            let err = MetaBaseClient::new(config).expect_err("config must be rejected");
            assert!(matches!(err, MetaBaseError::Config(_)));
        }
    }

    #[test]
    fn close_is_idempotent_and_blocks_use() {
        let client = MetaBaseClient::new(ClientConfig::new("http://localhost:1/", "key"))
            .expect("client must build");
        assert_eq!(client.base_url(), "http://localhost:1");
        let clone = client.clone();

        client.close();
        client.close();

        assert!(clone.is_closed());
        assert!(matches!(clone.http(), Err(MetaBaseError::Closed)));
    }

    #[test]
    fn construct_and_drop_without_requests() {
        let client = MetaBaseClient::new(ClientConfig::new("https://api.example.com", "key"))
            .expect("client must build");
        assert!(!client.is_closed());
        drop(client);
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = MetaBaseClient::new(ClientConfig::new("http://x", "secret-token"))
            .expect("client must build");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn classify_splits_on_status_400() {
        assert!(classify(399, br#"{"data":1}"#).is_success());
        let response = classify(400, br#"{"data":1}"#);
        assert_eq!(response.error().map(|err| err.code.as_str()), Some("http_400"));
        assert_eq!(classify(200, br#"{"data":1}"#).data(), Some(&json!(1)));
    }
}
