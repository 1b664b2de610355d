use serde::{Deserialize, Serialize};

/// Error code for requests that never produced an HTTP response.
pub const NETWORK_ERROR: &str = "network_error";
/// Error code for success responses whose payload could not be decoded.
pub const DECODE_ERROR: &str = "decode_error";

/// Uniform result of every client operation.
///
/// Exactly one of a payload or an error is present.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiResponse<T> {
    Success(Success<T>),
    Error(ApiError),
}

/// Successful payload together with optional pagination metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Success<T> {
    pub data: T,
    pub pagination: Pagination,
}

/// Pagination fields reported by the server. Absent fields stay `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pagination {
    pub count: Option<u64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub has_next: Option<bool>,
}

impl Pagination {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Normalized error information.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Server-supplied code, or `http_<status>` / `network_error`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
}

impl ApiError {
    /// Creates an error stamped with the current UTC time.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: now_timestamp(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub(crate) fn network(message: impl Into<String>) -> Self {
        Self::new(NETWORK_ERROR, message)
    }

    /// Fallback error for an HTTP status without a usable error body.
    pub(crate) fn http_status(status: u16) -> Self {
        Self::new(http_code(status), reason_phrase(status))
    }

    pub fn is_network(&self) -> bool {
        self.code == NETWORK_ERROR
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl<T> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Self {
        Self::Success(Success {
            data,
            pagination: Pagination::default(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(success) => Some(&success.data),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Self::Success(_) => None,
            Self::Error(error) => Some(error),
        }
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        match self {
            Self::Success(success) => Some(&success.pagination),
            Self::Error(_) => None,
        }
    }

    /// Converts into a `Result`, dropping pagination.
    pub fn into_result(self) -> std::result::Result<T, ApiError> {
        match self {
            Self::Success(success) => Ok(success.data),
            Self::Error(error) => Err(error),
        }
    }

    /// Maps the payload, keeping pagination and errors untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        match self {
            Self::Success(Success { data, pagination }) => ApiResponse::Success(Success {
                data: f(data),
                pagination,
            }),
            Self::Error(error) => ApiResponse::Error(error),
        }
    }
}

/// Response of `GET /rest/health`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub uptime: String,
    #[serde(default)]
    pub database: DatabaseStatus,
    #[serde(default)]
    pub cache: CacheStatus,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseStatus {
    pub connected: bool,
    #[serde(default)]
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheStatus {
    pub connected: bool,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Table definition returned by `GET /rest/v1/{table}/schema`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<Index>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_unique: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

pub(crate) fn http_code(status: u16) -> String {
    format!("http_{status}")
}

pub(crate) fn reason_phrase(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_owned()
}

pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::{reason_phrase, ApiError, ApiResponse, Pagination};

    #[test]
    fn http_status_fallback_uses_reason_phrase() {
        let error = ApiError::http_status(404);
        assert_eq!(error.code, "http_404");
        assert_eq!(error.message, "Not Found");
        assert!(error.details.is_none());
    }

    #[test]
    fn unknown_status_has_placeholder_reason() {
        assert_eq!(reason_phrase(599), "Unknown Status");
    }

    #[test]
    fn timestamp_is_utc_iso8601() {
        let error = ApiError::network("refused");
        assert_eq!(error.timestamp.len(), "2024-01-01T00:00:00Z".len());
        assert!(error.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&error.timestamp).is_ok());
    }

    #[test]
    fn map_keeps_pagination() {
        let response = ApiResponse::Success(super::Success {
            data: 2,
            pagination: Pagination {
                count: Some(5),
                ..Pagination::default()
            },
        });
        let mapped = response.map(|value| value * 10);
        assert_eq!(mapped.data(), Some(&20));
        assert_eq!(mapped.pagination().and_then(|p| p.count), Some(5));
    }

    #[test]
    fn into_result_returns_error() {
        let response: ApiResponse<()> = ApiResponse::Error(ApiError::network("down"));
        let err = response.into_result().expect_err("must be error");
        assert!(err.is_network());
        assert_eq!(err.to_string(), "network_error: down");
    }
}
