use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Error body returned with a 4xx/5xx status.
///
/// Two shapes exist on the server: `{"error": {"code", "message", ...}}` and
/// the older `{"error": "message", "details": "..."}`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<WireError>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireError {
    Structured(ErrorObject),
    Message(String),
    Other(Value),
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorObject {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Pagination metadata nested under `pagination` by the list handlers.
#[derive(Debug, Default, Deserialize)]
pub struct WirePagination {
    #[serde(default)]
    pub count: Option<Value>,
    #[serde(default)]
    pub limit: Option<Value>,
    #[serde(default)]
    pub offset: Option<Value>,
    #[serde(default)]
    pub has_next: Option<Value>,
}

/// Deserializes `null` the same as a missing field.
///
/// List and map fields arrive as `null` when the server has nothing to send.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
