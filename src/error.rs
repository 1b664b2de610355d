/// Error type returned by this crate.
///
/// Failures reported by the server or the network are not errors in this
/// sense: they come back as [`crate::ApiResponse::Error`]. Variants here
/// indicate misuse of the client or invalid configuration.
#[derive(Debug, thiserror::Error)]
pub enum MetaBaseError {
    /// Invalid client configuration (url, api key or headers).
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The client session was released with [`crate::MetaBaseClient::close`].
    #[error("client session is closed")]
    Closed,
    /// Request body or options could not be serialized to JSON.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    /// Caller-supplied input that cannot be turned into a request.
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Realtime subscription handshake or stream failure.
    #[error("realtime error: {0}")]
    Realtime(String),
}
