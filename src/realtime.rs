//! Realtime change subscriptions over WebSocket.
//!
//! Enabled with the `realtime` feature (on by default). A subscription is a
//! persistent connection living beside the request pipeline; its failures
//! are reported as [`MetaBaseError::Realtime`].

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::header::{HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT},
        protocol::Message,
    },
    MaybeTlsStream, WebSocketStream,
};

use crate::{
    client::{join_url, path_segment},
    Filter, MetaBaseClient, MetaBaseError, QueryParams, Result,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

/// One change notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeType,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Realtime calls, borrowed from a [`MetaBaseClient`].
#[derive(Clone, Copy, Debug)]
pub struct RealtimeManager<'a> {
    client: &'a MetaBaseClient,
}

impl MetaBaseClient {
    pub fn realtime(&self) -> RealtimeManager<'_> {
        RealtimeManager { client: self }
    }
}

impl RealtimeManager<'_> {
    /// Opens a change stream for `table`, narrowed by `filter`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use metabase_client::{ClientConfig, Filter, MetaBaseClient};
    ///
    /// # async fn run() -> metabase_client::Result<()> {
    /// let client = MetaBaseClient::new(ClientConfig::new("http://localhost:7609", "key"))?;
    /// let mut subscription = client
    ///     .realtime()
    ///     .subscribe("messages", &Filter::new().with("room", "general"))
    ///     .await?;
    ///
    /// while let Some(event) = subscription.next().await {
    ///     println!("{:?}", event?);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn subscribe(&self, table: &str, filter: &Filter) -> Result<Subscription> {
        if self.client.is_closed() {
            return Err(MetaBaseError::Closed);
        }

        let config = self.client.config();
        let mut params = QueryParams::new();
        params.push_filter(filter);
        let url = realtime_url(&config.url, table, &params)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| MetaBaseError::Realtime(format!("invalid realtime url '{url}': {err}")))?;
        let authorization = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
            .map_err(|err| MetaBaseError::Config(format!("invalid header value: {err}")))?;
        request.headers_mut().insert(AUTHORIZATION, authorization);
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(crate::client::USER_AGENT));
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                MetaBaseError::Config(format!("invalid header name '{name}': {err}"))
            })?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| MetaBaseError::Config(format!("invalid header value: {err}")))?;
            request.headers_mut().insert(name, value);
        }

        if config.debug {
            tracing::debug!(url = %url, table, "metabase realtime connect");
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let (socket, _) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| {
                MetaBaseError::Realtime(format!("connect timed out after {} ms", config.timeout_ms))
            })?
            .map_err(|err| MetaBaseError::Realtime(format!("connect failed: {err}")))?;

        Ok(Subscription {
            table: table.to_owned(),
            debug: config.debug,
            socket,
            closed: false,
        })
    }
}

/// Live change stream for one table.
pub struct Subscription {
    table: String,
    debug: bool,
    socket: Socket,
    closed: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("table", &self.table)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Subscription {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Receives the next event.
    ///
    /// Returns `None` once the server closes the stream or after
    /// [`Subscription::close`].
    pub async fn next(&mut self) -> Option<Result<RealtimeEvent>> {
        while !self.closed {
            let message = match self.socket.next().await {
                Some(Ok(message)) => message,
                Some(Err(err)) => {
                    self.closed = true;
                    return Some(Err(MetaBaseError::Realtime(format!("stream error: {err}"))));
                }
                None => {
                    self.closed = true;
                    return None;
                }
            };

            match message {
                Message::Text(text) => return Some(decode_event(text.as_bytes())),
                Message::Binary(bytes) => return Some(decode_event(&bytes)),
                Message::Close(frame) => {
                    if self.debug {
                        tracing::debug!(table = %self.table, ?frame, "metabase realtime closed by server");
                    }
                    self.closed = true;
                }
                // Pings are answered by the protocol layer.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        None
    }

    /// Closes the connection. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.socket
            .close(None)
            .await
            .map_err(|err| MetaBaseError::Realtime(format!("close failed: {err}")))
    }
}

fn decode_event(payload: &[u8]) -> Result<RealtimeEvent> {
    serde_json::from_slice(payload)
        .map_err(|err| MetaBaseError::Realtime(format!("invalid event payload: {err}")))
}

/// Derives `ws(s)://host/.../rest/realtime/{table}?<filter>` from the base url.
fn realtime_url(base_url: &str, table: &str, params: &QueryParams) -> Result<Url> {
    let joined = join_url(base_url, &format!("/rest/realtime/{}", path_segment(table)?));
    let mut url = Url::parse(&joined)
        .map_err(|err| MetaBaseError::Config(format!("invalid url '{joined}': {err}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(MetaBaseError::Config(format!(
                "unsupported url scheme '{other}' for realtime"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| MetaBaseError::Config("failed to set WebSocket url scheme".to_owned()))?;

    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.pairs());
    }
    Ok(url)
}
