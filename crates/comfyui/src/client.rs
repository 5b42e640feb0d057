//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the websocket base URL. Call
//! [`ComfyUIClient::connect`] with the job's `client_id` to open a live
//! [`ComfyUIConnection`]; the engine addresses every progress frame for
//! prompts submitted under that id to this stream.

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// The raw websocket stream type returned by [`ComfyUIClient::connect`].
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI websocket endpoint.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
}

/// A live WebSocket connection to a ComfyUI instance.
pub struct ComfyUIConnection {
    /// Client ID sent during the WebSocket handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl ComfyUIConnection {
    /// Ask the engine to drop its cached node results so every node of the
    /// next prompt executes.
    pub async fn clear_cache(&mut self) -> Result<(), ComfyUIClientError> {
        let frame = serde_json::json!({"type": "clear_cache"}).to_string();
        self.ws_stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| ComfyUIClientError::Protocol(format!("Failed to send clear_cache: {e}")))?;
        tracing::debug!(client_id = %self.client_id, "Sent clear_cache");
        Ok(())
    }

    /// Send a close frame. Errors are logged, never returned: the stream is
    /// being dropped either way.
    pub async fn close(mut self) {
        if let Err(e) = self.ws_stream.close(None).await {
            tracing::debug!(client_id = %self.client_id, error = %e, "WebSocket close failed");
        }
    }
}

impl ComfyUIClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build a client from the engine's HTTP base URL.
    pub fn from_api_url(api_url: &str) -> Self {
        Self::new(ws_url_from_api_url(api_url))
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect to `/ws?clientId={client_id}`.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

/// `http://` -> `ws://`, `https://` -> `wss://`. Anything else is
/// assumed to already be a websocket URL.
pub fn ws_url_from_api_url(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ws_scheme_from_http() {
        assert_eq!(ws_url_from_api_url("http://127.0.0.1:8188"), "ws://127.0.0.1:8188");
        assert_eq!(ws_url_from_api_url("https://gpu.example/"), "wss://gpu.example");
        assert_eq!(ws_url_from_api_url("ws://already:1"), "ws://already:1");
    }

    #[tokio::test]
    async fn connect_to_closed_port_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ComfyUIClient::new(format!("ws://{addr}"));
        let result = client.connect("c-1").await;
        assert!(matches!(result, Err(ComfyUIClientError::Connection(_))));
    }

    #[tokio::test]
    async fn clear_cache_sends_a_typed_text_frame() {
        use futures::StreamExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                other => panic!("unexpected frame: {other:?}"),
            }
        });

        let mut conn = ComfyUIClient::new(format!("ws://{addr}"))
            .connect("c-1")
            .await
            .unwrap();
        conn.clear_cache().await.unwrap();

        let text = server.await.unwrap();
        let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame, serde_json::json!({"type": "clear_cache"}));
        conn.close().await;
    }
}
