//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, WebSocket connection setup, HTTP API
//! wrappers for submission, history and artifact download, and the
//! artifact fetcher's storage fallback chain.

pub mod api;
pub mod client;
pub mod fetcher;
pub mod messages;

pub use api::{ComfyUIApi, ComfyUIApiError, JobHandle};
pub use client::{ComfyUIClient, ComfyUIClientError, ComfyUIConnection, WsStream};
pub use fetcher::fetch_artifact;
pub use messages::{parse_message, ComfyUIMessage};
