//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, history retrieval and artifact download
//! using [`reqwest`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use comfygen_core::manifest::StorageClass;
use serde_json::{Map, Value};

/// Timeout for `POST /prompt`.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for `GET /view`.
pub const CONTENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for `GET /history` and `GET /history/{id}`.
pub const HISTORY_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for a single ComfyUI instance.
#[derive(Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Handle for a queued workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Caller-issued id the progress stream is addressed to.
    pub client_id: String,
    /// Position in the execution queue, when reported.
    pub number: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body is not what the endpoint promises.
    #[error("Unexpected ComfyUI response: {0}")]
    Protocol(String),
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with `{"prompt": workflow, "client_id": ..}`.
    /// Not retried: the engine has no dedup key, so a retry could queue
    /// the job twice.
    pub async fn submit_workflow(
        &self,
        workflow: &Map<String, Value>,
        client_id: &str,
    ) -> Result<JobHandle, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .timeout(SUBMIT_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let value: Value = Self::parse_response(response).await?;
        let handle = Self::job_handle(&value, client_id)?;

        tracing::info!(
            prompt_id = %handle.prompt_id,
            client_id = %client_id,
            queue_number = ?handle.number,
            "Workflow queued",
        );
        Ok(handle)
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends `GET /history/{prompt_id}`. The body is
    /// `{prompt_id: {"outputs": {..}, "status": {..}}}`, or `{}` while the
    /// prompt is still running.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .timeout(HISTORY_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve the history of every job the engine remembers.
    pub async fn get_all_history(&self) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history", self.api_url))
            .timeout(HISTORY_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download an artifact via `GET /view`.
    pub async fn view(
        &self,
        filename: &str,
        subfolder: &str,
        storage_class: StorageClass,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", filename),
                ("subfolder", subfolder),
                ("type", storage_class.as_str()),
            ])
            .timeout(CONTENT_TIMEOUT)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    fn job_handle(value: &Value, client_id: &str) -> Result<JobHandle, ComfyUIApiError> {
        let obj = value.as_object().ok_or_else(|| {
            ComfyUIApiError::Protocol(format!("submission response is not an object: {value}"))
        })?;
        let prompt_id = match obj.get("prompt_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                return Err(ComfyUIApiError::Protocol(format!(
                    "submission response has no prompt_id: {value}"
                )))
            }
        };
        Ok(JobHandle {
            prompt_id,
            client_id: client_id.to_string(),
            number: obj.get("number").and_then(Value::as_i64),
            submitted_at: Utc::now(),
        })
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body. A body that is not valid
    /// JSON is a protocol error rather than a transport one.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ComfyUIApiError::Protocol(format!("invalid JSON body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn job_handle_from_submit_body() {
        let handle = ComfyUIApi::job_handle(&json!({"prompt_id": "p-1", "number": 3, "node_errors": {}}), "c-1").unwrap();
        assert_eq!(handle.prompt_id, "p-1");
        assert_eq!(handle.client_id, "c-1");
        assert_eq!(handle.number, Some(3));
    }

    #[test]
    fn job_handle_requires_prompt_id() {
        assert_matches!(
            ComfyUIApi::job_handle(&json!({"error": "bad"}), "c"),
            Err(ComfyUIApiError::Protocol(_))
        );
        assert_matches!(
            ComfyUIApi::job_handle(&json!(["p-1"]), "c"),
            Err(ComfyUIApiError::Protocol(_))
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(ComfyUIApi::new("http://host:8188/").api_url(), "http://host:8188");
    }
}
