//! Final artifact handoff to the consumer.
//!
//! A single multipart `POST /send_image` carrying `request_id` and one of
//! `image_data` / `video_data`. No retry: the artifact is already on disk,
//! so a lost handoff is recoverable out of band.

use std::time::Duration;

use comfygen_core::{FinalArtifact, MediaKind};
use reqwest::multipart::{Form, Part};

/// HTTP request timeout for the handoff.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// MIME type sent with every video artifact.
const VIDEO_MIME: &str = "video/mp4";

/// Error type for artifact delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The consumer returned a non-2xx status code.
    #[error("Consumer returned HTTP {0}")]
    HttpStatus(u16),

    /// The multipart body could not be assembled.
    #[error("Failed to build multipart body: {0}")]
    Build(String),
}

/// Multipart field carrying the artifact bytes.
pub fn field_name(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image_data",
        MediaKind::Video => "video_data",
    }
}

fn mime_for(artifact: &FinalArtifact) -> &'static str {
    if artifact.media_kind == MediaKind::Video {
        return VIDEO_MIME;
    }
    let ext = artifact
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Posts final artifacts to the consumer service.
#[derive(Clone)]
pub struct ArtifactDelivery {
    client: reqwest::Client,
    url: String,
}

impl ArtifactDelivery {
    /// * `consumer_url` - consumer base URL, e.g. `http://127.0.0.1:8090`.
    pub fn new(consumer_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            url: format!("{}/send_image", consumer_url.trim_end_matches('/')),
        }
    }

    /// Send one artifact. A single attempt.
    pub async fn deliver(
        &self,
        request_id: &str,
        artifact: &FinalArtifact,
    ) -> Result<(), DeliveryError> {
        let part = Part::bytes(artifact.bytes.clone())
            .file_name(artifact.filename.clone())
            .mime_str(mime_for(artifact))
            .map_err(|e| DeliveryError::Build(e.to_string()))?;
        let form = Form::new()
            .text("request_id", request_id.to_string())
            .part(field_name(artifact.media_kind), part);

        let response = self.client.post(&self.url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(DeliveryError::HttpStatus(response.status().as_u16()));
        }

        tracing::info!(
            request_id,
            filename = %artifact.filename,
            size = artifact.bytes.len(),
            field = field_name(artifact.media_kind),
            "Delivered artifact",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(filename: &str, media_kind: MediaKind) -> FinalArtifact {
        FinalArtifact {
            bytes: vec![1, 2, 3],
            filename: filename.to_string(),
            media_kind,
        }
    }

    #[test]
    fn field_depends_on_media_kind() {
        assert_eq!(field_name(MediaKind::Image), "image_data");
        assert_eq!(field_name(MediaKind::Video), "video_data");
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for(&artifact("a.PNG", MediaKind::Image)), "image/png");
        assert_eq!(mime_for(&artifact("a.jpeg", MediaKind::Image)), "image/jpeg");
        assert_eq!(mime_for(&artifact("clip.webm", MediaKind::Video)), "video/mp4");
        assert_eq!(mime_for(&artifact("blob", MediaKind::Image)), "application/octet-stream");
    }
}
