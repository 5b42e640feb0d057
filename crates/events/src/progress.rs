//! Progress payloads relayed to the consumer.
//!
//! Each [`ProgressUpdate`] serializes to the `progress_data` object of an
//! `/update_progress` request, tagged by its `status` field:
//!
//! ```json
//! {"status": "generating", "progress": 45, "message": "Generating... 45%"}
//! ```

use async_trait::async_trait;
use serde::Serialize;

use crate::delivery::relay::RelayError;

// ---------------------------------------------------------------------------
// ProgressUpdate
// ---------------------------------------------------------------------------

/// One status event in a job's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressUpdate {
    Starting { message: String },
    Execution { message: String },
    Cached { message: String },
    LoadingModels { message: String },
    Generating { progress: u8, message: String },
    Complete { message: String, generation_time: f64 },
    Error { message: String },
}

impl ProgressUpdate {
    pub fn starting() -> Self {
        Self::Starting {
            message: "Starting generation process...".to_string(),
        }
    }

    pub fn execution() -> Self {
        Self::Execution {
            message: "Starting execution...".to_string(),
        }
    }

    pub fn cached() -> Self {
        Self::Cached {
            message: "Using cached result...".to_string(),
        }
    }

    pub fn loading_models() -> Self {
        Self::LoadingModels {
            message: "Loading models and preparing generation...".to_string(),
        }
    }

    pub fn generating(progress: u8) -> Self {
        Self::Generating {
            progress,
            message: format!("Generating... {progress}%"),
        }
    }

    pub fn complete(generation_time: f64) -> Self {
        Self::Complete {
            message: "Generation complete!".to_string(),
            generation_time,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name of the `status` tag.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Starting { .. } => "starting",
            Self::Execution { .. } => "execution",
            Self::Cached { .. } => "cached",
            Self::LoadingModels { .. } => "loading_models",
            Self::Generating { .. } => "generating",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// `complete` and `error` end a job's event sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

// ---------------------------------------------------------------------------
// ProgressSink
// ---------------------------------------------------------------------------

/// Destination for a job's progress updates.
///
/// Implemented by [`ProgressRelay`](crate::ProgressRelay) for the HTTP
/// consumer; tests substitute an in-memory recorder.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn send(&self, request_id: &str, update: &ProgressUpdate) -> Result<(), RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generating_serializes_with_progress() {
        let value = serde_json::to_value(ProgressUpdate::generating(45)).unwrap();
        assert_eq!(
            value,
            json!({"status": "generating", "progress": 45, "message": "Generating... 45%"})
        );
    }

    #[test]
    fn loading_models_uses_snake_case_tag() {
        let value = serde_json::to_value(ProgressUpdate::loading_models()).unwrap();
        assert_eq!(value["status"], "loading_models");
        assert_eq!(ProgressUpdate::loading_models().status(), "loading_models");
    }

    #[test]
    fn complete_carries_generation_time() {
        let value = serde_json::to_value(ProgressUpdate::complete(12.5)).unwrap();
        assert_eq!(value["status"], "complete");
        assert_eq!(value["generation_time"], 12.5);
    }

    #[test]
    fn only_complete_and_error_are_terminal() {
        assert!(ProgressUpdate::complete(1.0).is_terminal());
        assert!(ProgressUpdate::error("x").is_terminal());
        assert!(!ProgressUpdate::generating(50).is_terminal());
        assert!(!ProgressUpdate::starting().is_terminal());
    }
}
