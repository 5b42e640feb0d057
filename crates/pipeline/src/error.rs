//! Job-level error taxonomy.
//!
//! Every fatal failure of a render job ends up as one [`JobError`]. The
//! runner relays exactly one `error` progress event for it before
//! returning.

use std::time::Duration;

use comfygen_comfyui::{ComfyUIApiError, ComfyUIClientError};
use comfygen_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Network failure or per-request timeout talking to the engine.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The engine answered with something we cannot use.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The monitor exceeded the overall job deadline.
    #[error("Job timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The resolver found no usable artifact.
    #[error("No output: {0}")]
    NoOutput(String),

    /// The engine reported an execution error or interruption.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Neither prompt nor resolution could be bound.
    #[error("Binding failed: {0}")]
    Binding(String),

    /// The workflow template or LoRA catalog could not be loaded.
    #[error("Workflow template error: {0}")]
    Template(String),

    #[error("Job cancelled")]
    Cancelled,
}

impl JobError {
    /// Stable lowercase label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Timeout(_) => "timeout",
            Self::NoOutput(_) => "no_output",
            Self::Execution(_) => "execution",
            Self::Binding(_) => "binding",
            Self::Template(_) => "template",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<CoreError> for JobError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NoOutput(msg) => Self::NoOutput(msg),
            CoreError::Binding(msg) => Self::Binding(msg),
            other => Self::Template(other.to_string()),
        }
    }
}

impl From<ComfyUIApiError> for JobError {
    fn from(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::Request(e) => Self::Transport(e.to_string()),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<ComfyUIClientError> for JobError {
    fn from(err: ComfyUIClientError) -> Self {
        match err {
            ComfyUIClientError::Connection(msg) => Self::Transport(msg),
            ComfyUIClientError::Protocol(msg) => Self::Protocol(msg),
        }
    }
}
