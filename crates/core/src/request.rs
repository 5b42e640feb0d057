//! Caller-supplied generation request and the workflow variants it can
//! target.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Workflow family a request targets. Each variant has its own node-id
/// schema (see [`crate::variants`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowVariant {
    Standard,
    Video,
    Pulid,
    Redux,
}

/// All variants, in declaration order.
pub const ALL_VARIANTS: [WorkflowVariant; 4] = [
    WorkflowVariant::Standard,
    WorkflowVariant::Video,
    WorkflowVariant::Pulid,
    WorkflowVariant::Redux,
];

impl WorkflowVariant {
    /// Lowercase wire name (`standard`, `video`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Video => "video",
            Self::Pulid => "pulid",
            Self::Redux => "redux",
        }
    }
}

impl FromStr for WorkflowVariant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "video" => Ok(Self::Video),
            "pulid" => Ok(Self::Pulid),
            "redux" => Ok(Self::Redux),
            other => Err(CoreError::Validation(format!(
                "Unknown workflow variant '{other}'. Must be one of: standard, video, pulid, redux"
            ))),
        }
    }
}

impl fmt::Display for WorkflowVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Media kind
// ---------------------------------------------------------------------------

/// File extensions recognised as video artifacts.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv", "avi"];

/// Kind of artifact delivered to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a filename by its extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Self {
        if is_video_filename(filename) {
            Self::Video
        } else {
            Self::Image
        }
    }
}

/// Whether `filename` ends in one of [`VIDEO_EXTENSIONS`].
pub fn is_video_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One generation request, immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub request_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub variant: WorkflowVariant,
    pub prompt: String,
    /// Aspect-ratio selector understood by the engine, e.g. `"1:1"`.
    pub resolution: String,
    /// Ordered LoRA identifiers (catalog `file` keys).
    pub loras: Vec<String>,
    pub upscale_factor: u32,
    /// Raw caller seed. Parsed by [`crate::seed::resolve_seed`].
    pub seed: Option<String>,
    pub workflow_template: PathBuf,
}
