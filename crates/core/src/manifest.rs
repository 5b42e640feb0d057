//! Output manifest parsed from the engine's history endpoint.
//!
//! A history entry looks like
//! `{"<prompt_id>": {"outputs": {"<node_id>": {"images": [..], "gifs": [..]}}, "status": {..}}}`.
//! Node order is kept as the engine reported it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filename prefix the engine uses for temporary preview images.
pub const TEMP_PREVIEW_PREFIX: &str = "ComfyUI_temp";

/// Filename prefix of every engine-generated artifact.
pub const GENERATED_NAME_PREFIX: &str = "ComfyUI_";

/// Storage location of an artifact on the engine side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    #[default]
    Output,
    Temp,
    Input,
}

impl StorageClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Temp => "temp",
            Self::Input => "input",
        }
    }
}

/// One artifact reference as listed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub storage_class: StorageClass,
}

impl ArtifactRef {
    pub fn is_temp_preview(&self) -> bool {
        self.filename.starts_with(TEMP_PREVIEW_PREFIX)
    }
}

/// Artifacts produced by a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ArtifactRef>,
    /// Video-combiner outputs live under this field.
    #[serde(default)]
    pub gifs: Vec<ArtifactRef>,
}

impl NodeOutput {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.gifs.is_empty()
    }
}

/// Ordered `node_id -> NodeOutput` mapping for one completed job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputManifest {
    nodes: Vec<(String, NodeOutput)>,
}

impl OutputManifest {
    pub fn new(nodes: Vec<(String, NodeOutput)>) -> Self {
        Self { nodes }
    }

    /// Parse an `outputs` object. Nodes whose output cannot be parsed are
    /// logged and dropped.
    pub fn from_outputs(outputs: &Value) -> Self {
        let Some(map) = outputs.as_object() else {
            return Self::default();
        };
        let nodes = map
            .iter()
            .filter_map(|(node_id, raw)| match NodeOutput::deserialize(raw) {
                Ok(output) => Some((node_id.clone(), output)),
                Err(e) => {
                    tracing::warn!(node_id = %node_id, error = %e, "Unparseable node output, ignoring");
                    None
                }
            })
            .collect();
        Self { nodes }
    }

    /// Extract the manifest for `prompt_id` from a `/history/<id>` body.
    ///
    /// Returns `None` when the body has no entry for that prompt yet.
    pub fn from_history(history: &Value, prompt_id: &str) -> Option<Self> {
        let entry = history.get(prompt_id)?;
        Some(Self::from_outputs(entry.get("outputs").unwrap_or(&Value::Null)))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|(_, o)| o.is_empty())
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|(id, _)| id.as_str())
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeOutput> {
        self.nodes.iter().find(|(id, _)| id == node_id).map(|(_, o)| o)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &NodeOutput)> {
        self.nodes.iter().map(|(id, o)| (id.as_str(), o))
    }

    /// Every artifact in manifest order, images before gifs within a node.
    pub fn artifacts(&self) -> impl DoubleEndedIterator<Item = &ArtifactRef> {
        self.nodes
            .iter()
            .flat_map(|(_, o)| o.images.iter().chain(o.gifs.iter()))
    }
}

/// Whether a history entry reports its prompt as finished.
///
/// An entry with `status.completed == true`, or one without a status
/// block but with at least one output node, counts as complete.
pub fn history_entry_completed(history: &Value, prompt_id: &str) -> bool {
    let Some(entry) = history.get(prompt_id) else {
        return false;
    };
    match entry.get("status").and_then(|s| s.get("completed")) {
        Some(Value::Bool(done)) => *done,
        _ => entry
            .get("outputs")
            .and_then(Value::as_object)
            .is_some_and(|o| !o.is_empty()),
    }
}
