//! Final-artifact selection over an [`OutputManifest`].
//!
//! Resolution runs in stages and stops at the first hit:
//!
//! 1. the variant's preferred nodes, in priority order, skipping temp previews;
//! 2. every node, last to first, skipping temp previews;
//! 3. every node, last to first, temp previews allowed (logged);
//! 4. [`CoreError::NoOutput`].
//!
//! Within a node the last qualifying entry wins. A video-combiner node
//! contributes only its `gifs` entries with a video extension. Nodes the
//! variant excludes are never considered.

use serde::Serialize;

use crate::error::CoreError;
use crate::manifest::{ArtifactRef, NodeOutput, OutputManifest};
use crate::request::{is_video_filename, MediaKind, WorkflowVariant};
use crate::variants::{schema_for, VariantSchema};

/// Which resolution stage produced the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    Preferred,
    AnyNode,
    Degraded,
}

/// An artifact chosen for delivery, before its bytes are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub node_id: String,
    pub artifact: ArtifactRef,
    pub media_kind: MediaKind,
    pub stage: ResolutionStage,
}

/// A fetched artifact ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalArtifact {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub media_kind: MediaKind,
}

/// Pick the final artifact for `variant` from `manifest`.
pub fn resolve_output(
    manifest: &OutputManifest,
    variant: WorkflowVariant,
) -> Result<ResolvedArtifact, CoreError> {
    let schema = schema_for(variant);

    for node_id in schema.output_priority {
        if let Some(output) = manifest.get(node_id) {
            if let Some(artifact) = pick(schema, node_id, output, true) {
                return Ok(resolved(node_id, artifact, ResolutionStage::Preferred));
            }
            tracing::debug!(node_id, "Preferred output node has no usable artifact");
        }
    }

    let candidates = || {
        manifest
            .iter()
            .rev()
            .filter(|(id, _)| !schema.excluded_outputs.contains(id))
    };

    for (node_id, output) in candidates() {
        if let Some(artifact) = pick(schema, node_id, output, true) {
            return Ok(resolved(node_id, artifact, ResolutionStage::AnyNode));
        }
    }

    for (node_id, output) in candidates() {
        if let Some(artifact) = pick(schema, node_id, output, false) {
            tracing::warn!(
                node_id,
                filename = %artifact.filename,
                "No non-temp artifact found, falling back to temp preview",
            );
            return Ok(resolved(node_id, artifact, ResolutionStage::Degraded));
        }
    }

    let nodes: Vec<&str> = manifest.node_ids().collect();
    Err(CoreError::NoOutput(format!(
        "variant '{variant}': no artifact in output nodes [{}]",
        nodes.join(", ")
    )))
}

fn resolved(node_id: &str, artifact: &ArtifactRef, stage: ResolutionStage) -> ResolvedArtifact {
    ResolvedArtifact {
        node_id: node_id.to_string(),
        artifact: artifact.clone(),
        media_kind: MediaKind::from_filename(&artifact.filename),
        stage,
    }
}

/// Last qualifying artifact of one node.
fn pick<'a>(
    schema: &VariantSchema,
    node_id: &str,
    output: &'a NodeOutput,
    skip_temp: bool,
) -> Option<&'a ArtifactRef> {
    let is_combiner = schema.video_combiner == Some(node_id);
    let entries: &[ArtifactRef] = if is_combiner { &output.gifs } else { &output.images };
    entries
        .iter()
        .rev()
        .filter(|a| !is_combiner || is_video_filename(&a.filename))
        .find(|a| !(skip_temp && a.is_temp_preview()))
}
