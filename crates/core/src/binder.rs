//! Workflow parameter binding.
//!
//! Injects the fields of a [`GenerationRequest`] into the nodes named by
//! the variant's [`VariantSchema`]. A binding whose target node is absent
//! is skipped with a warning; the request is refused only when none of the
//! variant's required bindings (prompt, resolution) could be applied.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::error::CoreError;
use crate::graph::WorkflowGraph;
use crate::lora::{append_trigger_words, effective_weight, LoraCatalog};
use crate::request::GenerationRequest;
use crate::seed::resolve_seed;
use crate::variants::{schema_for, InputBinding, VariantSchema};

/// Prefix of LoRA slots on a loader node (`lora_1`, `lora_2`, ...).
const LORA_SLOT_PREFIX: &str = "lora_";

/// Reference image names expected under `<reference_dir>/<request_id>/`.
const REFERENCE_IMAGE_NAMES: [&str; 2] = ["image1.png", "image2.png"];

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What the binder did to a graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingReport {
    /// `node.input` targets that were written.
    pub applied: Vec<String>,
    /// `node.input` targets skipped because the node was missing.
    pub skipped: Vec<String>,
    /// Final prompt text, including appended trigger words.
    pub prompt: Option<String>,
    pub seed: Option<i64>,
    /// LoRA files written to the loader node.
    pub loras: Vec<String>,
    /// Reference image paths bound (redux).
    pub reference_images: Vec<String>,
}

impl BindingReport {
    fn record(&mut self, target: InputBinding, ok: bool) -> bool {
        let label = format!("{}.{}", target.node_id, target.input);
        if ok {
            self.applied.push(label);
        } else {
            tracing::warn!(node_id = target.node_id, input = target.input, "Binding target node not found, skipping");
            self.skipped.push(label);
        }
        ok
    }

    pub fn was_applied(&self, target: &str) -> bool {
        self.applied.iter().any(|a| a == target)
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Bind `request` onto `graph` in place.
///
/// `reference_dir` is only consulted for variants that bind reference
/// images.
pub fn bind_request(
    graph: &mut WorkflowGraph,
    request: &GenerationRequest,
    catalog: &LoraCatalog,
    reference_dir: &Path,
) -> Result<BindingReport, CoreError> {
    let schema = schema_for(request.variant);
    let mut report = BindingReport::default();

    let mut required_declared = 0;
    let mut required_applied = 0;

    if let Some(target) = schema.prompt {
        required_declared += 1;
        let prompt = if schema.append_trigger_words {
            append_trigger_words(&request.prompt, &request.loras, catalog)
        } else {
            request.prompt.clone()
        };
        if report.record(target, graph.set_input(target.node_id, target.input, prompt.as_str())) {
            required_applied += 1;
        }
        report.prompt = Some(prompt);
    }

    if let Some(target) = schema.resolution {
        required_declared += 1;
        let ok = graph.set_input(target.node_id, target.input, request.resolution.as_str());
        if report.record(target, ok) {
            required_applied += 1;
        }
    }

    if required_declared > 0 && required_applied == 0 {
        return Err(CoreError::Binding(format!(
            "variant '{}': neither prompt nor resolution could be bound (skipped: {})",
            request.variant,
            report.skipped.join(", ")
        )));
    }

    if let Some(target) = schema.seed {
        let seed = resolve_seed(request.seed.as_deref(), schema.seed_policy);
        report.record(target, graph.set_input(target.node_id, target.input, seed));
        report.seed = Some(seed);
    }

    if let Some(loader) = schema.lora_loader {
        bind_loras(graph, loader, &request.loras, catalog, &mut report);
    }

    if let Some(target) = schema.upscale {
        let factor = match schema.upscale_cap {
            Some(cap) => request.upscale_factor.min(cap),
            None => request.upscale_factor,
        };
        report.record(target, graph.set_input(target.node_id, target.input, factor));
    }

    for (target, value) in schema.fixed_floats {
        report.record(*target, graph.set_input(target.node_id, target.input, *value));
    }

    bind_reference_images(graph, schema, request, reference_dir, &mut report);

    tracing::info!(
        request_id = %request.request_id,
        variant = %request.variant,
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "Bound request onto workflow",
    );
    Ok(report)
}

/// Load the request's template, bind it, and persist it back to disk when
/// the variant requires the engine to re-read it.
pub fn bind_template(
    request: &GenerationRequest,
    catalog: &LoraCatalog,
    reference_dir: &Path,
) -> Result<(WorkflowGraph, BindingReport), CoreError> {
    let mut graph = WorkflowGraph::load(&request.workflow_template)?;
    let report = bind_request(&mut graph, request, catalog, reference_dir)?;
    if schema_for(request.variant).persist_template {
        graph.save(&request.workflow_template)?;
        tracing::info!(
            path = %request.workflow_template.display(),
            "Persisted bound workflow template",
        );
    }
    Ok((graph, report))
}

fn bind_loras(
    graph: &mut WorkflowGraph,
    loader: &str,
    loras: &[String],
    catalog: &LoraCatalog,
    report: &mut BindingReport,
) {
    let Some(inputs) = graph.inputs_mut(loader) else {
        tracing::warn!(node_id = loader, "LoRA loader node not found, skipping LoRAs");
        report.skipped.push(format!("{loader}.{LORA_SLOT_PREFIX}*"));
        return;
    };

    inputs.retain(|key, _| !key.starts_with(LORA_SLOT_PREFIX));

    for (index, file) in loras.iter().enumerate() {
        let Some(entry) = catalog.get(file) else {
            tracing::warn!(lora = %file, "LoRA not found in catalog, skipping");
            continue;
        };
        let strength = effective_weight(entry.weight, loras.len());
        inputs.insert(
            format!("{LORA_SLOT_PREFIX}{}", index + 1),
            json!({"on": true, "lora": file, "strength": strength}),
        );
        tracing::info!(lora = %file, strength, "Added LoRA");
        report.loras.push(file.clone());
    }
    report.applied.push(format!("{loader}.{LORA_SLOT_PREFIX}*"));
}

fn bind_reference_images(
    graph: &mut WorkflowGraph,
    schema: &VariantSchema,
    request: &GenerationRequest,
    reference_dir: &Path,
    report: &mut BindingReport,
) {
    for (target, name) in schema.reference_images.iter().zip(REFERENCE_IMAGE_NAMES) {
        let path = locate_reference_image(reference_dir, &request.request_id, name);
        let path = to_engine_path(&path);
        report.record(*target, graph.set_input(target.node_id, target.input, Value::from(path.as_str())));
        report.reference_images.push(path);
    }
}

/// `<reference_dir>/<request_id>/<name>`, or the first file called `name`
/// anywhere under `reference_dir` when the expected one is missing.
fn locate_reference_image(reference_dir: &Path, request_id: &str, name: &str) -> PathBuf {
    let expected = reference_dir.join(request_id).join(name);
    if expected.is_file() {
        return expected;
    }
    tracing::warn!(path = %expected.display(), "Reference image missing, searching");
    let found = WalkDir::new(reference_dir)
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_file() && e.file_name() == name)
        .map(|e| e.into_path());
    match found {
        Some(path) => {
            tracing::info!(path = %path.display(), "Found reference image");
            path
        }
        None => {
            tracing::warn!(name, "Reference image not found, binding expected path");
            expected
        }
    }
}

/// Absolute path with forward slashes, the form the engine loads from.
fn to_engine_path(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    absolute.to_string_lossy().replace('\\', "/")
}
