//! Per-variant node schema table.
//!
//! Every workflow variant is described by one [`VariantSchema`] record:
//! which node inputs receive the request fields, and which output nodes
//! are preferred when resolving the final artifact. Adding a variant is
//! a matter of adding a record here.

use crate::request::{MediaKind, WorkflowVariant};

/// A single `node_id.inputs.<input>` target inside a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputBinding {
    pub node_id: &'static str,
    pub input: &'static str,
}

const fn bind(node_id: &'static str, input: &'static str) -> InputBinding {
    InputBinding { node_id, input }
}

/// How the sampler seed is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Use the caller's seed when it parses as an integer, otherwise derive one.
    CallerOrDerived,
    /// Ignore any caller seed and derive a fresh one for every request.
    AlwaysDerived,
}

/// Binding and resolution schema for one workflow variant.
#[derive(Debug, Clone, Copy)]
pub struct VariantSchema {
    pub variant: WorkflowVariant,
    pub prompt: Option<InputBinding>,
    pub resolution: Option<InputBinding>,
    pub seed: Option<InputBinding>,
    pub seed_policy: SeedPolicy,
    /// Node holding `lora_N` entries (`Power Lora Loader` style).
    pub lora_loader: Option<&'static str>,
    /// Append catalog trigger words for the selected LoRAs to the prompt.
    pub append_trigger_words: bool,
    pub upscale: Option<InputBinding>,
    /// Upper clamp applied to the upscale factor.
    pub upscale_cap: Option<u32>,
    /// Inputs forced to a constant on every request.
    pub fixed_floats: &'static [(InputBinding, f64)],
    /// Reference-image path inputs, bound to `image1.png`, `image2.png`, ...
    pub reference_images: &'static [InputBinding],
    /// Write the bound graph back over the template file.
    pub persist_template: bool,
    /// Output node ids tried first, in priority order.
    pub output_priority: &'static [&'static str],
    /// Output node ids never used for the final artifact.
    pub excluded_outputs: &'static [&'static str],
    /// Node id of the video combiner whose artifacts live under `gifs`.
    pub video_combiner: Option<&'static str>,
    pub media_kind: MediaKind,
}

const STANDARD: VariantSchema = VariantSchema {
    variant: WorkflowVariant::Standard,
    prompt: Some(bind("69", "prompt")),
    resolution: Some(bind("258", "ratio_selected")),
    seed: Some(bind("198:2", "noise_seed")),
    seed_policy: SeedPolicy::CallerOrDerived,
    lora_loader: Some("271"),
    append_trigger_words: true,
    upscale: Some(bind("279", "rescale_factor")),
    upscale_cap: None,
    fixed_floats: &[],
    reference_images: &[],
    persist_template: false,
    output_priority: &[],
    excluded_outputs: &[],
    video_combiner: None,
    media_kind: MediaKind::Image,
};

const VIDEO: VariantSchema = VariantSchema {
    variant: WorkflowVariant::Video,
    append_trigger_words: false,
    output_priority: &["42"],
    video_combiner: Some("42"),
    media_kind: MediaKind::Video,
    ..STANDARD
};

const PULID: VariantSchema = VariantSchema {
    variant: WorkflowVariant::Pulid,
    prompt: Some(bind("6", "text")),
    resolution: Some(bind("70", "ratio_selected")),
    seed: Some(bind("25", "noise_seed")),
    seed_policy: SeedPolicy::AlwaysDerived,
    lora_loader: Some("73"),
    append_trigger_words: true,
    upscale: Some(bind("77", "float")),
    upscale_cap: Some(3),
    fixed_floats: &[(bind("62", "weight"), 0.5)],
    reference_images: &[],
    persist_template: false,
    output_priority: &["72"],
    excluded_outputs: &["74:2"],
    video_combiner: None,
    media_kind: MediaKind::Image,
};

const REDUX: VariantSchema = VariantSchema {
    variant: WorkflowVariant::Redux,
    prompt: None,
    resolution: Some(bind("49", "ratio_selected")),
    seed: Some(bind("25", "noise_seed")),
    seed_policy: SeedPolicy::CallerOrDerived,
    lora_loader: None,
    append_trigger_words: false,
    upscale: None,
    upscale_cap: None,
    fixed_floats: &[],
    reference_images: &[bind("40", "image"), bind("46", "image")],
    persist_template: true,
    output_priority: &["69", "8"],
    excluded_outputs: &[],
    video_combiner: None,
    media_kind: MediaKind::Image,
};

/// Look up the schema record for a variant.
pub fn schema_for(variant: WorkflowVariant) -> &'static VariantSchema {
    match variant {
        WorkflowVariant::Standard => &STANDARD,
        WorkflowVariant::Video => &VIDEO,
        WorkflowVariant::Pulid => &PULID,
        WorkflowVariant::Redux => &REDUX,
    }
}
