//! Positional invocation, as issued by the bot that dispatches jobs.
//!
//! ```text
//! comfygen-worker <request_id> <user_id> <channel_id> <interaction_id> \
//!     <original_message_id> <request_type> <prompt> <resolution> \
//!     <loras_json> <upscale_factor> <workflow_template> [seed]
//! ```

use std::path::PathBuf;

use clap::Parser;
use comfygen_core::{CoreError, GenerationRequest, WorkflowVariant};

#[derive(Debug, Clone, Parser)]
#[command(name = "comfygen-worker", version, about = "Run one ComfyUI render job")]
pub struct Invocation {
    pub request_id: String,
    pub user_id: String,
    pub channel_id: String,
    /// Opaque to the worker; kept for log correlation.
    pub interaction_id: String,
    pub original_message_id: String,
    /// `standard`, `video`, `pulid` or `redux`.
    pub request_type: WorkflowVariant,
    #[arg(allow_hyphen_values = true)]
    pub prompt: String,
    pub resolution: String,
    /// JSON array of LoRA file names, e.g. `["detail.safetensors"]`.
    pub loras: String,
    pub upscale_factor: u32,
    pub workflow_template: PathBuf,
    /// Integer seed; anything else derives one.
    #[arg(allow_hyphen_values = true)]
    pub seed: Option<String>,
}

impl Invocation {
    /// Build the immutable request. Fails only on a malformed LoRA list.
    pub fn into_request(self) -> Result<GenerationRequest, CoreError> {
        let loras = parse_lora_list(&self.loras)?;
        Ok(GenerationRequest {
            request_id: self.request_id,
            user_id: self.user_id,
            channel_id: self.channel_id,
            variant: self.request_type,
            prompt: self.prompt,
            resolution: self.resolution,
            loras,
            upscale_factor: self.upscale_factor,
            seed: self.seed,
            workflow_template: self.workflow_template,
        })
    }
}

/// Empty input and `null` mean no LoRAs.
pub fn parse_lora_list(raw: &str) -> Result<Vec<String>, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
        .map_err(|e| CoreError::Validation(format!("LoRA list must be a JSON array of strings: {e}")))
}
