//! Read-only LoRA catalog lookup.
//!
//! The catalog is a JSON document of the form
//! `{"available_loras": [{"file": "...", "weight": 1.0, "add_prompt": "..."}]}`.
//! Only lookup by `file` is provided; editing the catalog is out of scope.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::CoreError;

/// Per-LoRA weight cap applied when more than one LoRA is selected.
pub const MULTI_LORA_WEIGHT_CAP: f64 = 0.5;

/// One catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct LoraEntry {
    pub file: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Trigger words appended to the prompt when the LoRA is selected.
    #[serde(default)]
    pub add_prompt: String,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    available_loras: Vec<LoraEntry>,
}

/// LoRA metadata keyed by file identifier.
#[derive(Debug, Clone, Default)]
pub struct LoraCatalog {
    entries: HashMap<String, LoraEntry>,
}

impl LoraCatalog {
    /// Build a catalog from already-loaded entries.
    pub fn from_entries(entries: impl IntoIterator<Item = LoraEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.file.clone(), e)).collect(),
        }
    }

    /// Parse a catalog document.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let file: CatalogFile =
            serde_json::from_str(text).map_err(|e| CoreError::Catalog(e.to_string()))?;
        Ok(Self::from_entries(file.available_loras))
    }

    /// Load the catalog file. A missing file yields an empty catalog.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let catalog = Self::from_json(&text)?;
                tracing::info!(
                    path = %path.display(),
                    count = catalog.len(),
                    "Loaded LoRA catalog",
                );
                Ok(catalog)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "LoRA catalog not found, using empty catalog");
                Ok(Self::default())
            }
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    pub fn get(&self, file: &str) -> Option<&LoraEntry> {
        self.entries.get(file)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Effective strength for a LoRA given how many were selected.
pub fn effective_weight(catalog_weight: f64, selected_count: usize) -> f64 {
    if selected_count > 1 {
        catalog_weight.min(MULTI_LORA_WEIGHT_CAP)
    } else {
        catalog_weight
    }
}

/// Append each selected LoRA's trigger words to `prompt`, skipping words
/// that already appear in it.
pub fn append_trigger_words(prompt: &str, loras: &[String], catalog: &LoraCatalog) -> String {
    let mut out = prompt.to_string();
    for file in loras {
        let Some(entry) = catalog.get(file) else {
            continue;
        };
        let words = entry.add_prompt.trim();
        if words.is_empty() || out.contains(words) {
            continue;
        }
        if out.is_empty() {
            out.push_str(words);
        } else {
            out.push_str(", ");
            out.push_str(words);
        }
        tracing::debug!(lora = %file, trigger_words = %words, "Appended LoRA trigger words");
    }
    out
}
