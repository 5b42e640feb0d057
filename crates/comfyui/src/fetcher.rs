//! Artifact download with storage-location fallback.
//!
//! A `/view` request that fails with an HTTP error status is retried,
//! once per step:
//!
//! 1. under the `temp` storage class, if the original request used `output`;
//! 2. if the filename carries the engine's generated-name prefix, with the
//!    most recent artifact in `/history` sharing that prefix.
//!
//! Transport errors are not retried. When the chain is exhausted the
//! original error is returned.

use comfygen_core::manifest::{ArtifactRef, OutputManifest, StorageClass, GENERATED_NAME_PREFIX};
use comfygen_core::{FinalArtifact, MediaKind};
use serde_json::Value;

use crate::api::{ComfyUIApi, ComfyUIApiError};

/// Fetch the bytes of `artifact`, following the fallback chain.
pub async fn fetch_artifact(
    api: &ComfyUIApi,
    artifact: &ArtifactRef,
) -> Result<FinalArtifact, ComfyUIApiError> {
    let original = match api
        .view(&artifact.filename, &artifact.subfolder, artifact.storage_class)
        .await
    {
        Ok(bytes) => return Ok(final_artifact(&artifact.filename, bytes)),
        Err(e @ ComfyUIApiError::ApiError { .. }) => e,
        Err(e) => return Err(e),
    };

    tracing::warn!(
        filename = %artifact.filename,
        storage_class = artifact.storage_class.as_str(),
        error = %original,
        "Artifact download failed, trying fallbacks",
    );

    if artifact.storage_class == StorageClass::Output {
        match api
            .view(&artifact.filename, &artifact.subfolder, StorageClass::Temp)
            .await
        {
            Ok(bytes) => {
                tracing::info!(filename = %artifact.filename, "Artifact found under temp storage");
                return Ok(final_artifact(&artifact.filename, bytes));
            }
            Err(e) => {
                tracing::warn!(filename = %artifact.filename, error = %e, "Temp storage retry failed");
            }
        }
    }

    if artifact.filename.starts_with(GENERATED_NAME_PREFIX) {
        match api.get_all_history().await {
            Ok(history) => {
                if let Some(candidate) = latest_with_prefix(&history, GENERATED_NAME_PREFIX) {
                    tracing::info!(
                        filename = %candidate.filename,
                        "Retrying with most recent generated artifact from history",
                    );
                    match api
                        .view(&candidate.filename, &candidate.subfolder, candidate.storage_class)
                        .await
                    {
                        Ok(bytes) => return Ok(final_artifact(&candidate.filename, bytes)),
                        Err(e) => {
                            tracing::warn!(filename = %candidate.filename, error = %e, "History fallback failed");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load history for fallback search");
            }
        }
    }

    Err(original)
}

fn final_artifact(filename: &str, bytes: Vec<u8>) -> FinalArtifact {
    tracing::info!(filename, size = bytes.len(), "Retrieved artifact");
    FinalArtifact {
        media_kind: MediaKind::from_filename(filename),
        filename: filename.to_string(),
        bytes,
    }
}

/// Most recent artifact in a `/history` body whose filename starts with
/// `prefix`. Jobs are searched newest first.
fn latest_with_prefix(history: &Value, prefix: &str) -> Option<ArtifactRef> {
    let jobs = history.as_object()?;
    jobs.values().rev().find_map(|job| {
        let manifest = OutputManifest::from_outputs(job.get("outputs")?);
        let found = manifest
            .artifacts()
            .find(|a| a.filename.starts_with(prefix))
            .cloned();
        found
    })
}
