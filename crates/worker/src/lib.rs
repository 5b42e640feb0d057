//! Process surface for running one render job.
//!
//! The binary parses the positional invocation ([`cli`]), reads
//! [`config::WorkerConfig`] from the environment, initialises logging and
//! hands the request to a [`JobRunner`].

pub mod cli;
pub mod config;
pub mod logging;

use std::sync::Arc;

use comfygen_comfyui::{ComfyUIApi, ComfyUIClient};
use comfygen_core::LoraCatalog;
use comfygen_events::{ArtifactDelivery, ProgressRelay, ProgressSink, ProgressUpdate};
use comfygen_pipeline::monitor::relay_best_effort;
use comfygen_pipeline::JobRunner;

use crate::config::WorkerConfig;

/// Wire a runner to the engine and consumer named in `config`.
pub fn build_runner(config: &WorkerConfig, catalog: LoraCatalog) -> JobRunner {
    JobRunner::new(
        ComfyUIApi::new(config.comfyui_url.clone()),
        ComfyUIClient::new(config.comfyui_ws_url.clone()),
        Arc::new(ProgressRelay::new(&config.consumer_url)),
        ArtifactDelivery::new(&config.consumer_url),
        Arc::new(catalog),
    )
}

/// First positional argument of a raw argv (program name excluded), which
/// is the request id even when the rest of the invocation is malformed.
pub fn request_id_from_args<I, S>(args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter()
        .skip(1)
        .map(Into::into)
        .find(|arg| !arg.starts_with('-'))
        .filter(|arg| !arg.trim().is_empty())
}

/// Tell the consumer a job was rejected before it started.
///
/// Without a request id there is nobody to address, so nothing is sent.
pub async fn reject_invocation(sink: &dyn ProgressSink, request_id: Option<&str>, reason: &str) {
    let Some(request_id) = request_id else {
        tracing::warn!(reason, "Invocation rejected without a request id, not relaying");
        return;
    };
    tracing::error!(request_id, reason, "Invocation rejected");
    relay_best_effort(
        sink,
        request_id,
        &ProgressUpdate::error(format!("Invalid request: {reason}")),
    )
    .await;
}
