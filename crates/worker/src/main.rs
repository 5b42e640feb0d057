//! `comfygen-worker` -- runs a single render job and exits.
//!
//! Exit status is `0` when the artifact was produced (even if the consumer
//! handoff failed) and `1` for any job failure. Argument errors exit with
//! clap's usage status after relaying an `error` update when the request id
//! is known. See [`WorkerConfig::from_env`] for the environment.

use std::process::ExitCode;

use clap::Parser;
use comfygen_core::LoraCatalog;
use comfygen_events::ProgressRelay;
use comfygen_pipeline::JobContext;
use comfygen_worker::cli::Invocation;
use comfygen_worker::config::{LogFormat, WorkerConfig};
use comfygen_worker::{build_runner, logging, reject_invocation, request_id_from_args};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let log_format: LogFormat = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    logging::init(log_format);
    let config = WorkerConfig::from_env();

    let invocation = match Invocation::try_parse() {
        Ok(invocation) => invocation,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            let request_id = request_id_from_args(std::env::args());
            let relay = ProgressRelay::new(&config.consumer_url);
            let reason = e.kind().as_str().unwrap_or("malformed arguments");
            reject_invocation(&relay, request_id.as_deref(), reason).await;
            return ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(2));
        }
    };
    tracing::info!(
        request_id = %invocation.request_id,
        request_type = %invocation.request_type,
        interaction_id = %invocation.interaction_id,
        original_message_id = %invocation.original_message_id,
        "Processing request",
    );

    let request_id = invocation.request_id.clone();
    let request = match invocation.into_request() {
        Ok(request) => request,
        Err(e) => {
            let relay = ProgressRelay::new(&config.consumer_url);
            reject_invocation(&relay, Some(&request_id), &e.to_string()).await;
            return ExitCode::FAILURE;
        }
    };

    let catalog = match LoraCatalog::load(&config.lora_catalog_path) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!(
                path = %config.lora_catalog_path.display(),
                error = %e,
                "LoRA catalog unreadable, continuing without it",
            );
            LoraCatalog::default()
        }
    };

    tracing::info!(
        comfyui_url = %config.comfyui_url,
        consumer_url = %config.consumer_url,
        cleanup_mode = %config.cleanup_mode,
        "Starting comfygen-worker",
    );

    let runner = build_runner(&config, catalog);
    let ctx = JobContext::new(request, config.job_settings());

    match runner.run(&ctx).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
