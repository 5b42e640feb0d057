//! End-to-end render job: bind, submit, monitor, resolve, fetch, deliver,
//! clean up.
//!
//! The consumer sees either one `complete` event followed by one artifact
//! delivery, or one `error` event. Never both.

use std::path::PathBuf;
use std::sync::Arc;

use comfygen_comfyui::{fetch_artifact, ComfyUIApi, ComfyUIClient, JobHandle};
use comfygen_core::manifest::history_entry_completed;
use comfygen_core::{
    bind_template, resolve_output, run_cleanup, CleanupPlan, CleanupReport, LoraCatalog,
    MediaKind, OutputManifest, ResolvedArtifact,
};
use comfygen_events::{ArtifactDelivery, ProgressSink, ProgressUpdate};
use tracing::Instrument;

use crate::context::JobContext;
use crate::error::JobError;
use crate::monitor::{drive, relay_best_effort, MonitorExit, MonitorLimits, MonitorMachine};

/// What a successful job produced.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub prompt_id: String,
    pub filename: String,
    pub media_kind: MediaKind,
    /// `false` when the consumer handoff failed; the artifact stays on disk.
    pub delivered: bool,
    /// Present only when delivery succeeded and cleanup ran.
    pub cleanup: Option<CleanupReport>,
    /// Seconds from job start to the `complete` event.
    pub generation_time: f64,
}

/// Runs render jobs against one engine and one consumer.
///
/// Holds no per-job state; a single runner may drive many jobs
/// concurrently, each with its own [`JobContext`].
#[derive(Clone)]
pub struct JobRunner {
    api: ComfyUIApi,
    ws: ComfyUIClient,
    sink: Arc<dyn ProgressSink>,
    delivery: ArtifactDelivery,
    catalog: Arc<LoraCatalog>,
}

impl JobRunner {
    pub fn new(
        api: ComfyUIApi,
        ws: ComfyUIClient,
        sink: Arc<dyn ProgressSink>,
        delivery: ArtifactDelivery,
        catalog: Arc<LoraCatalog>,
    ) -> Self {
        Self {
            api,
            ws,
            sink,
            delivery,
            catalog,
        }
    }

    /// Run one job to completion.
    ///
    /// On failure exactly one `error` update is relayed (best effort)
    /// before the error is returned.
    pub async fn run(&self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let span = ctx.span();
        async {
            relay_best_effort(self.sink.as_ref(), ctx.request_id(), &ProgressUpdate::starting())
                .await;

            match self.execute(ctx).await {
                Ok(outcome) => {
                    tracing::info!(
                        prompt_id = %outcome.prompt_id,
                        filename = %outcome.filename,
                        delivered = outcome.delivered,
                        generation_time = outcome.generation_time,
                        "Job finished",
                    );
                    Ok(outcome)
                }
                Err(e) => {
                    tracing::error!(error_kind = e.kind(), error = %e, "Job failed");
                    relay_best_effort(
                        self.sink.as_ref(),
                        ctx.request_id(),
                        &ProgressUpdate::error(e.to_string()),
                    )
                    .await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let request = &ctx.request;

        let (graph, report) =
            bind_template(request, &self.catalog, &ctx.settings.reference_dir)?;
        tracing::debug!(seed = ?report.seed, loras = report.loras.len(), "Workflow bound");

        // Connect before submitting so no early frame is missed.
        let mut conn = tokio::time::timeout(
            ctx.settings.job_timeout,
            self.ws.connect(&ctx.client_id),
        )
        .await
        .map_err(|_| JobError::Timeout(ctx.settings.job_timeout))??;
        if let Err(e) = conn.clear_cache().await {
            tracing::warn!(error = %e, "Could not clear engine cache, continuing");
        }

        let handle = match self.api.submit_workflow(graph.as_map(), &ctx.client_id).await {
            Ok(handle) => handle,
            Err(e) => {
                conn.close().await;
                return Err(e.into());
            }
        };

        let mut machine = MonitorMachine::for_graph(&handle.prompt_id, &graph);
        let limits = MonitorLimits {
            read_timeout: ctx.settings.read_timeout,
            job_timeout: ctx.settings.job_timeout,
            cancel: ctx.cancel.clone(),
        };
        let exit = drive(
            &mut conn.ws_stream,
            &mut machine,
            self.sink.as_ref(),
            ctx.request_id(),
            &limits,
        )
        .await;
        conn.close().await;

        let manifest = self.completed_manifest(&handle, exit?).await?;
        let resolved = resolve_output(&manifest, request.variant)?;
        let artifact = fetch_artifact(&self.api, &resolved.artifact).await?;

        let generation_time = ctx.started_at.elapsed().as_secs_f64();
        relay_best_effort(
            self.sink.as_ref(),
            ctx.request_id(),
            &ProgressUpdate::complete(generation_time),
        )
        .await;

        let delivered = match self.delivery.deliver(ctx.request_id(), &artifact).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    filename = %artifact.filename,
                    error = %e,
                    "Artifact delivery failed, leaving files in place",
                );
                false
            }
        };

        let cleanup = if delivered {
            Some(self.cleanup(ctx, &resolved).await)
        } else {
            None
        };

        Ok(JobOutcome {
            prompt_id: handle.prompt_id,
            filename: artifact.filename,
            media_kind: artifact.media_kind,
            delivered,
            cleanup,
            generation_time,
        })
    }

    /// Fetch history once and build the manifest. A stream that ended
    /// early still counts as completion if history says so.
    async fn completed_manifest(
        &self,
        handle: &JobHandle,
        exit: MonitorExit,
    ) -> Result<OutputManifest, JobError> {
        let history = self.api.get_history(&handle.prompt_id).await?;

        if let MonitorExit::StreamEnded(reason) = exit {
            if !history_entry_completed(&history, &handle.prompt_id) {
                return Err(JobError::Protocol(format!(
                    "Progress stream ended before completion ({reason})"
                )));
            }
            tracing::info!(
                prompt_id = %handle.prompt_id,
                "Stream ended early but history shows the prompt completed",
            );
        }

        Ok(OutputManifest::from_history(&history, &handle.prompt_id).unwrap_or_default())
    }

    async fn cleanup(&self, ctx: &JobContext, resolved: &ResolvedArtifact) -> CleanupReport {
        let settings = &ctx.settings;
        let mut plan = CleanupPlan::new(
            ctx.request_id(),
            Some(ctx.request.workflow_template.as_path()),
            settings.output_dirs.clone(),
            settings.cleanup_mode,
        );
        for dir in &settings.output_dirs {
            plan.track_output(artifact_path(dir, resolved));
        }

        match tokio::task::spawn_blocking(move || run_cleanup(&plan)).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Cleanup task panicked");
                CleanupReport {
                    failures: 1,
                    ..CleanupReport::default()
                }
            }
        }
    }
}

fn artifact_path(dir: &std::path::Path, resolved: &ResolvedArtifact) -> PathBuf {
    let artifact = &resolved.artifact;
    let mut path = dir.to_path_buf();
    if !artifact.subfolder.is_empty() {
        path.push(&artifact.subfolder);
    }
    path.push(&artifact.filename);
    path
}
