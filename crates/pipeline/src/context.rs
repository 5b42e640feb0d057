//! Per-job context threaded through every pipeline stage.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use comfygen_core::{CleanupMode, GenerationRequest};
use tokio_util::sync::CancellationToken;

/// Overall deadline for the monitor phase.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-read timeout on the progress stream.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables shared by every job a worker runs.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub job_timeout: Duration,
    pub read_timeout: Duration,
    /// Directories swept by post-delivery cleanup.
    pub output_dirs: Vec<PathBuf>,
    /// Root of `<request_id>/image{1,2}.png` reference images.
    pub reference_dir: PathBuf,
    pub cleanup_mode: CleanupMode,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            job_timeout: DEFAULT_JOB_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            output_dirs: vec![PathBuf::from("output")],
            reference_dir: PathBuf::from("output"),
            cleanup_mode: CleanupMode::default(),
        }
    }
}

/// Everything one job needs, owned by that job alone.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub request: GenerationRequest,
    /// Caller-issued id the engine addresses progress frames to.
    pub client_id: String,
    pub settings: JobSettings,
    pub cancel: CancellationToken,
    pub started_at: Instant,
}

impl JobContext {
    /// New context with a fresh UUID v4 `client_id`.
    pub fn new(request: GenerationRequest, settings: JobSettings) -> Self {
        Self {
            request,
            client_id: uuid::Uuid::new_v4().to_string(),
            settings,
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request.request_id
    }

    /// Span carrying the job's identifying fields.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "job",
            request_id = %self.request.request_id,
            variant = %self.request.variant,
            client_id = %self.client_id,
        )
    }
}
