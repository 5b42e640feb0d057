//! Streaming progress monitor.
//!
//! [`MonitorMachine`] is the pure state machine: it consumes typed engine
//! messages for one prompt and decides what to relay and when the job is
//! done. [`drive`] feeds it from a websocket stream under a per-read
//! timeout, an overall deadline and a cancellation token.
//!
//! ```text
//! Connecting -> AwaitingStart -> Executing <-> Caching -> Completed
//!          \_____________\____________\___________\____> Failed
//! ```

use std::collections::HashSet;
use std::time::Duration;

use comfygen_comfyui::messages::{is_telemetry_frame, parse_message, ComfyUIMessage};
use comfygen_core::WorkflowGraph;
use comfygen_events::{ProgressSink, ProgressUpdate};
use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

/// Progress is relayed at most once per multiple of this step.
pub const WATERMARK_STEP: u8 = 5;

/// Node classes whose execution means the engine is loading model weights.
pub const MODEL_LOADER_CLASSES: &[&str] = &[
    "UNETLoader",
    "CLIPLoader",
    "DualCLIPLoader",
    "VAELoader",
    "CheckpointLoaderSimple",
];

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Connecting,
    AwaitingStart,
    Executing,
    Caching,
    Completed,
    Failed,
}

impl MonitorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// What the driver should do after a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Keep reading, optionally relaying an update first.
    Continue(Option<ProgressUpdate>),
    /// The tracked prompt finished.
    Completed,
    /// The engine reported a failure for the tracked prompt.
    Failed(String),
}

/// Completion state machine for a single prompt.
#[derive(Debug)]
pub struct MonitorMachine {
    prompt_id: String,
    state: MonitorState,
    watermark: u8,
    loader_nodes: HashSet<String>,
    loading_relayed: bool,
}

impl MonitorMachine {
    /// * `loader_nodes` - node ids whose execution relays `loading_models`.
    pub fn new(prompt_id: impl Into<String>, loader_nodes: HashSet<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            state: MonitorState::Connecting,
            watermark: 0,
            loader_nodes,
            loading_relayed: false,
        }
    }

    /// Build a machine whose loader set comes from the bound graph.
    pub fn for_graph(prompt_id: impl Into<String>, graph: &WorkflowGraph) -> Self {
        let loader_nodes = graph
            .as_map()
            .keys()
            .filter(|id| {
                graph
                    .class_type(id)
                    .is_some_and(|class| MODEL_LOADER_CLASSES.contains(&class))
            })
            .cloned()
            .collect();
        Self::new(prompt_id, loader_nodes)
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn prompt_id(&self) -> &str {
        &self.prompt_id
    }

    /// Highest progress multiple already relayed.
    pub fn watermark(&self) -> u8 {
        self.watermark
    }

    /// The stream is open; start waiting for `execution_start`.
    pub fn stream_opened(&mut self) {
        if self.state == MonitorState::Connecting {
            self.state = MonitorState::AwaitingStart;
        }
    }

    fn is_tracked(&self, prompt_id: Option<&str>) -> bool {
        prompt_id.map_or(true, |id| id == self.prompt_id)
    }

    fn resume_executing(&mut self) {
        if matches!(self.state, MonitorState::AwaitingStart | MonitorState::Caching) {
            self.state = MonitorState::Executing;
        }
    }

    /// Advance on one engine message.
    pub fn on_message(&mut self, msg: &ComfyUIMessage) -> Transition {
        if self.state.is_terminal() {
            return Transition::Continue(None);
        }
        match msg {
            ComfyUIMessage::Status(data) => {
                tracing::debug!(
                    queue_remaining = data.status.exec_info.queue_remaining,
                    "ComfyUI queue status",
                );
                Transition::Continue(None)
            }
            ComfyUIMessage::ExecutionStart(data) if self.is_tracked(Some(data.prompt_id.as_str())) => {
                tracing::info!(prompt_id = %data.prompt_id, "Execution started");
                self.state = MonitorState::Executing;
                Transition::Continue(Some(ProgressUpdate::execution()))
            }
            ComfyUIMessage::ExecutionCached(data) if self.is_tracked(Some(data.prompt_id.as_str())) => {
                tracing::debug!(cached_nodes = data.nodes.len(), "Execution used cache");
                self.state = MonitorState::Caching;
                Transition::Continue(Some(ProgressUpdate::cached()))
            }
            ComfyUIMessage::Executing(data) if self.is_tracked(data.prompt_id.as_deref()) => {
                if data.completes(&self.prompt_id) {
                    tracing::info!(prompt_id = %self.prompt_id, "Execution completed (all nodes done)");
                    self.state = MonitorState::Completed;
                    return Transition::Completed;
                }
                self.resume_executing();
                let Some(node) = data.node.as_deref() else {
                    return Transition::Continue(None);
                };
                tracing::debug!(node = %node, "Executing node");
                if !self.loading_relayed && self.loader_nodes.contains(node) {
                    self.loading_relayed = true;
                    return Transition::Continue(Some(ProgressUpdate::loading_models()));
                }
                Transition::Continue(None)
            }
            ComfyUIMessage::Progress(data) if self.is_tracked(data.prompt_id.as_deref()) => {
                self.resume_executing();
                let percent = data.percent();
                let milestone = percent - percent % WATERMARK_STEP;
                tracing::trace!(value = data.value, max = data.max, percent, "Generation progress");
                if milestone > self.watermark {
                    self.watermark = milestone;
                    Transition::Continue(Some(ProgressUpdate::generating(percent)))
                } else {
                    Transition::Continue(None)
                }
            }
            ComfyUIMessage::Executed(data) if self.is_tracked(Some(data.prompt_id.as_str())) => {
                // Per-node output; completion is signalled by `executing` only.
                tracing::debug!(node = %data.node, "Node executed with output");
                Transition::Continue(None)
            }
            ComfyUIMessage::ExecutionSuccess(data) if self.is_tracked(Some(data.prompt_id.as_str())) => {
                tracing::debug!("Engine reported execution success");
                Transition::Continue(None)
            }
            ComfyUIMessage::ExecutionError(data) if self.is_tracked(Some(data.prompt_id.as_str())) => {
                tracing::error!(
                    node_id = %data.node_id,
                    node_type = %data.node_type,
                    error_type = %data.exception_type,
                    error_message = %data.exception_message,
                    "Execution error",
                );
                self.state = MonitorState::Failed;
                Transition::Failed(data.exception_message.clone())
            }
            ComfyUIMessage::ExecutionInterrupted(data) if self.is_tracked(Some(data.prompt_id.as_str())) => {
                tracing::warn!(node_id = ?data.node_id, "Execution interrupted");
                self.state = MonitorState::Failed;
                Transition::Failed("Execution interrupted".to_string())
            }
            ComfyUIMessage::Error(data) => {
                tracing::error!(error_message = %data.message, "Engine error");
                self.state = MonitorState::Failed;
                Transition::Failed(data.message.clone())
            }
            _ => {
                tracing::trace!("Ignoring message for another prompt");
                Transition::Continue(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// How the monitor loop ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorExit {
    /// `executing{node: null}` arrived for the tracked prompt.
    Completed,
    /// The stream ended before the completion signal.
    StreamEnded(String),
}

/// Relay an update, logging and swallowing failures.
pub async fn relay_best_effort(sink: &dyn ProgressSink, request_id: &str, update: &ProgressUpdate) {
    if let Err(e) = sink.send(request_id, update).await {
        tracing::warn!(
            request_id,
            status = update.status(),
            error = %e,
            "Dropping progress update",
        );
    }
}

/// Deadlines for [`drive`].
#[derive(Debug, Clone)]
pub struct MonitorLimits {
    pub read_timeout: Duration,
    pub job_timeout: Duration,
    pub cancel: CancellationToken,
}

/// Read `stream` until the machine reaches a terminal state, the stream
/// ends, the deadline passes, or `cancel` fires.
///
/// A per-read timeout only loops; the overall deadline is
/// [`JobError::Timeout`]. Unparseable and telemetry frames are dropped.
/// The caller owns the stream and must close it afterwards.
pub async fn drive<S>(
    stream: &mut S,
    machine: &mut MonitorMachine,
    sink: &dyn ProgressSink,
    request_id: &str,
    limits: &MonitorLimits,
) -> Result<MonitorExit, JobError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    machine.stream_opened();
    let deadline = tokio::time::Instant::now() + limits.job_timeout;

    loop {
        let next = tokio::select! {
            _ = limits.cancel.cancelled() => {
                tracing::info!(prompt_id = %machine.prompt_id(), "Monitor cancelled");
                return Err(JobError::Cancelled);
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::error!(prompt_id = %machine.prompt_id(), "Monitor deadline exceeded");
                return Err(JobError::Timeout(limits.job_timeout));
            }
            next = tokio::time::timeout(limits.read_timeout, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                tracing::trace!("No frame within read timeout");
                continue;
            }
            Ok(None) => return Ok(MonitorExit::StreamEnded("stream exhausted".to_string())),
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "WebSocket receive error");
                return Ok(MonitorExit::StreamEnded(e.to_string()));
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Binary(_) => {
                tracing::trace!("Ignoring binary message (preview image)");
                continue;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            Message::Close(frame) => {
                tracing::info!(?frame, "ComfyUI WebSocket closed");
                return Ok(MonitorExit::StreamEnded("closed by engine".to_string()));
            }
        };

        if is_telemetry_frame(&text) {
            continue;
        }
        let msg = match parse_message(&text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
                continue;
            }
        };

        match machine.on_message(&msg) {
            Transition::Continue(Some(update)) => relay_best_effort(sink, request_id, &update).await,
            Transition::Continue(None) => {}
            Transition::Completed => return Ok(MonitorExit::Completed),
            Transition::Failed(message) => return Err(JobError::Execution(message)),
        }
    }
}
