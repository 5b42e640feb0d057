//! Render-job domain logic that does not touch the network.
//!
//! - [`request`]: the caller's [`GenerationRequest`] and workflow variants.
//! - [`variants`]: per-variant node schema table.
//! - [`binder`]: binds a request onto a [`WorkflowGraph`].
//! - [`manifest`] / [`resolver`]: output manifest model and final-artifact selection.
//! - [`cleanup`]: post-delivery file and directory sweep.

pub mod binder;
pub mod cleanup;
pub mod error;
pub mod graph;
pub mod lora;
pub mod manifest;
pub mod request;
pub mod resolver;
pub mod seed;
pub mod variants;

pub use binder::{bind_request, bind_template, BindingReport};
pub use cleanup::{run_cleanup, CleanupMode, CleanupPlan, CleanupReport};
pub use error::CoreError;
pub use graph::WorkflowGraph;
pub use lora::LoraCatalog;
pub use manifest::{ArtifactRef, OutputManifest, StorageClass};
pub use request::{GenerationRequest, MediaKind, WorkflowVariant};
pub use resolver::{resolve_output, FinalArtifact, ResolvedArtifact};
