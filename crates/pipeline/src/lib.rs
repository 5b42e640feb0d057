//! Render job orchestration.
//!
//! [`JobRunner`] drives one [`JobContext`] through binding, submission,
//! streaming progress, output resolution, artifact fetch, delivery and
//! cleanup. [`monitor`] holds the progress state machine.

pub mod context;
pub mod error;
pub mod job;
pub mod monitor;

pub use context::{JobContext, JobSettings};
pub use error::JobError;
pub use job::{JobOutcome, JobRunner};
pub use monitor::{MonitorExit, MonitorMachine, MonitorState};
