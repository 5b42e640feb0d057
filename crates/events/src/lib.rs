//! Consumer-facing notifications for render jobs.
//!
//! - [`ProgressUpdate`]: the status vocabulary relayed while a job runs.
//! - [`ProgressSink`]: where updates go; [`ProgressRelay`] posts them to
//!   the consumer with bounded retry.
//! - [`ArtifactDelivery`]: hands the final artifact to the consumer.

pub mod delivery;
pub mod progress;

pub use delivery::artifact::{ArtifactDelivery, DeliveryError};
pub use delivery::relay::{ProgressRelay, RelayError, RetryPolicy};
pub use progress::{ProgressSink, ProgressUpdate};
