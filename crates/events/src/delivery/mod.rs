//! Outbound HTTP channels to the consumer service.
//!
//! - [`relay`]: progress updates (`/update_progress`) with bounded retry.
//! - [`artifact`]: final artifact handoff (`/send_image`), single attempt.

pub mod artifact;
pub mod relay;
