//! Common types used throughout the pipeline.
//!
//! Re-exports the decoded log event and the durable log's record types.

mod event;
mod record;

pub use event::*;
pub use record::*;
