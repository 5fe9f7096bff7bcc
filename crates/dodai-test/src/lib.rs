//! Test infrastructure for the OFC orchestrator and network plugin.
//!
//! Provides:
//! - [`RecordingDriver`]: in-memory controller with call log and fault injection
//! - [`fixtures`]: network ids and expected-call builders
//! - [`verification`]: call-sequence assertions

pub mod fixtures;
pub mod recording;
pub mod verification;

pub use fixtures::{calls, networks};
pub use recording::{CallKind, DriverCall, RecordingDriver};
pub use verification::*;
