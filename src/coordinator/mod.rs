//! Per-launch state machine: block-0 analysis, farm signals and hand-off to
//! the delayed retention check.

pub mod launch;
pub mod registry;
pub mod retention_runner;

pub use launch::LaunchCoordinator;
pub use registry::{LaunchRegistry, TransitionError};
pub use retention_runner::RetentionCheckRunner;
