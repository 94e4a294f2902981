//! Delayed follow-up on pending launches: liveness and holder retention.

pub mod retention;

pub use retention::{
    LivenessConfig, RetentionConfig, RetentionMonitor, RetentionOutcome, RetentionRequest,
};
