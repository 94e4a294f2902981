//! Durable delayed work. Pending retention checks survive restarts.

pub mod retention_scheduler;

pub use retention_scheduler::{DueCheckHandler, PendingCheck, RetentionScheduler, SchedulerError};
