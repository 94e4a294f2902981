//! Launch-integrity monitor for pump.fun token launches.
//!
//! Watches the launch program's logs, classifies each launch block as a
//! bundled farm or pending, traces buyer funding, and confirms survivors with
//! a delayed retention check. Pipeline stages live in the `launchguard-*`
//! crates; this crate wires them to the Solana RPC, configuration and
//! persistence.

pub mod chain;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod logging;
pub mod scheduler;

pub use chain::RpcChainSource;
pub use config::{ConfigError, Settings};
pub use coordinator::{LaunchCoordinator, LaunchRegistry, RetentionCheckRunner};
pub use database::{SignalRecorder, SignalStore};
pub use scheduler::{PendingCheck, RetentionScheduler};
