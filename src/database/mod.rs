//! Signal persistence: an append-only JSON-lines store fed from the signal bus.

pub mod recorder;
pub mod signal_store;

pub use recorder::SignalRecorder;
pub use signal_store::SignalStore;
