pub mod chain;
pub mod constants;
pub mod error;
pub mod rate_limit;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use chain::{ChainDataSource, SignalSink};
pub use error::{AnalysisError, ChainError, SinkError, Stage};
pub use rate_limit::RequestPacer;
pub use types::*;
