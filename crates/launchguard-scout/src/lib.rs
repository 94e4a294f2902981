//! Block-0 forensics: bundle classification, funding-graph tracing and
//! after-the-fact launch autopsies.

pub mod autopsy;
pub mod bundle;
pub mod funding;

pub use autopsy::{AutopsyConfig, AutopsyReport, AutopsyVerdict, LaunchAutopsy};
pub use bundle::{BundleClassifier, BundleConfig};
pub use funding::{FundingAccumulator, FundingConfig, FundingTracer};
