//! Turns raw chain data into pipeline inputs: launch events from the log feed
//! and buyer sets from launch blocks.

pub mod extractor;
pub mod filter;
pub mod resolver;
pub mod stream;

pub use extractor::{block_references_tip_account, creation_mint, extract_buyers};
pub use filter::{is_launch_log, launch_from_notification};
pub use resolver::resolve_account_keys;
pub use stream::{LogSubscriptionClient, StreamConfig};
