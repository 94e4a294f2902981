use crate::error::{ChainError, SinkError};
use crate::types::{Block, BlockTransaction, Signal, SignatureInfo};
use async_trait::async_trait;

/// Read side of the blockchain client. Implementations are expected to pace
/// their own requests; callers issue lookups one at a time.
#[async_trait]
pub trait ChainDataSource: Send + Sync {
    /// Full block by slot. `Ok(None)` when the block carries no transactions.
    async fn fetch_block(&self, slot: u64) -> Result<Option<Block>, ChainError>;

    /// Signature history of an address, newest first.
    async fn address_history(
        &self,
        address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>, ChainError>;

    /// Single transaction by signature. `Ok(None)` when the node does not know it.
    async fn fetch_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<BlockTransaction>, ChainError>;

    /// Current UI balance of `mint` held by `owner` across all its token accounts.
    async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64, ChainError>;
}

/// Append-only destination for emitted signals.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn append(&self, signal: &Signal) -> Result<(), SinkError>;
}
