//! In-memory collaborators for unit tests.

use crate::chain::{ChainDataSource, SignalSink};
use crate::error::{ChainError, SinkError};
use crate::types::{AccountKeys, Block, BlockTransaction, Signal, SignatureInfo};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// `ChainDataSource` backed by maps. Histories are stored newest-first.
#[derive(Debug, Default)]
pub struct InMemoryChain {
    blocks: HashMap<u64, Block>,
    histories: HashMap<String, Vec<SignatureInfo>>,
    transactions: HashMap<String, BlockTransaction>,
    balances: HashMap<(String, String), f64>,
    failing_histories: HashSet<String>,
    failing_balances: HashSet<String>,
    /// Block fetches that return `Ok(None)` before the block shows up
    block_lag: usize,
    block_calls: AtomicUsize,
    history_calls: AtomicUsize,
    balance_calls: AtomicUsize,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.insert(block.slot, block);
        self
    }

    pub fn with_block_lag(mut self, attempts: usize) -> Self {
        self.block_lag = attempts;
        self
    }

    pub fn with_history(mut self, address: &str, entries: Vec<SignatureInfo>) -> Self {
        self.histories.insert(address.to_string(), entries);
        self
    }

    pub fn with_transaction(mut self, tx: BlockTransaction) -> Self {
        if let Some(sig) = tx.signature() {
            self.transactions.insert(sig.to_string(), tx);
        }
        self
    }

    pub fn with_balance(mut self, owner: &str, mint: &str, amount: f64) -> Self {
        self.balances
            .insert((owner.to_string(), mint.to_string()), amount);
        self
    }

    pub fn with_failing_history(mut self, address: &str) -> Self {
        self.failing_histories.insert(address.to_string());
        self
    }

    pub fn with_failing_balance(mut self, owner: &str) -> Self {
        self.failing_balances.insert(owner.to_string());
        self
    }

    /// Registers a funding transfer: `buyer`'s history gets one entry before
    /// `before_slot`, signed by `funder`.
    pub fn with_funding(self, buyer: &str, funder: &str, before_slot: u64) -> Self {
        let sig = format!("fund-{buyer}");
        let launch_sig = format!("launch-{buyer}");
        self.with_history(
            buyer,
            vec![
                SignatureInfo {
                    signature: launch_sig,
                    slot: before_slot,
                    failed: false,
                },
                SignatureInfo {
                    signature: sig.clone(),
                    slot: before_slot.saturating_sub(5),
                    failed: false,
                },
            ],
        )
        .with_transaction(legacy_transaction(&sig, &[funder, buyer], false))
    }

    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainDataSource for InMemoryChain {
    async fn fetch_block(&self, slot: u64) -> Result<Option<Block>, ChainError> {
        let call = self.block_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.block_lag {
            return Ok(None);
        }
        Ok(self.blocks.get(&slot).cloned())
    }

    async fn address_history(
        &self,
        address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>, ChainError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_histories.contains(address) {
            return Err(ChainError::Rpc(format!("history unavailable for {address}")));
        }

        let entries = match self.histories.get(address) {
            Some(entries) => entries,
            None => return Ok(Vec::new()),
        };
        let start = match before {
            Some(cursor) => match entries.iter().position(|e| e.signature == cursor) {
                Some(index) => index + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };
        Ok(entries.iter().skip(start).take(limit).cloned().collect())
    }

    async fn fetch_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<BlockTransaction>, ChainError> {
        Ok(self.transactions.get(signature).cloned())
    }

    async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64, ChainError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_balances.contains(owner) {
            return Err(ChainError::Timeout(1_000));
        }
        Ok(self
            .balances
            .get(&(owner.to_string(), mint.to_string()))
            .copied()
            .unwrap_or(0.0))
    }
}

/// Sink that keeps every appended signal in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    signals: Mutex<Vec<Signal>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals
            .lock()
            .map(|signals| signals.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn append(&self, signal: &Signal) -> Result<(), SinkError> {
        let mut signals = self
            .signals
            .lock()
            .map_err(|_| SinkError::Closed("recording sink poisoned".to_string()))?;
        signals.push(signal.clone());
        Ok(())
    }
}

pub fn legacy_transaction(signature: &str, keys: &[&str], failed: bool) -> BlockTransaction {
    BlockTransaction {
        signatures: vec![signature.to_string()],
        account_keys: AccountKeys::Legacy(keys.iter().map(|k| k.to_string()).collect()),
        failed,
        post_token_balances: Vec::new(),
    }
}

pub fn signature(signature: &str, slot: u64) -> SignatureInfo {
    SignatureInfo {
        signature: signature.to_string(),
        slot,
        failed: false,
    }
}
