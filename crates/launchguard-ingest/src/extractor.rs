use crate::resolver::resolve_account_keys;
use launchguard_core::types::{Block, BlockTransaction, ParticipantSet};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Collects the unique fee payers of every successful transaction in a block
/// that touches `program_id`. The first resolved key of a transaction is its
/// fee payer and stands in for the buyer.
#[instrument(skip(block), fields(slot = block.slot, transactions = block.transactions.len()))]
pub fn extract_buyers(block: &Block, program_id: &str) -> ParticipantSet {
    let mut buyers = ParticipantSet::new();
    let mut skipped_failed = 0usize;

    for tx in &block.transactions {
        if tx.failed {
            skipped_failed += 1;
            continue;
        }

        let participants = resolve_account_keys(&tx.account_keys);
        if !participants.contains(program_id) {
            continue;
        }

        if let Some(payer) = participants.first() {
            buyers.insert(payer);
        }
    }

    debug!(
        buyers = buyers.len(),
        skipped_failed = skipped_failed,
        "Extracted block buyers"
    );
    buyers
}

/// True when any transaction of the block references a tip account.
pub fn block_references_tip_account(block: &Block, tip_accounts: &HashSet<String>) -> bool {
    block
        .transactions
        .iter()
        .any(|tx| transaction_references_any(tx, tip_accounts))
}

pub fn transaction_references_any(tx: &BlockTransaction, accounts: &HashSet<String>) -> bool {
    resolve_account_keys(&tx.account_keys)
        .iter()
        .any(|key| accounts.contains(key))
}

/// Mint created by the launch transaction: the mint of its first
/// post-execution token balance.
pub fn creation_mint(block: &Block, creation_tx_id: &str) -> Option<String> {
    block
        .find_transaction(creation_tx_id)?
        .post_token_balances
        .first()
        .map(|balance| balance.mint.clone())
}
