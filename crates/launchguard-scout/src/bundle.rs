use launchguard_core::constants::JITO_TIP_ACCOUNTS;
use launchguard_core::types::{Block, BundleVerdict, Classification, ParticipantSet};
use launchguard_ingest::extractor::block_references_tip_account;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Unique block-0 buyers at or above which a launch is a farm
    #[serde(default = "default_farm_threshold")]
    pub farm_threshold: usize,
    /// Fee-relay tip accounts; any hit marks the block as bundled
    #[serde(default = "default_tip_accounts")]
    pub tip_accounts: Vec<String>,
}

fn default_farm_threshold() -> usize {
    10
}

fn default_tip_accounts() -> Vec<String> {
    JITO_TIP_ACCOUNTS.iter().map(|a| a.to_string()).collect()
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            farm_threshold: default_farm_threshold(),
            tip_accounts: default_tip_accounts(),
        }
    }
}

/// Decides whether a launch block looks farmed.
#[derive(Debug, Clone)]
pub struct BundleClassifier {
    farm_threshold: usize,
    tip_accounts: HashSet<String>,
}

impl BundleClassifier {
    pub fn new(config: &BundleConfig) -> Self {
        Self {
            farm_threshold: config.farm_threshold,
            tip_accounts: config.tip_accounts.iter().cloned().collect(),
        }
    }

    pub fn farm_threshold(&self) -> usize {
        self.farm_threshold
    }

    pub fn tip_accounts(&self) -> &HashSet<String> {
        &self.tip_accounts
    }

    /// Buyer-count gate only. The tip-account hit is reported alongside but
    /// never changes the classification.
    pub fn classify_count(&self, unique_buyers: usize) -> Classification {
        if unique_buyers >= self.farm_threshold {
            Classification::Farm
        } else {
            Classification::Pending
        }
    }

    #[instrument(skip(self, block, buyers), fields(slot = block.slot, buyers = buyers.len()))]
    pub fn classify(&self, mint: &str, block: &Block, buyers: &ParticipantSet) -> BundleVerdict {
        let tip_account_hit = block_references_tip_account(block, &self.tip_accounts);
        let classification = self.classify_count(buyers.len());

        info!(
            mint = %mint,
            tip_account_hit,
            classification = ?classification,
            "📊 Block-0 verdict"
        );

        BundleVerdict {
            mint: mint.to_string(),
            creation_slot: block.slot,
            unique_buyer_count: buyers.len(),
            tip_account_hit,
            classification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchguard_core::testing::legacy_transaction;

    fn buyers(n: usize) -> ParticipantSet {
        (0..n).map(|i| format!("buyer{i}")).collect()
    }

    fn classifier() -> BundleClassifier {
        BundleClassifier::new(&BundleConfig::default())
    }

    #[test]
    fn twelve_buyers_is_farm() {
        let block = Block { slot: 10, transactions: vec![] };
        let verdict = classifier().classify("Mint", &block, &buyers(12));
        assert_eq!(verdict.classification, Classification::Farm);
        assert_eq!(verdict.unique_buyer_count, 12);
        assert_eq!(verdict.creation_slot, 10);
    }

    #[test]
    fn three_buyers_is_pending() {
        let block = Block { slot: 10, transactions: vec![] };
        let verdict = classifier().classify("Mint", &block, &buyers(3));
        assert_eq!(verdict.classification, Classification::Pending);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(classifier().classify_count(10), Classification::Farm);
        assert_eq!(classifier().classify_count(9), Classification::Pending);
    }

    #[test]
    fn tip_hit_is_reported_without_changing_classification() {
        let block = Block {
            slot: 11,
            transactions: vec![legacy_transaction(
                "tip",
                &["payer", JITO_TIP_ACCOUNTS[3]],
                false,
            )],
        };
        let verdict = classifier().classify("Mint", &block, &buyers(2));
        assert!(verdict.tip_account_hit);
        assert_eq!(verdict.classification, Classification::Pending);
    }

    #[test]
    fn config_defaults_carry_all_tip_accounts() {
        let config: BundleConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.farm_threshold, 10);
        assert_eq!(config.tip_accounts.len(), JITO_TIP_ACCOUNTS.len());
    }
}
