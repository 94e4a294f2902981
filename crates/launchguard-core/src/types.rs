use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A token-creation transaction seen on the log feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchEvent {
    pub creation_tx_id: String,
    pub slot: u64,
    pub observed_at: DateTime<Utc>,
}

impl LaunchEvent {
    pub fn new(creation_tx_id: impl Into<String>, slot: u64) -> Self {
        Self {
            creation_tx_id: creation_tx_id.into(),
            slot,
            observed_at: Utc::now(),
        }
    }
}

/// Ordered sequence of unique addresses. Insertion order is first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantSet {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl ParticipantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the address was already present.
    pub fn insert(&mut self, address: impl Into<String>) -> bool {
        let address = address.into();
        if self.seen.contains(&address) {
            return false;
        }
        self.seen.insert(address.clone());
        self.ordered.push(address);
        true
    }

    pub fn extend<I, S>(&mut self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for address in addresses {
            self.insert(address);
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.seen.contains(address)
    }

    pub fn first(&self) -> Option<&str> {
        self.ordered.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ordered
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

impl<S: Into<String>> FromIterator<S> for ParticipantSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ParticipantSet::new();
        set.extend(iter);
        set
    }
}

/// Addresses loaded from lookup tables at execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedAddresses {
    pub writable: Vec<String>,
    pub readonly: Vec<String>,
}

/// Account-key encoding of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKeys {
    /// Flat key list embedded in the message
    Legacy(Vec<String>),
    /// Static keys plus lookup-table addresses. `loaded` is `None` when the
    /// data source trimmed them from its response.
    Versioned {
        static_keys: Vec<String>,
        loaded: Option<LoadedAddresses>,
    },
}

/// Post-execution token balance entry from transaction metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub mint: String,
    pub owner: Option<String>,
    pub ui_amount: Option<f64>,
}

/// One transaction together with the metadata the pipeline reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub signatures: Vec<String>,
    pub account_keys: AccountKeys,
    pub failed: bool,
    pub post_token_balances: Vec<TokenBalance>,
}

impl BlockTransaction {
    pub fn signature(&self) -> Option<&str> {
        self.signatures.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub slot: u64,
    pub transactions: Vec<BlockTransaction>,
}

impl Block {
    /// Finds a transaction by its first signature.
    pub fn find_transaction(&self, signature: &str) -> Option<&BlockTransaction> {
        self.transactions
            .iter()
            .find(|tx| tx.signature() == Some(signature))
    }
}

/// One entry of an address's signature history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Farm,
    Pending,
}

/// Block-0 verdict for one launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleVerdict {
    pub mint: String,
    pub creation_slot: u64,
    pub unique_buyer_count: usize,
    pub tip_account_hit: bool,
    pub classification: Classification,
}

/// Funding source of one traced buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingTrace {
    pub buyer: String,
    pub funder: Option<String>,
}

/// Aggregated result of one funding-trace pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSummary {
    pub traces: Vec<FundingTrace>,
    pub common_funder: Option<String>,
    pub common_funder_count: u32,
    /// Set when `common_funder_count` exceeds the cluster threshold
    pub critical: bool,
}

impl FundingSummary {
    pub fn resolved_count(&self) -> usize {
        self.traces.iter().filter(|t| t.funder.is_some()).count()
    }

    /// Short human-readable note used in signal records.
    pub fn note(&self) -> String {
        match &self.common_funder {
            Some(funder) if self.critical => format!(
                "CRITICAL cluster: {} wallets funded by {}",
                self.common_funder_count, funder
            ),
            Some(funder) => format!(
                "Funding dispersed (top funder {} x{}, {}/{} traced)",
                funder,
                self.common_funder_count,
                self.resolved_count(),
                self.traces.len()
            ),
            None => format!(
                "No funder found ({}/{} traced)",
                self.resolved_count(),
                self.traces.len()
            ),
        }
    }
}

/// Result of a delayed retention check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionRecord {
    pub mint: String,
    pub slot: u64,
    pub initial_buyers: Vec<String>,
    pub checked_at: DateTime<Utc>,
    pub retention_score: f64,
    pub held_count: usize,
    pub survived: bool,
}

/// Fraction of buyers still holding. `None` when there are no buyers.
pub fn retention_score(initial_buyers: usize, sellers: usize) -> Option<f64> {
    if initial_buyers == 0 {
        return None;
    }
    let held = initial_buyers.saturating_sub(sellers);
    Some(held as f64 / initial_buyers as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    #[serde(rename = "FARM")]
    Farm,
    #[serde(rename = "SUPPLY_SHOCK")]
    SupplyShock,
    #[serde(rename = "SUPPLY_SHOCK_ELITE")]
    SupplyShockElite,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Farm => "FARM",
            Strategy::SupplyShock => "SUPPLY_SHOCK",
            Strategy::SupplyShockElite => "SUPPLY_SHOCK_ELITE",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output record handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub mint: String,
    pub strategy: Strategy,
    pub slot: u64,
    pub buyer_count: usize,
    pub notes: String,
    pub detected_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        mint: impl Into<String>,
        strategy: Strategy,
        slot: u64,
        buyer_count: usize,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            mint: mint.into(),
            strategy,
            slot,
            buyer_count,
            notes: notes.into(),
            detected_at: Utc::now(),
        }
    }
}

/// Per-token lifecycle. Every token moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchState {
    New,
    Block0Analyzed,
    FarmDetected,
    AwaitingRetentionCheck,
    SupplyShockConfirmed,
    Rejected,
}

impl LaunchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LaunchState::FarmDetected | LaunchState::SupplyShockConfirmed | LaunchState::Rejected
        )
    }

    pub fn can_advance_to(&self, next: LaunchState) -> bool {
        use LaunchState::*;
        matches!(
            (self, next),
            (New, Block0Analyzed)
                | (New, Rejected)
                | (Block0Analyzed, FarmDetected)
                | (Block0Analyzed, AwaitingRetentionCheck)
                | (AwaitingRetentionCheck, SupplyShockConfirmed)
                | (AwaitingRetentionCheck, Rejected)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_set_keeps_first_seen_order() {
        let mut set = ParticipantSet::new();
        assert!(set.insert("b"));
        assert!(set.insert("a"));
        assert!(!set.insert("b"));
        assert!(set.insert("c"));
        assert_eq!(set.as_slice(), &["b", "a", "c"]);
        assert_eq!(set.first(), Some("b"));
    }

    #[test]
    fn retention_score_guards_empty_buyers() {
        assert_eq!(retention_score(0, 0), None);
        assert_eq!(retention_score(10, 1), Some(0.9));
        assert_eq!(retention_score(10, 2), Some(0.8));
        assert_eq!(retention_score(3, 5), Some(0.0));
    }

    #[test]
    fn strategy_serializes_as_store_labels() {
        let json = serde_json::to_string(&Strategy::SupplyShockElite).unwrap();
        assert_eq!(json, "\"SUPPLY_SHOCK_ELITE\"");
        assert_eq!(Strategy::Farm.to_string(), "FARM");
    }

    #[test]
    fn signal_uses_camel_case_fields() {
        let signal = Signal::new("mint", Strategy::Farm, 42, 12, "notes");
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["buyerCount"], 12);
        assert_eq!(value["strategy"], "FARM");
        assert!(value.get("detectedAt").is_some());
    }

    #[test]
    fn launch_state_never_moves_backwards() {
        use LaunchState::*;
        assert!(New.can_advance_to(Block0Analyzed));
        assert!(Block0Analyzed.can_advance_to(AwaitingRetentionCheck));
        assert!(AwaitingRetentionCheck.can_advance_to(SupplyShockConfirmed));
        assert!(!FarmDetected.can_advance_to(AwaitingRetentionCheck));
        assert!(!AwaitingRetentionCheck.can_advance_to(Block0Analyzed));
        assert!(!Block0Analyzed.can_advance_to(Block0Analyzed));
        assert!(Rejected.is_terminal());
    }

    #[test]
    fn funding_note_reports_cluster() {
        let summary = FundingSummary {
            traces: vec![
                FundingTrace { buyer: "b1".into(), funder: Some("F".into()) },
                FundingTrace { buyer: "b2".into(), funder: Some("F".into()) },
                FundingTrace { buyer: "b3".into(), funder: Some("F".into()) },
                FundingTrace { buyer: "b4".into(), funder: None },
            ],
            common_funder: Some("F".into()),
            common_funder_count: 3,
            critical: true,
        };
        assert_eq!(summary.resolved_count(), 3);
        assert!(summary.note().starts_with("CRITICAL cluster: 3 wallets"));
    }
}
