//! After-the-fact reconstruction of a launch from a mint's signature history.

use crate::bundle::BundleClassifier;
use crate::funding::FundingTracer;
use launchguard_core::chain::ChainDataSource;
use launchguard_core::error::{AnalysisError, Stage};
use launchguard_core::types::{FundingSummary, ParticipantSet, SignatureInfo};
use launchguard_ingest::resolver::resolve_account_keys;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Block-0 buyers above which a tip-account hit counts as bundling.
const BUNDLED_MIN_BUYERS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopsyConfig {
    #[serde(default = "default_first_page_limit")]
    pub first_page_limit: usize,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Upper bound on history pages walked back to the creation
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_first_page_limit() -> usize {
    50
}

fn default_page_limit() -> usize {
    100
}

fn default_max_pages() -> usize {
    500
}

impl Default for AutopsyConfig {
    fn default() -> Self {
        Self {
            first_page_limit: default_first_page_limit(),
            page_limit: default_page_limit(),
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutopsyVerdict {
    Organic,
    /// Tipped bundle with more buyers than the farm threshold
    FarmHigh,
    /// Funding cluster well above the cluster threshold
    FarmCritical,
}

impl fmt::Display for AutopsyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutopsyVerdict::Organic => f.write_str("Organic / No Cluster Detected"),
            AutopsyVerdict::FarmHigh => f.write_str("FARM (High)"),
            AutopsyVerdict::FarmCritical => f.write_str("FARM (Critical)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopsyReport {
    pub mint: String,
    pub creation_slot: u64,
    /// Unique buyers in the creation slot, oldest first
    pub buyers: Vec<String>,
    pub tip_account_hit: bool,
    pub funding: Option<FundingSummary>,
    pub detected: bool,
    pub verdict: AutopsyVerdict,
}

impl AutopsyReport {
    pub fn bundle_size(&self) -> usize {
        self.buyers.len()
    }

    pub fn cluster_size(&self) -> u32 {
        self.funding
            .as_ref()
            .map(|f| f.common_funder_count)
            .unwrap_or(0)
    }

    pub fn common_funder(&self) -> Option<&str> {
        self.funding.as_ref()?.common_funder.as_deref()
    }
}

pub struct LaunchAutopsy {
    config: AutopsyConfig,
    classifier: BundleClassifier,
    tracer: FundingTracer,
}

impl LaunchAutopsy {
    pub fn new(config: AutopsyConfig, classifier: BundleClassifier, tracer: FundingTracer) -> Self {
        Self {
            config,
            classifier,
            tracer,
        }
    }

    #[instrument(skip(self, chain))]
    pub async fn run(
        &self,
        chain: &dyn ChainDataSource,
        mint: &str,
    ) -> Result<AutopsyReport, AnalysisError> {
        info!("🕵️ Starting launch autopsy");

        let (creation_slot, block0) = self.find_creation(chain, mint).await?;
        info!(creation_slot, block0_txs = block0.len(), "📅 Creation slot found");

        let mut buyers = ParticipantSet::new();
        let mut tip_account_hit = false;
        for entry in &block0 {
            let tx = match chain.fetch_transaction(&entry.signature).await {
                Ok(Some(tx)) => tx,
                Ok(None) => {
                    debug!(signature = %entry.signature, "Transaction not found");
                    continue;
                }
                Err(e) => {
                    let err = AnalysisError::transient(Stage::Autopsy, e);
                    debug!(signature = %entry.signature, error = %err, "Skipping block-0 transaction");
                    continue;
                }
            };

            let participants = resolve_account_keys(&tx.account_keys);
            if participants
                .iter()
                .any(|key| self.classifier.tip_accounts().contains(key))
            {
                tip_account_hit = true;
            }
            if let Some(buyer) = participants.first() {
                buyers.insert(buyer);
            }
        }

        info!(
            buyers = buyers.len(),
            tip_account_hit,
            "📉 Block-0 analysis complete"
        );

        let buyers = buyers.into_vec();
        let funding = if self.tracer.should_trace(buyers.len()) {
            Some(self.tracer.trace(chain, &buyers, creation_slot).await)
        } else {
            None
        };

        let cluster = funding.as_ref().map(|f| f.common_funder_count).unwrap_or(0);
        let cluster_threshold = self.tracer.config().cluster_threshold;

        let detected =
            (buyers.len() > BUNDLED_MIN_BUYERS && tip_account_hit) || cluster > cluster_threshold;
        let verdict = if cluster > cluster_threshold + 1 {
            AutopsyVerdict::FarmCritical
        } else if tip_account_hit && buyers.len() > self.classifier.farm_threshold() {
            AutopsyVerdict::FarmHigh
        } else {
            AutopsyVerdict::Organic
        };

        Ok(AutopsyReport {
            mint: mint.to_string(),
            creation_slot,
            buyers,
            tip_account_hit,
            funding,
            detected,
            verdict,
        })
    }

    /// Walks the history back to its oldest page. Returns the creation slot
    /// and its successful signatures in chronological order.
    async fn find_creation(
        &self,
        chain: &dyn ChainDataSource,
        mint: &str,
    ) -> Result<(u64, Vec<SignatureInfo>), AnalysisError> {
        let mut batch = history_page(chain, mint, self.config.first_page_limit, None).await?;
        let mut previous: Vec<SignatureInfo> = Vec::new();
        let mut pages = 1usize;

        loop {
            let Some(cursor) = batch.last().map(|entry| entry.signature.clone()) else {
                break;
            };
            if pages >= self.config.max_pages {
                warn!(pages, "History page cap reached before creation");
                break;
            }

            let older = history_page(chain, mint, self.config.page_limit, Some(&cursor)).await?;
            pages += 1;
            if older.is_empty() {
                break;
            }
            previous = std::mem::replace(&mut batch, older);
        }

        let creation_slot = batch
            .last()
            .map(|entry| entry.slot)
            .ok_or_else(|| AnalysisError::missing(Stage::Autopsy, "creation slot not found"))?;

        // The creation slot can straddle a page boundary.
        let mut block0: Vec<SignatureInfo> = previous
            .into_iter()
            .chain(batch)
            .filter(|entry| entry.slot == creation_slot && !entry.failed)
            .collect();
        block0.reverse();

        Ok((creation_slot, block0))
    }
}

async fn history_page(
    chain: &dyn ChainDataSource,
    mint: &str,
    limit: usize,
    before: Option<&str>,
) -> Result<Vec<SignatureInfo>, AnalysisError> {
    chain
        .address_history(mint, limit, before)
        .await
        .map_err(|e| AnalysisError::transient(Stage::Autopsy, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleConfig;
    use crate::funding::FundingConfig;
    use launchguard_core::constants::JITO_TIP_ACCOUNTS;
    use launchguard_core::testing::{legacy_transaction, signature, InMemoryChain};

    fn autopsy(config: AutopsyConfig) -> LaunchAutopsy {
        LaunchAutopsy::new(
            config,
            BundleClassifier::new(&BundleConfig::default()),
            FundingTracer::new(FundingConfig::default()),
        )
    }

    #[tokio::test]
    async fn walks_back_to_creation_across_page_boundary() {
        let chain = InMemoryChain::new()
            .with_history(
                "Mint",
                vec![
                    signature("s6", 103),
                    signature("s5", 102),
                    signature("s4", 101),
                    signature("s3", 100),
                    signature("s2", 100),
                    signature("s1", 100),
                ],
            )
            .with_transaction(legacy_transaction("s1", &["creator", "Mint"], false))
            .with_transaction(legacy_transaction(
                "s2",
                &["alice", "Mint", JITO_TIP_ACCOUNTS[0]],
                false,
            ))
            .with_transaction(legacy_transaction("s3", &["bob", "Mint"], false));

        let config = AutopsyConfig {
            first_page_limit: 2,
            page_limit: 3,
            max_pages: 50,
        };
        let report = autopsy(config).run(&chain, "Mint").await.unwrap();

        assert_eq!(report.creation_slot, 100);
        assert_eq!(report.buyers, vec!["creator", "alice", "bob"]);
        assert!(report.tip_account_hit);
        assert!(report.funding.is_none());
        assert!(!report.detected);
        assert_eq!(report.verdict, AutopsyVerdict::Organic);
    }

    #[tokio::test]
    async fn funded_bundle_is_critical_farm() {
        let mut history = Vec::new();
        let mut chain = InMemoryChain::new();
        for i in (0..12).rev() {
            let sig = format!("buy{i}");
            let buyer = format!("wallet{i}");
            history.push(signature(&sig, 900));
            let tip = if i == 3 { JITO_TIP_ACCOUNTS[5] } else { "Mint" };
            chain = chain
                .with_transaction(legacy_transaction(&sig, &[&buyer, "Mint", tip], false))
                .with_funding(&buyer, "Deployer", 900);
        }
        let chain = chain.with_history("Mint", history);

        let report = autopsy(AutopsyConfig::default())
            .run(&chain, "Mint")
            .await
            .unwrap();

        assert_eq!(report.bundle_size(), 12);
        assert!(report.tip_account_hit);
        assert_eq!(report.cluster_size(), 10);
        assert_eq!(report.common_funder(), Some("Deployer"));
        assert!(report.detected);
        assert_eq!(report.verdict, AutopsyVerdict::FarmCritical);
    }

    #[tokio::test]
    async fn tipped_bundle_without_cluster_is_high() {
        let mut history = Vec::new();
        let mut chain = InMemoryChain::new();
        for i in (0..11).rev() {
            let sig = format!("buy{i}");
            let buyer = format!("wallet{i}");
            history.push(signature(&sig, 50));
            chain = chain.with_transaction(legacy_transaction(
                &sig,
                &[&buyer, JITO_TIP_ACCOUNTS[1]],
                false,
            ));
        }
        let chain = chain.with_history("Mint", history);

        let report = autopsy(AutopsyConfig::default())
            .run(&chain, "Mint")
            .await
            .unwrap();

        assert_eq!(report.bundle_size(), 11);
        assert_eq!(report.cluster_size(), 0);
        assert!(report.detected);
        assert_eq!(report.verdict, AutopsyVerdict::FarmHigh);
    }

    #[tokio::test]
    async fn empty_history_is_missing_data() {
        let chain = InMemoryChain::new();
        let err = autopsy(AutopsyConfig::default())
            .run(&chain, "Unknown")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingData { stage: Stage::Autopsy, .. }));
    }

    #[tokio::test]
    async fn history_failure_is_transient() {
        let chain = InMemoryChain::new().with_failing_history("Mint");
        let err = autopsy(AutopsyConfig::default())
            .run(&chain, "Mint")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::TransientLookup { .. }));
    }
}
