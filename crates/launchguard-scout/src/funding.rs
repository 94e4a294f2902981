use launchguard_core::chain::ChainDataSource;
use launchguard_core::constants::RAYDIUM_AUTHORITY;
use launchguard_core::error::{AnalysisError, Stage};
use launchguard_core::types::{FundingSummary, FundingTrace};
use launchguard_ingest::resolver::resolve_account_keys;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingConfig {
    /// Buyers traced per launch, taken from the front of the buyer list
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// History entries fetched per buyer
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Common-funder count above which the cluster is critical
    #[serde(default = "default_cluster_threshold")]
    pub cluster_threshold: u32,
    /// Pending launches with fewer buyers skip the trace
    #[serde(default = "default_min_buyers_to_trace")]
    pub min_buyers_to_trace: usize,
    /// Funders never counted, e.g. exchange hot wallets
    #[serde(default = "default_excluded_funders")]
    pub excluded_funders: Vec<String>,
}

fn default_sample_size() -> usize {
    10
}

fn default_history_limit() -> usize {
    10
}

fn default_cluster_threshold() -> u32 {
    2
}

fn default_min_buyers_to_trace() -> usize {
    4
}

fn default_excluded_funders() -> Vec<String> {
    vec![RAYDIUM_AUTHORITY.to_string()]
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            history_limit: default_history_limit(),
            cluster_threshold: default_cluster_threshold(),
            min_buyers_to_trace: default_min_buyers_to_trace(),
            excluded_funders: default_excluded_funders(),
        }
    }
}

/// Funder frequencies for one trace pass. Not shared between launches.
#[derive(Debug, Default)]
pub struct FundingAccumulator {
    excluded: HashSet<String>,
    traces: Vec<FundingTrace>,
    counts: HashMap<String, u32>,
    top: Option<(String, u32)>,
}

impl FundingAccumulator {
    pub fn new(excluded: &[String]) -> Self {
        Self {
            excluded: excluded.iter().cloned().collect(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, trace: FundingTrace) {
        if let Some(funder) = trace.funder.as_deref() {
            if !self.excluded.contains(funder) {
                let count = self.counts.entry(funder.to_string()).or_insert(0);
                *count += 1;
                let count = *count;

                // Strictly greater: the first funder to reach a count keeps it.
                let current_max = self.top.as_ref().map(|(_, c)| *c).unwrap_or(0);
                if count > current_max {
                    self.top = Some((funder.to_string(), count));
                }
            }
        }
        self.traces.push(trace);
    }

    pub fn finish(self, cluster_threshold: u32) -> FundingSummary {
        let (common_funder, common_funder_count) = match self.top {
            Some((funder, count)) => (Some(funder), count),
            None => (None, 0),
        };
        FundingSummary {
            traces: self.traces,
            common_funder,
            common_funder_count,
            critical: common_funder_count > cluster_threshold,
        }
    }
}

/// Follows each sampled buyer back to the transaction that funded it.
#[derive(Debug, Clone)]
pub struct FundingTracer {
    config: FundingConfig,
}

impl FundingTracer {
    pub fn new(config: FundingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FundingConfig {
        &self.config
    }

    pub fn should_trace(&self, buyer_count: usize) -> bool {
        buyer_count >= self.config.min_buyers_to_trace
    }

    #[instrument(skip(self, chain, buyers), fields(buyers = buyers.len()))]
    pub async fn trace(
        &self,
        chain: &dyn ChainDataSource,
        buyers: &[String],
        creation_slot: u64,
    ) -> FundingSummary {
        let mut accumulator = FundingAccumulator::new(&self.config.excluded_funders);

        for buyer in buyers.iter().take(self.config.sample_size) {
            let funder = match self.find_funder(chain, buyer, creation_slot).await {
                Ok(funder) => funder,
                Err(e) => {
                    debug!(buyer = %buyer, slot = creation_slot, error = %e, "Funder lookup failed");
                    None
                }
            };
            accumulator.record(FundingTrace {
                buyer: buyer.clone(),
                funder,
            });
        }

        let summary = accumulator.finish(self.config.cluster_threshold);
        if summary.critical {
            warn!(
                slot = creation_slot,
                funder = ?summary.common_funder,
                count = summary.common_funder_count,
                "🚨 Funding cluster detected"
            );
        } else {
            info!(
                slot = creation_slot,
                resolved = summary.resolved_count(),
                top_count = summary.common_funder_count,
                "Funding trace complete"
            );
        }
        summary
    }

    /// Signer of the latest transaction before `creation_slot`.
    async fn find_funder(
        &self,
        chain: &dyn ChainDataSource,
        buyer: &str,
        creation_slot: u64,
    ) -> Result<Option<String>, AnalysisError> {
        let history = chain
            .address_history(buyer, self.config.history_limit, None)
            .await
            .map_err(|e| AnalysisError::transient(Stage::FundingTrace, e))?;

        let Some(prior) = history.iter().find(|entry| entry.slot < creation_slot) else {
            return Ok(None);
        };

        let tx = chain
            .fetch_transaction(&prior.signature)
            .await
            .map_err(|e| AnalysisError::transient(Stage::FundingTrace, e))?;

        Ok(tx.and_then(|tx| {
            resolve_account_keys(&tx.account_keys)
                .first()
                .map(str::to_string)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchguard_core::testing::{signature, InMemoryChain};

    fn trace(buyer: &str, funder: Option<&str>) -> FundingTrace {
        FundingTrace {
            buyer: buyer.to_string(),
            funder: funder.map(str::to_string),
        }
    }

    fn accumulate(funders: &[&str], excluded: &[String]) -> FundingSummary {
        let mut acc = FundingAccumulator::new(excluded);
        for (i, funder) in funders.iter().enumerate() {
            acc.record(trace(&format!("b{i}"), Some(funder)));
        }
        acc.finish(2)
    }

    #[test]
    fn dominant_funder_wins() {
        let summary = accumulate(&["A", "A", "B", "A"], &[]);
        assert_eq!(summary.common_funder.as_deref(), Some("A"));
        assert_eq!(summary.common_funder_count, 3);
        assert!(summary.critical);
    }

    #[test]
    fn tie_keeps_first_to_reach_max() {
        for _ in 0..10 {
            let summary = accumulate(&["A", "B", "A", "B"], &[]);
            assert_eq!(summary.common_funder.as_deref(), Some("A"));
            assert_eq!(summary.common_funder_count, 2);
            assert!(!summary.critical);
        }

        let summary = accumulate(&["B", "A", "A", "B"], &[]);
        assert_eq!(summary.common_funder.as_deref(), Some("A"));
    }

    #[test]
    fn excluded_funders_are_not_counted() {
        let excluded = vec!["CEX".to_string()];
        let summary = accumulate(&["CEX", "CEX", "CEX", "A"], &excluded);
        assert_eq!(summary.common_funder.as_deref(), Some("A"));
        assert_eq!(summary.common_funder_count, 1);
        assert_eq!(summary.traces.len(), 4);
    }

    #[test]
    fn empty_pass_has_no_funder() {
        let summary = FundingAccumulator::new(&[]).finish(2);
        assert_eq!(summary.common_funder, None);
        assert_eq!(summary.common_funder_count, 0);
        assert!(!summary.critical);
    }

    #[tokio::test]
    async fn traces_funders_and_survives_lookup_failures() {
        let chain = InMemoryChain::new()
            .with_funding("b1", "Whale", 500)
            .with_funding("b2", "Whale", 500)
            .with_failing_history("b3")
            .with_funding("b4", "Whale", 500)
            .with_history("b5", vec![signature("late", 600)]);

        let buyers: Vec<String> = ["b1", "b2", "b3", "b4", "b5"]
            .iter()
            .map(|b| b.to_string())
            .collect();
        let tracer = FundingTracer::new(FundingConfig::default());
        let summary = tracer.trace(&chain, &buyers, 500).await;

        assert_eq!(summary.traces.len(), 5);
        assert_eq!(summary.resolved_count(), 3);
        assert_eq!(summary.common_funder.as_deref(), Some("Whale"));
        assert_eq!(summary.common_funder_count, 3);
        assert!(summary.critical);
        assert_eq!(summary.traces[2].funder, None);
        assert_eq!(summary.traces[4].funder, None);
    }

    #[tokio::test]
    async fn sample_size_bounds_lookups() {
        let mut chain = InMemoryChain::new();
        let mut buyers = Vec::new();
        for i in 0..25 {
            let buyer = format!("b{i}");
            chain = chain.with_funding(&buyer, &format!("f{i}"), 100);
            buyers.push(buyer);
        }

        let tracer = FundingTracer::new(FundingConfig::default());
        let summary = tracer.trace(&chain, &buyers, 100).await;

        assert_eq!(summary.traces.len(), 10);
        assert_eq!(chain.history_calls(), 10);
        assert_eq!(summary.common_funder.as_deref(), Some("f0"));
        assert!(!summary.critical);
    }
}
