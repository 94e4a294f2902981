use chrono::Utc;
use launchguard_core::chain::ChainDataSource;
use launchguard_core::error::{AnalysisError, Stage};
use launchguard_core::types::{retention_score, RetentionRecord, Signal, Strategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_liveness_enabled")]
    pub enabled: bool,
    /// Transactions since launch below which the token is dead
    #[serde(default = "default_min_transactions")]
    pub min_transactions: usize,
    /// Confirmed launches that passed the gate are tagged elite
    #[serde(default)]
    pub elite: bool,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

fn default_liveness_enabled() -> bool {
    true
}

fn default_min_transactions() -> usize {
    50
}

fn default_page_limit() -> usize {
    1000
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: default_liveness_enabled(),
            min_transactions: default_min_transactions(),
            elite: false,
            page_limit: default_page_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    #[serde(default = "default_holding_requirement")]
    pub holding_requirement: f64,
    /// UI balance below which a buyer counts as sold
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: f64,
    #[serde(default)]
    pub liveness: LivenessConfig,
}

fn default_delay_secs() -> u64 {
    300
}

fn default_holding_requirement() -> f64 {
    0.90
}

fn default_dust_threshold() -> f64 {
    1000.0
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_delay_secs(),
            holding_requirement: default_holding_requirement(),
            dust_threshold: default_dust_threshold(),
            liveness: LivenessConfig::default(),
        }
    }
}

impl RetentionConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Everything the monitor needs about a launch that was left pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionRequest {
    pub mint: String,
    pub creation_slot: u64,
    pub initial_buyers: Vec<String>,
    /// Funding-cluster summary from block-0 analysis, carried into the signal
    #[serde(default)]
    pub funding_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetentionOutcome {
    /// Enough buyers kept holding
    Confirmed { record: RetentionRecord, signal: Signal },
    /// Holders sold off; no signal
    Rejected { record: RetentionRecord },
    /// Too little activity since launch; balances were never checked
    ClinicallyDead { transactions: usize },
}

pub struct RetentionMonitor {
    config: RetentionConfig,
}

impl RetentionMonitor {
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    #[instrument(skip(self, chain, request), fields(mint = %request.mint, slot = request.creation_slot))]
    pub async fn evaluate(
        &self,
        chain: &dyn ChainDataSource,
        request: &RetentionRequest,
    ) -> Result<RetentionOutcome, AnalysisError> {
        if request.initial_buyers.is_empty() {
            return Err(AnalysisError::missing(
                Stage::Retention,
                "no initial buyers to check",
            ));
        }

        if self.config.liveness.enabled {
            let transactions = self.count_activity(chain, request).await?;
            if transactions < self.config.liveness.min_transactions {
                info!(
                    transactions,
                    minimum = self.config.liveness.min_transactions,
                    "💀 Clinically dead, skipping retention check"
                );
                return Ok(RetentionOutcome::ClinicallyDead { transactions });
            }
            debug!(transactions, "Liveness gate passed");
        }

        let buyers = &request.initial_buyers;
        let mut sellers = 0usize;
        for buyer in buyers {
            match chain.token_balance(buyer, &request.mint).await {
                Ok(balance) if balance >= self.config.dust_threshold => {}
                Ok(balance) => {
                    debug!(buyer = %buyer, balance, "Buyer sold");
                    sellers += 1;
                }
                Err(e) => {
                    let err = AnalysisError::transient(Stage::Retention, e);
                    warn!(buyer = %buyer, error = %err, "Balance lookup failed, counting as sold");
                    sellers += 1;
                }
            }
        }

        let score = retention_score(buyers.len(), sellers)
            .ok_or_else(|| AnalysisError::missing(Stage::Retention, "no initial buyers to check"))?;
        let held_count = buyers.len() - sellers;
        let survived = score >= self.config.holding_requirement;

        let record = RetentionRecord {
            mint: request.mint.clone(),
            slot: request.creation_slot,
            initial_buyers: buyers.clone(),
            checked_at: Utc::now(),
            retention_score: score,
            held_count,
            survived,
        };

        info!(
            retention_pct = (score * 100.0).round(),
            held = held_count,
            total = buyers.len(),
            "💎 Retention score"
        );

        if !survived {
            info!("📉 Holders sold, launch rejected");
            return Ok(RetentionOutcome::Rejected { record });
        }

        let strategy = if self.config.liveness.enabled && self.config.liveness.elite {
            Strategy::SupplyShockElite
        } else {
            Strategy::SupplyShock
        };
        let signal = Signal::new(
            &request.mint,
            strategy,
            request.creation_slot,
            buyers.len(),
            retention_notes(&record, request.funding_note.as_deref()),
        );
        info!(strategy = %strategy, "🔥 Supply shock confirmed");

        Ok(RetentionOutcome::Confirmed { record, signal })
    }

    /// Counts the mint's signatures at or after the creation slot, stopping
    /// once the minimum is reached.
    async fn count_activity(
        &self,
        chain: &dyn ChainDataSource,
        request: &RetentionRequest,
    ) -> Result<usize, AnalysisError> {
        let minimum = self.config.liveness.min_transactions;
        let mut count = 0usize;
        let mut cursor: Option<String> = None;

        loop {
            let page = chain
                .address_history(
                    &request.mint,
                    self.config.liveness.page_limit,
                    cursor.as_deref(),
                )
                .await
                .map_err(|e| {
                    AnalysisError::missing(Stage::Liveness, format!("activity lookup failed: {e}"))
                })?;

            let Some(last) = page.last() else {
                return Ok(count);
            };
            let reached_launch = last.slot < request.creation_slot;
            cursor = Some(last.signature.clone());

            count += page
                .iter()
                .filter(|entry| entry.slot >= request.creation_slot)
                .count();

            if count >= minimum || reached_launch {
                return Ok(count);
            }
        }
    }
}

pub fn retention_notes(record: &RetentionRecord, funding_note: Option<&str>) -> String {
    let base = format!(
        "Retention: {:.0}% (held {}/{})",
        record.retention_score * 100.0,
        record.held_count,
        record.initial_buyers.len()
    );
    match funding_note {
        Some(note) => format!("{base}; {note}"),
        None => base,
    }
}
