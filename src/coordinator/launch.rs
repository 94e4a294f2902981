use crate::config::CoordinatorSettings;
use crate::coordinator::registry::LaunchRegistry;
use crate::scheduler::{PendingCheck, RetentionScheduler};
use anyhow::Result;
use chrono::Utc;
use launchguard_core::chain::{ChainDataSource, SignalSink};
use launchguard_core::error::{AnalysisError, Stage};
use launchguard_core::types::{
    Block, BundleVerdict, Classification, FundingSummary, LaunchEvent, LaunchState, Signal,
    Strategy,
};
use launchguard_ingest::{creation_mint, extract_buyers};
use launchguard_scout::{BundleClassifier, FundingTracer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Drives each launch from its creation notification to a farm signal or a
/// scheduled retention check.
pub struct LaunchCoordinator {
    chain: Arc<dyn ChainDataSource>,
    sink: Arc<dyn SignalSink>,
    classifier: BundleClassifier,
    tracer: FundingTracer,
    scheduler: RetentionScheduler,
    registry: Arc<LaunchRegistry>,
    program_id: String,
    settings: CoordinatorSettings,
    retention_delay: Duration,
}

impl LaunchCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainDataSource>,
        sink: Arc<dyn SignalSink>,
        classifier: BundleClassifier,
        tracer: FundingTracer,
        scheduler: RetentionScheduler,
        registry: Arc<LaunchRegistry>,
        program_id: impl Into<String>,
        settings: CoordinatorSettings,
        retention_delay: Duration,
    ) -> Self {
        Self {
            chain,
            sink,
            classifier,
            tracer,
            scheduler,
            registry,
            program_id: program_id.into(),
            settings,
            retention_delay,
        }
    }

    pub fn registry(&self) -> &Arc<LaunchRegistry> {
        &self.registry
    }

    /// Consumes launch events until the feed closes or shutdown is signalled.
    /// Each launch is analyzed on its own task.
    #[instrument(skip_all)]
    pub async fn run(
        self: Arc<Self>,
        mut launches: mpsc::UnboundedReceiver<LaunchEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!("🧭 Launch coordinator started");
        let mut tasks = JoinSet::new();
        let mut prune_tick = tokio::time::interval(self.settings.prune_interval());
        prune_tick.tick().await;

        loop {
            tokio::select! {
                event = launches.recv() => match event {
                    Some(event) => {
                        if !self.registry.begin(&event.creation_tx_id) {
                            debug!(signature = %event.creation_tx_id, "Duplicate launch notification ignored");
                            continue;
                        }
                        let coordinator = self.clone();
                        tasks.spawn(async move { coordinator.process(event).await });
                    }
                    None => {
                        info!("Launch feed closed");
                        break;
                    }
                },
                _ = prune_tick.tick() => {
                    self.registry.prune();
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Launch analysis task panicked");
                    }
                }
                _ = shutdown.recv() => {
                    info!(in_flight = tasks.len(), "🛑 Launch coordinator shutting down");
                    break;
                }
            }
        }

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    /// Analyzes one launch and settles its state. Returns the state reached.
    pub async fn process(&self, event: LaunchEvent) -> LaunchState {
        let signature = event.creation_tx_id.clone();
        let slot = event.slot;

        match self.analyze(event).await {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    signature = %signature,
                    slot,
                    stage = %e.stage(),
                    error = %e,
                    "Launch analysis aborted"
                );
                let _ = self.registry.advance(&signature, LaunchState::Rejected);
                LaunchState::Rejected
            }
        }
    }

    #[instrument(skip(self, event), fields(signature = %event.creation_tx_id, slot = event.slot))]
    async fn analyze(&self, event: LaunchEvent) -> Result<LaunchState, AnalysisError> {
        let signature = event.creation_tx_id.as_str();

        let block = self.fetch_launch_block(event.slot).await?;
        let mint = creation_mint(&block, signature).ok_or_else(|| {
            AnalysisError::missing(
                Stage::MintResolution,
                "creation transaction or its token balance not found in block",
            )
        })?;

        let buyers = extract_buyers(&block, &self.program_id);
        if buyers.is_empty() {
            return Err(AnalysisError::missing(
                Stage::BuyerExtraction,
                format!("no successful buyers of {mint} in block"),
            ));
        }

        let verdict = self.classifier.classify(&mint, &block, &buyers);
        let _ = self.registry.advance(signature, LaunchState::Block0Analyzed);
        let buyers = buyers.into_vec();

        match verdict.classification {
            Classification::Farm => {
                let funding = self.tracer.trace(self.chain.as_ref(), &buyers, verdict.creation_slot).await;
                let signal = Signal::new(
                    &mint,
                    Strategy::Farm,
                    verdict.creation_slot,
                    verdict.unique_buyer_count,
                    farm_notes(&verdict, &funding),
                );
                info!(mint = %mint, buyers = verdict.unique_buyer_count, "🚨 Farm detected");
                if let Err(e) = self.sink.append(&signal).await {
                    error!(mint = %mint, error = %e, "Failed to emit farm signal");
                }
                let _ = self.registry.advance(signature, LaunchState::FarmDetected);
                Ok(LaunchState::FarmDetected)
            }
            Classification::Pending => {
                let funding_note = if self.tracer.should_trace(buyers.len()) {
                    let funding = self
                        .tracer
                        .trace(self.chain.as_ref(), &buyers, verdict.creation_slot)
                        .await;
                    Some(funding.note())
                } else {
                    None
                };

                let due_at = Utc::now()
                    + chrono::Duration::from_std(self.retention_delay)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                let check = PendingCheck {
                    mint: mint.clone(),
                    creation_tx_id: signature.to_string(),
                    slot: verdict.creation_slot,
                    initial_buyers: buyers,
                    due_at,
                    funding_note,
                };

                // Awaiting before the timer is armed, so even a zero delay
                // finds block-0 analysis complete.
                let _ = self
                    .registry
                    .advance(signature, LaunchState::AwaitingRetentionCheck);
                if let Err(e) = self.scheduler.schedule(check).await {
                    error!(mint = %mint, error = %e, "Failed to schedule retention check");
                    let _ = self.registry.advance(signature, LaunchState::Rejected);
                    return Ok(LaunchState::Rejected);
                }
                info!(mint = %mint, due_at = %due_at, "⏳ Retention check scheduled");
                Ok(LaunchState::AwaitingRetentionCheck)
            }
        }
    }

    /// Waits out the propagation delay, then retries until the block shows up.
    async fn fetch_launch_block(&self, slot: u64) -> Result<Block, AnalysisError> {
        let delay = self.settings.propagation_delay();
        let attempts = self.settings.block_fetch_attempts.max(1);

        for attempt in 1..=attempts {
            sleep(delay).await;
            match self.chain.fetch_block(slot).await {
                Ok(Some(block)) => return Ok(block),
                Ok(None) => debug!(slot, attempt, "Block not available yet"),
                Err(e) => {
                    let err = AnalysisError::transient(Stage::BlockFetch, e);
                    debug!(slot, attempt, error = %err, "Block fetch failed");
                }
            }
        }

        Err(AnalysisError::missing(
            Stage::BlockFetch,
            format!("block {slot} unavailable after {attempts} attempts"),
        ))
    }
}

/// Bundle evidence and funding evidence are reported side by side.
pub fn farm_notes(verdict: &BundleVerdict, funding: &FundingSummary) -> String {
    let tip = if verdict.tip_account_hit {
        "Jito tip detected"
    } else {
        "no tip account"
    };
    format!(
        "Block-0 buyers: {}; {}; {}",
        verdict.unique_buyer_count,
        tip,
        funding.note()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::RetentionCheckRunner;
    use launchguard_core::testing::{legacy_transaction, signature, InMemoryChain, RecordingSink};
    use launchguard_core::types::{BlockTransaction, TokenBalance};
    use launchguard_core::constants::JITO_TIP_ACCOUNTS;
    use launchguard_scout::{BundleConfig, FundingConfig};
    use launchguard_stalker::{RetentionConfig, RetentionMonitor};
    use tempfile::TempDir;

    const PROGRAM: &str = "PumpProgram";
    const MINT: &str = "LaunchMint";
    const SLOT: u64 = 5_000;

    struct Harness {
        coordinator: Arc<LaunchCoordinator>,
        chain: Arc<InMemoryChain>,
        sink: Arc<RecordingSink>,
        scheduler: RetentionScheduler,
        _dir: TempDir,
    }

    fn launch_block(buyers: usize, tipped: bool) -> Block {
        let mut create: BlockTransaction = legacy_transaction("create", &["dev", MINT, PROGRAM], false);
        create.post_token_balances = vec![TokenBalance {
            mint: MINT.to_string(),
            owner: Some("dev".to_string()),
            ui_amount: Some(1_000_000_000.0),
        }];

        let mut transactions = vec![create];
        for i in 0..buyers {
            let buyer = format!("buyer{i}");
            transactions.push(legacy_transaction(&format!("buy{i}"), &[&buyer, MINT, PROGRAM], false));
        }
        if tipped {
            transactions.push(legacy_transaction("tip", &["buyer0", JITO_TIP_ACCOUNTS[2]], false));
        }
        transactions.push(legacy_transaction("noise", &["someone", "OtherProgram"], false));
        Block { slot: SLOT, transactions }
    }

    async fn harness(chain: InMemoryChain, block_fetch_attempts: u32) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(chain);
        let sink = Arc::new(RecordingSink::new());
        let registry = Arc::new(LaunchRegistry::new());

        let mut retention = RetentionConfig::default();
        retention.delay_secs = 0;
        let runner = Arc::new(RetentionCheckRunner::new(
            chain.clone(),
            sink.clone(),
            RetentionMonitor::new(retention.clone()),
            registry.clone(),
        ));
        let scheduler = RetentionScheduler::open(dir.path().join("pending.json"), runner)
            .await
            .unwrap();

        let coordinator = Arc::new(LaunchCoordinator::new(
            chain.clone(),
            sink.clone(),
            BundleClassifier::new(&BundleConfig::default()),
            FundingTracer::new(FundingConfig::default()),
            scheduler.clone(),
            registry,
            PROGRAM,
            CoordinatorSettings {
                propagation_delay_ms: 0,
                block_fetch_attempts,
                ..CoordinatorSettings::default()
            },
            retention.delay(),
        ));

        Harness {
            coordinator,
            chain,
            sink,
            scheduler,
            _dir: dir,
        }
    }

    async fn start(h: &Harness) -> LaunchState {
        assert!(h.coordinator.registry().begin("create"));
        h.coordinator.process(LaunchEvent::new("create", SLOT)).await
    }

    async fn wait_for_state(h: &Harness, expected: LaunchState) {
        for _ in 0..200 {
            if h.coordinator.registry().state("create") == Some(expected) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "launch never reached {:?}, still {:?}",
            expected,
            h.coordinator.registry().state("create")
        );
    }

    #[tokio::test]
    async fn crowded_block_emits_farm_signal_with_funding_evidence() {
        let mut chain = InMemoryChain::new().with_block(launch_block(12, true));
        for i in 0..12 {
            chain = chain.with_funding(&format!("buyer{i}"), "Deployer", SLOT);
        }
        let h = harness(chain, 3).await;

        assert_eq!(start(&h).await, LaunchState::FarmDetected);

        let signals = h.sink.signals();
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.strategy, Strategy::Farm);
        assert_eq!(signal.mint, MINT);
        assert_eq!(signal.slot, SLOT);
        // dev plus twelve buyers
        assert_eq!(signal.buyer_count, 13);
        assert!(signal.notes.contains("Jito tip detected"));
        assert!(signal.notes.contains("CRITICAL cluster"));
        assert!(h.scheduler.pending().await.is_empty());
    }

    #[tokio::test]
    async fn quiet_block_confirms_supply_shock_after_retention() {
        let buyers = ["dev", "buyer0", "buyer1", "buyer2"];
        let mut chain = InMemoryChain::new()
            .with_block(launch_block(3, false))
            .with_history(
                MINT,
                (0..60).map(|i| signature(&format!("act{i}"), SLOT + 60 - i)).collect(),
            );
        for buyer in buyers {
            chain = chain.with_balance(buyer, MINT, 5_000_000.0);
        }
        let h = harness(chain, 3).await;

        assert_eq!(start(&h).await, LaunchState::AwaitingRetentionCheck);
        wait_for_state(&h, LaunchState::SupplyShockConfirmed).await;

        let signals = h.sink.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].strategy, Strategy::SupplyShock);
        assert_eq!(signals[0].buyer_count, 4);
        assert!(signals[0].notes.starts_with("Retention: 100% (held 4/4)"));
        assert!(signals[0].notes.contains("No funder found"));
    }

    #[tokio::test]
    async fn dumped_launch_is_rejected_silently() {
        let mut chain = InMemoryChain::new()
            .with_block(launch_block(3, false))
            .with_history(
                MINT,
                (0..60).map(|i| signature(&format!("act{i}"), SLOT + 60 - i)).collect(),
            );
        chain = chain.with_balance("dev", MINT, 5_000_000.0);
        let h = harness(chain, 3).await;

        start(&h).await;
        wait_for_state(&h, LaunchState::Rejected).await;
        assert!(h.sink.signals().is_empty());
    }

    #[tokio::test]
    async fn missing_block_is_rejected_after_retries() {
        let h = harness(InMemoryChain::new(), 3).await;

        assert_eq!(start(&h).await, LaunchState::Rejected);
        assert_eq!(h.chain.block_calls(), 3);
        assert_eq!(h.coordinator.registry().state("create"), Some(LaunchState::Rejected));
        assert!(h.sink.signals().is_empty());
    }

    #[tokio::test]
    async fn lagging_block_is_found_on_retry() {
        let chain = InMemoryChain::new()
            .with_block(launch_block(12, false))
            .with_block_lag(2);
        let h = harness(chain, 3).await;

        assert_eq!(start(&h).await, LaunchState::FarmDetected);
        assert_eq!(h.chain.block_calls(), 3);
    }

    #[tokio::test]
    async fn unknown_creation_transaction_is_missing_data() {
        let mut block = launch_block(12, false);
        block.transactions[0].post_token_balances.clear();
        let h = harness(InMemoryChain::new().with_block(block), 1).await;

        assert_eq!(start(&h).await, LaunchState::Rejected);
        assert!(h.sink.signals().is_empty());
    }

    #[tokio::test]
    async fn run_loop_ignores_duplicate_notifications() {
        let h = harness(InMemoryChain::new().with_block(launch_block(12, false)), 1).await;
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(h.coordinator.clone().run(rx, shutdown_rx));
        tx.send(LaunchEvent::new("create", SLOT)).unwrap();
        tx.send(LaunchEvent::new("create", SLOT)).unwrap();

        wait_for_state(&h, LaunchState::FarmDetected).await;
        drop(tx);
        task.await.unwrap().unwrap();
        drop(shutdown_tx);

        assert_eq!(h.sink.signals().len(), 1);
        assert_eq!(h.chain.block_calls(), 1);
    }
}
