use crate::coordinator::registry::LaunchRegistry;
use crate::scheduler::{DueCheckHandler, PendingCheck};
use async_trait::async_trait;
use launchguard_core::chain::{ChainDataSource, SignalSink};
use launchguard_core::types::LaunchState;
use launchguard_stalker::{RetentionMonitor, RetentionOutcome};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Runs the retention monitor when a scheduled check comes due and records
/// the final launch state.
pub struct RetentionCheckRunner {
    chain: Arc<dyn ChainDataSource>,
    sink: Arc<dyn SignalSink>,
    monitor: RetentionMonitor,
    registry: Arc<LaunchRegistry>,
}

impl RetentionCheckRunner {
    pub fn new(
        chain: Arc<dyn ChainDataSource>,
        sink: Arc<dyn SignalSink>,
        monitor: RetentionMonitor,
        registry: Arc<LaunchRegistry>,
    ) -> Self {
        Self {
            chain,
            sink,
            monitor,
            registry,
        }
    }

    #[instrument(skip(self, check), fields(mint = %check.mint, slot = check.slot))]
    pub async fn run_check(&self, check: &PendingCheck) -> LaunchState {
        self.registry.resume_awaiting(&check.creation_tx_id);

        let request = check.to_request();
        let next = match self.monitor.evaluate(self.chain.as_ref(), &request).await {
            Ok(RetentionOutcome::Confirmed { signal, .. }) => {
                if let Err(e) = self.sink.append(&signal).await {
                    error!(strategy = %signal.strategy, error = %e, "Failed to emit supply-shock signal");
                }
                LaunchState::SupplyShockConfirmed
            }
            Ok(RetentionOutcome::Rejected { record }) => {
                info!(score = record.retention_score, "Launch rejected at retention check");
                LaunchState::Rejected
            }
            Ok(RetentionOutcome::ClinicallyDead { transactions }) => {
                info!(transactions, "Launch rejected as clinically dead");
                LaunchState::Rejected
            }
            Err(e) => {
                warn!(stage = %e.stage(), error = %e, "Retention check aborted");
                LaunchState::Rejected
            }
        };

        // Refusals are logged by the registry.
        let _ = self.registry.advance(&check.creation_tx_id, next);
        next
    }
}

#[async_trait]
impl DueCheckHandler for RetentionCheckRunner {
    async fn on_due(&self, check: PendingCheck) {
        self.run_check(&check).await;
    }
}
