use anyhow::Result;
use launchguard_core::chain::SignalSink;
use launchguard_core::types::Signal;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{error, info, instrument, warn};

/// Drains the signal bus into a persistent sink.
pub struct SignalRecorder {
    receiver: broadcast::Receiver<Signal>,
    sink: Arc<dyn SignalSink>,
}

impl SignalRecorder {
    pub fn new(receiver: broadcast::Receiver<Signal>, sink: Arc<dyn SignalSink>) -> Self {
        Self { receiver, sink }
    }

    /// Runs until the bus closes or shutdown is signalled. Signals already
    /// queued at shutdown are still written.
    #[instrument(skip_all)]
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!("📝 Signal recorder started");
        let mut recorded = 0u64;

        loop {
            tokio::select! {
                received = self.receiver.recv() => match received {
                    Ok(signal) => {
                        self.record(&signal).await;
                        recorded += 1;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Signal recorder lagged, signals dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.recv() => {
                    loop {
                        match self.receiver.try_recv() {
                            Ok(signal) => {
                                self.record(&signal).await;
                                recorded += 1;
                            }
                            Err(TryRecvError::Lagged(skipped)) => {
                                warn!(skipped, "Signal recorder lagged, signals dropped");
                            }
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }

        info!(recorded, "🛑 Signal recorder stopped");
        Ok(())
    }

    async fn record(&self, signal: &Signal) {
        if let Err(e) = self.sink.append(signal).await {
            error!(
                mint = %signal.mint,
                strategy = %signal.strategy,
                slot = signal.slot,
                error = %e,
                "Failed to persist signal"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchguard_core::testing::RecordingSink;
    use launchguard_core::types::Strategy;
    use launchguard_transport::SignalBus;

    #[tokio::test]
    async fn records_published_signals_until_shutdown() {
        let bus = SignalBus::new(16);
        let sink = Arc::new(RecordingSink::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let recorder = SignalRecorder::new(bus.subscribe(), sink.clone());
        bus.publish(Signal::new("M1", Strategy::Farm, 1, 12, "")).unwrap();
        bus.publish(Signal::new("M2", Strategy::SupplyShock, 2, 4, "")).unwrap();

        let task = tokio::spawn(recorder.run(shutdown_rx));
        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();

        let mints: Vec<String> = sink.signals().into_iter().map(|s| s.mint).collect();
        assert_eq!(mints, vec!["M1", "M2"]);
    }

    #[tokio::test]
    async fn stops_when_bus_closes() {
        let bus = SignalBus::new(4);
        let sink = Arc::new(RecordingSink::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let recorder = SignalRecorder::new(bus.subscribe(), sink.clone());
        bus.publish(Signal::new("M1", Strategy::Farm, 1, 12, "")).unwrap();
        drop(bus);

        recorder.run(shutdown_rx).await.unwrap();
        assert_eq!(sink.signals().len(), 1);
    }
}
