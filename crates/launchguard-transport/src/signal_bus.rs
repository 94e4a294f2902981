use anyhow::Result;
use async_trait::async_trait;
use launchguard_core::chain::SignalSink;
use launchguard_core::error::SinkError;
use launchguard_core::types::Signal;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_CAPACITY: usize = 1000;

/// Fan-out of emitted signals to every subscriber (recorder, console, ...).
#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<Signal>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SignalBus {
    #[instrument]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        debug!(capacity, "SignalBus initialized");
        Self { tx }
    }

    /// Returns the number of subscribers that will see the signal.
    #[instrument(skip(self, signal), fields(mint = %signal.mint, strategy = %signal.strategy))]
    pub fn publish(&self, signal: Signal) -> Result<usize> {
        match self.tx.send(signal) {
            Ok(subscriber_count) => {
                info!(subscriber_count, "Published signal to signal bus");
                Ok(subscriber_count)
            }
            Err(e) => {
                warn!(error = %e, "Failed to publish signal to signal bus");
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        let receiver = self.tx.subscribe();
        debug!("New subscriber added to signal bus");
        receiver
    }
}

#[async_trait]
impl SignalSink for SignalBus {
    async fn append(&self, signal: &Signal) -> Result<(), SinkError> {
        self.publish(signal.clone())
            .map(|_| ())
            .map_err(|e| SinkError::Closed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchguard_core::types::Strategy;

    fn farm_signal() -> Signal {
        Signal::new("FarmMint", Strategy::Farm, 42, 15, "tip account hit")
    }

    #[tokio::test]
    async fn every_subscriber_receives_signal() {
        let bus = SignalBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(farm_signal()).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap().mint, "FarmMint");
        assert_eq!(second.recv().await.unwrap().strategy, Strategy::Farm);
    }

    #[tokio::test]
    async fn sink_append_fails_without_subscribers() {
        let bus = SignalBus::new(4);
        let err = bus.append(&farm_signal()).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed(_)));
    }

    #[tokio::test]
    async fn sink_append_delivers_copy() {
        let bus = SignalBus::new(4);
        let mut rx = bus.subscribe();
        let signal = farm_signal();

        bus.append(&signal).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), signal);
    }
}
