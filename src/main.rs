use anyhow::{Context, Result};
use launchguard::chain::RpcChainSource;
use launchguard::config::Settings;
use launchguard::coordinator::{LaunchCoordinator, LaunchRegistry, RetentionCheckRunner};
use launchguard::database::{SignalRecorder, SignalStore};
use launchguard::logging::init_tracing;
use launchguard::scheduler::RetentionScheduler;
use launchguard_core::chain::{ChainDataSource, SignalSink};
use launchguard_core::rate_limit::RequestPacer;
use launchguard_core::types::LaunchEvent;
use launchguard_ingest::LogSubscriptionClient;
use launchguard_scout::{BundleClassifier, FundingTracer};
use launchguard_stalker::RetentionMonitor;
use launchguard_transport::SignalBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Time given to retention checks already being evaluated at shutdown.
const CHECK_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Everything the long-running tasks need, built once from settings.
struct Pipeline {
    stream: LogSubscriptionClient,
    launches: mpsc::UnboundedReceiver<LaunchEvent>,
    coordinator: Arc<LaunchCoordinator>,
    recorder: SignalRecorder,
    scheduler: RetentionScheduler,
}

impl Pipeline {
    #[instrument(skip_all)]
    async fn build(settings: &Settings) -> Result<Self> {
        let pacer = Arc::new(RequestPacer::new(
            settings.rpc.request_spacing(),
            settings.rpc.burst,
        ));
        let chain: Arc<dyn ChainDataSource> = Arc::new(RpcChainSource::new(
            settings.rpc.http_url.clone(),
            settings.rpc.commitment_config()?,
            settings.rpc.timeout(),
            pacer,
        ));

        let store = SignalStore::open(&settings.storage.signals_path)
            .await
            .context("failed to open signal store")?;
        let bus = Arc::new(SignalBus::default());
        // Subscribe before anything can publish.
        let recorder = SignalRecorder::new(bus.subscribe(), Arc::new(store));
        let sink: Arc<dyn SignalSink> = bus;

        let registry = Arc::new(LaunchRegistry::with_tombstone_ttl(
            settings.coordinator.tombstone_ttl(),
        ));
        let runner = Arc::new(RetentionCheckRunner::new(
            chain.clone(),
            sink.clone(),
            RetentionMonitor::new(settings.retention.clone()),
            registry.clone(),
        ));
        let scheduler = RetentionScheduler::open(&settings.storage.pending_checks_path, runner)
            .await
            .context("failed to open pending retention checks")?;

        let coordinator = Arc::new(LaunchCoordinator::new(
            chain,
            sink,
            BundleClassifier::new(&settings.bundle),
            FundingTracer::new(settings.funding.clone()),
            scheduler.clone(),
            registry,
            settings.program.target_program_id.clone(),
            settings.coordinator.clone(),
            settings.retention.delay(),
        ));

        let (stream, launches) = LogSubscriptionClient::new(
            settings.stream.clone(),
            settings.program.target_program_id.clone(),
        );

        Ok(Self {
            stream,
            launches,
            coordinator,
            recorder,
            scheduler,
        })
    }
}

struct ServiceOrchestrator {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<Result<()>>>,
    scheduler: Option<RetentionScheduler>,
}

impl ServiceOrchestrator {
    fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
            scheduler: None,
        }
    }

    #[instrument(skip_all)]
    async fn start_all_services(&mut self, pipeline: Pipeline) -> Result<()> {
        info!("🚀 Starting launchguard services");
        let Pipeline {
            stream,
            launches,
            coordinator,
            recorder,
            scheduler,
        } = pipeline;

        // Recorder first so no signal is published without a subscriber.
        let recorder_shutdown = self.shutdown_tx.subscribe();
        self.tasks
            .push(tokio::spawn(async move { recorder.run(recorder_shutdown).await }));

        let coordinator_shutdown = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            coordinator.run(launches, coordinator_shutdown).await
        }));

        let restored = scheduler.restore().await;
        if restored > 0 {
            info!(restored, "Pending retention checks resumed");
        }
        self.scheduler = Some(scheduler);

        let mut stream_shutdown = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            info!("🔄 Log subscription starting");
            tokio::select! {
                result = stream.run() => {
                    match &result {
                        Ok(()) => info!("Log subscription completed"),
                        Err(e) => error!("Log subscription error: {}", e),
                    }
                    result
                }
                _ = stream_shutdown.recv() => {
                    info!("🛑 Log subscription shutting down gracefully");
                    Ok(())
                }
            }
        }));

        info!("✅ All {} services started", self.tasks.len());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn shutdown_all(&mut self) -> Result<()> {
        info!("🛑 Shutting down all services");

        // Before the bus goes down, so a check finishing now still records
        // its signal. Waiting checks stay on disk for the next start.
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown(CHECK_SHUTDOWN_GRACE).await;
        }

        let _ = self.shutdown_tx.send(());
        debug!("Shutdown signal sent to all services");

        let mut results = Vec::new();
        for task in self.tasks.drain(..) {
            results.push(task.await);
        }

        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(Ok(())) => info!("✅ Service {} shut down cleanly", i + 1),
                Ok(Err(e)) => warn!("⚠️  Service {} error during shutdown: {}", i + 1, e),
                Err(e) => error!("❌ Service {} task failed: {}", i + 1, e),
            }
        }

        info!("✅ All services shut down");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    init_tracing(&settings.logging)?;

    info!("🛡️ Launchguard - launch integrity monitor");
    info!(
        program = %settings.program.target_program_id,
        rpc = %settings.rpc.http_url,
        ws = %settings.stream.primary_url,
        "Configuration loaded"
    );

    let pipeline = Pipeline::build(&settings).await?;
    let mut orchestrator = ServiceOrchestrator::new();

    match orchestrator.start_all_services(pipeline).await {
        Ok(()) => {
            info!("🎯 Watching for new launches");
            info!("Press Ctrl+C to shutdown");
        }
        Err(e) => {
            error!("Failed to start services: {}", e);
            return Err(e);
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    orchestrator.shutdown_all().await?;

    info!("👋 Launchguard shutdown complete");
    Ok(())
}
