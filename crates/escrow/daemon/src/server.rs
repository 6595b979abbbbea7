//! Daemon setup and lifecycle management

use crate::config::{DaemonConfig, LedgerMode, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::explorer::ExplorerClient;
use escrow_engine::{
    Clock, DisconnectedWallet, EscrowEngine, InMemorySnapshotStore, JsonFileSnapshotStore,
    LedgerQuery, ReleaseScheduler, SimulatedLedger, SnapshotStore, SystemClock, Wallet,
    WorkerRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Escrow daemon
pub struct Server {
    config: DaemonConfig,
    engine: Arc<EscrowEngine>,
    scheduler: Arc<ReleaseScheduler>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl Server {
    /// Build the engine and restore the last snapshot, if any
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let mut simulated = None;
        let (wallet, ledger): (Arc<dyn Wallet>, Arc<dyn LedgerQuery>) = match config.ledger.mode {
            LedgerMode::Simulated => {
                let ledger = Arc::new(SimulatedLedger::new(config.ledger.wallet_address.clone()));
                simulated = Some(ledger.clone());
                let wallet: Arc<dyn Wallet> = ledger.clone();
                let ledger: Arc<dyn LedgerQuery> = ledger;
                (wallet, ledger)
            }
            LedgerMode::Explorer => {
                let client = ExplorerClient::new(
                    config.ledger.explorer_api_url.clone(),
                    Duration::from_secs(config.ledger.request_timeout_secs),
                )
                .map_err(|e| DaemonError::Ledger(e.to_string()))?;
                let wallet: Arc<dyn Wallet> = Arc::new(DisconnectedWallet);
                let ledger: Arc<dyn LedgerQuery> = Arc::new(client);
                (wallet, ledger)
            }
        };

        let snapshots: Arc<dyn SnapshotStore> = match &config.storage {
            StorageConfig::Memory => Arc::new(InMemorySnapshotStore::new()),
            StorageConfig::File { path } => Arc::new(JsonFileSnapshotStore::new(path.clone())),
        };

        let registry = if config.registry.seed_defaults {
            WorkerRegistry::seeded(clock.now())
        } else {
            WorkerRegistry::new()
        };

        let engine = Arc::new(EscrowEngine::new(
            config.engine.clone(),
            registry,
            wallet,
            ledger,
            clock,
        ));

        if let Some(snapshot) = snapshots.load().await? {
            engine.restore(snapshot).await;

            // The simulated ledger starts empty; put back what restored contracts hold
            if let Some(simulated) = &simulated {
                let contracts = engine.contracts().await;
                let restored =
                    simulated.restore_escrowed(&config.engine.deposit_address, &contracts);
                tracing::info!(restored, "re-seeded simulated ledger from snapshot");
            }
        }

        let scheduler = ReleaseScheduler::new(engine.clone(), config.scheduler.release_scheduler());

        Ok(Self {
            config,
            engine,
            scheduler,
            snapshots,
        })
    }

    pub fn engine(&self) -> &Arc<EscrowEngine> {
        &self.engine
    }

    /// Persist the current engine state
    pub async fn save(&self) -> DaemonResult<()> {
        let snapshot = self.engine.snapshot().await;
        self.snapshots.save(&snapshot).await?;
        Ok(())
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        tracing::info!(
            ledger_mode = ?self.config.ledger.mode,
            deposit_address = %self.config.engine.deposit_address,
            workers = self.engine.registry().len(),
            contracts = self.engine.store().len(),
            "escrowd starting"
        );

        // At least one reconciliation pass at startup; failure is not fatal
        let _ = self.engine.reconcile().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler_handle = tokio::spawn(self.scheduler.clone().start());
        let loops = vec![
            spawn_event_log(self.engine.subscribe(), shutdown_rx.clone()),
            spawn_reconcile_loop(
                self.engine.clone(),
                Duration::from_secs(self.config.scheduler.reconcile_interval_secs),
                shutdown_rx.clone(),
            ),
            spawn_autosave_loop(
                self.engine.clone(),
                self.snapshots.clone(),
                Duration::from_secs(self.config.scheduler.autosave_interval_secs),
                shutdown_rx,
            ),
        ];

        shutdown_signal().await;

        tracing::info!("escrowd shutting down");

        self.scheduler.stop().await;
        let _ = shutdown_tx.send(true);
        if let Err(e) = scheduler_handle.await {
            tracing::warn!(error = %e, "release scheduler task failed");
        }
        for handle in loops {
            let _ = handle.await;
        }

        self.save().await?;
        tracing::info!("final snapshot saved");

        Ok(())
    }
}

fn spawn_reconcile_loop(
    engine: Arc<EscrowEngine>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; startup already reconciled
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are logged and reported by the engine
                    let _ = engine.reconcile().await;
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

fn spawn_autosave_loop(
    engine: Arc<EscrowEngine>,
    snapshots: Arc<dyn SnapshotStore>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = engine.snapshot().await;
                    if let Err(e) = snapshots.save(&snapshot).await {
                        tracing::error!(error = %e, "autosave failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

fn spawn_event_log(
    mut events: broadcast::Receiver<escrow_types::EscrowEventEnvelope>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(envelope) => tracing::debug!(
                        event_id = %envelope.id,
                        source = ?envelope.source,
                        event = ?envelope.event,
                        "escrow event"
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event log lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
