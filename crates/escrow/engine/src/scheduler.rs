//! Auto-release scheduler
//!
//! One shared tick scans the store's pending-release index and releases
//! whatever is due. Double release is prevented by the engine's state
//! guard, not here, so a tick racing a manual claim is harmless.

use crate::engine::EscrowEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick cadence; smaller means tighter release precision
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Contracts found due
    pub due: usize,
    pub released: usize,
    /// Already settled by someone else
    pub skipped: usize,
    /// Left pending; retried next tick
    pub failed: usize,
}

pub struct ReleaseScheduler {
    engine: Arc<EscrowEngine>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl ReleaseScheduler {
    pub fn new(engine: Arc<EscrowEngine>, config: SchedulerConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            config,
            running: Arc::new(RwLock::new(false)),
        })
    }

    /// Release every due contract once. Never returns an error; failures
    /// stay in the pending index for the next tick.
    pub async fn tick(&self) -> TickSummary {
        let now = self.engine.clock().now();
        let due = self.engine.store().due(now);
        let mut summary = TickSummary {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return summary;
        }

        let mut releases = JoinSet::new();
        for contract_id in due {
            let engine = Arc::clone(&self.engine);
            releases.spawn(async move {
                let result = engine.release_expired(&contract_id).await;
                (contract_id, result)
            });
        }

        while let Some(joined) = releases.join_next().await {
            match joined {
                Ok((_, Ok(true))) => summary.released += 1,
                Ok((_, Ok(false))) => summary.skipped += 1,
                Ok((contract_id, Err(e))) => {
                    warn!(contract_id = %contract_id, error = %e, "auto-release failed, will retry");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "auto-release task aborted");
                    summary.failed += 1;
                }
            }
        }

        debug!(
            due = summary.due,
            released = summary.released,
            skipped = summary.skipped,
            failed = summary.failed,
            "scheduler tick"
        );
        summary
    }

    /// Run ticks until [`stop`](Self::stop) is called
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        info!(tick_interval_ms = self.config.tick_interval_ms, "release scheduler started");

        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if !*self.running.read().await {
                break;
            }

            self.tick().await;
        }

        info!("release scheduler stopped");
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
