use chrono::Utc;
use forecast_core::{ForecastError, MarketDataSource, StockUpdate};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::publisher::UpdateBroadcast;
use crate::registry::ModelRegistry;
use crate::tracking::TrackingSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing tracked; the cycle did no work.
    Idle,
    Cycling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub state: SchedulerState,
    /// Symbols an update was published for.
    pub published: Vec<String>,
    /// Symbols skipped because the latest bar could not be fetched.
    pub skipped: Vec<String>,
}

/// Pulls the latest bar for every tracked symbol, refreshes that symbol's
/// models and publishes one update per symbol.
#[derive(Clone)]
pub struct LiveUpdateScheduler {
    data: Arc<dyn MarketDataSource>,
    registry: Arc<ModelRegistry>,
    tracking: Arc<TrackingSet>,
    publisher: Arc<UpdateBroadcast>,
    refresh_timeout: Option<Duration>,
}

impl LiveUpdateScheduler {
    pub fn new(
        data: Arc<dyn MarketDataSource>,
        registry: Arc<ModelRegistry>,
        tracking: Arc<TrackingSet>,
        publisher: Arc<UpdateBroadcast>,
        refresh_timeout: Option<Duration>,
    ) -> Self {
        Self {
            data,
            registry,
            tracking,
            publisher,
            refresh_timeout,
        }
    }

    /// One pass over a snapshot of the tracking set. Symbols are handled
    /// concurrently; a failure for one never affects the others.
    pub async fn run_cycle(&self) -> CycleReport {
        let symbols = self.tracking.snapshot();
        if symbols.is_empty() {
            return CycleReport {
                state: SchedulerState::Idle,
                published: Vec::new(),
                skipped: Vec::new(),
            };
        }

        let results = join_all(symbols.into_iter().map(|symbol| async move {
            let outcome = self.update_symbol(&symbol).await;
            (symbol, outcome)
        }))
        .await;

        let mut report = CycleReport {
            state: SchedulerState::Cycling,
            published: Vec::new(),
            skipped: Vec::new(),
        };
        for (symbol, outcome) in results {
            match outcome {
                Ok(_) => report.published.push(symbol),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Skipping symbol this cycle");
                    report.skipped.push(symbol);
                }
            }
        }
        report
    }

    async fn update_symbol(&self, symbol: &str) -> Result<StockUpdate, ForecastError> {
        let bar = self.data.get_latest_bar(symbol).await?;

        let registry = self.registry.clone();
        let owned_symbol = symbol.to_string();
        let refresh_bar = bar.clone();
        let task = tokio::task::spawn_blocking(move || registry.refresh_all(&owned_symbol, &refresh_bar));

        let joined = match self.refresh_timeout {
            Some(limit) => match time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The refresh keeps running and holds its model locks
                    // until done; this cycle reports no predictions.
                    warn!(symbol, timeout_ms = limit.as_millis() as u64, "Refresh timed out");
                    Ok(BTreeMap::new())
                }
            },
            None => task.await,
        };
        let predictions = joined.unwrap_or_else(|e| {
            warn!(symbol, error = %e, "Refresh task failed");
            BTreeMap::new()
        });

        let update = StockUpdate {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            price: bar.close,
            change: bar.change(),
            predictions,
        };
        self.publisher.publish(update.clone()).await;
        Ok(update)
    }

    /// Run cycles every `period` on a background task until stopped.
    pub fn spawn(self, period: Duration) -> SchedulerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_ms = period.as_millis() as u64, "Live update scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = self.run_cycle().await;
                        debug!(
                            state = ?report.state,
                            published = report.published.len(),
                            skipped = report.skipped.len(),
                            "Update cycle complete"
                        );
                    }
                    _ = signal.notified() => {
                        info!("Live update scheduler stopping");
                        break;
                    }
                }
            }
        });

        SchedulerHandle { shutdown, handle }
    }
}

/// Stop handle for a spawned scheduler loop.
pub struct SchedulerHandle {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for it to exit. An in-flight cycle finishes
    /// first.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
