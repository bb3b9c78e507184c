use forecast_core::{BarSeries, Forecast, ForecastError, MarketDataSource, StockUpdate, Technique};
use forecast_models::{fallback_forecast, ModelConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub mod config;
pub mod publisher;
pub mod registry;
pub mod scheduler;
pub mod tracking;


pub use config::EngineConfig;
pub use publisher::UpdateBroadcast;
pub use registry::{lock_model, ModelRegistry, RegistryKey, SharedModel};
pub use scheduler::{CycleReport, LiveUpdateScheduler, SchedulerHandle, SchedulerState};
pub use tracking::{normalize_symbol, TrackingSet};

/// Process-scoped forecasting context: registry, tracking set, publisher
/// and the scheduler built over them.
pub struct ForecastEngine {
    data: Arc<dyn MarketDataSource>,
    registry: Arc<ModelRegistry>,
    tracking: Arc<TrackingSet>,
    publisher: Arc<UpdateBroadcast>,
    config: EngineConfig,
}

impl ForecastEngine {
    pub fn new(data: Arc<dyn MarketDataSource>, model_config: ModelConfig, config: EngineConfig) -> Self {
        let tracking = Arc::new(TrackingSet::new());
        let registry = Arc::new(ModelRegistry::new(model_config, config.history_cap, tracking.clone()));
        let publisher = Arc::new(UpdateBroadcast::new(config.broadcast_capacity));
        Self {
            data,
            registry,
            tracking,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn tracking(&self) -> &Arc<TrackingSet> {
        &self.tracking
    }

    /// Fetch history for `symbol` and train the requested model on it.
    ///
    /// Data errors propagate; fit problems come back as a fallback
    /// `Forecast`. The symbol is tracked afterwards.
    pub async fn request_forecast(
        &self,
        symbol: &str,
        technique: Technique,
        horizon: usize,
    ) -> Result<Forecast, ForecastError> {
        let symbol = validate_request(symbol, horizon)?;
        let history = self
            .data
            .get_history(&symbol, self.config.history_period, self.config.history_interval)
            .await?;
        self.train(symbol, technique, history, horizon).await
    }

    /// Same as `request_forecast` with caller-supplied history.
    pub async fn forecast_with_history(
        &self,
        symbol: &str,
        technique: Technique,
        history: BarSeries,
        horizon: usize,
    ) -> Result<Forecast, ForecastError> {
        let symbol = validate_request(symbol, horizon)?;
        self.train(symbol, technique, history, horizon).await
    }

    async fn train(
        &self,
        symbol: String,
        technique: Technique,
        history: BarSeries,
        horizon: usize,
    ) -> Result<Forecast, ForecastError> {
        info!(symbol = %symbol, technique = %technique, bars = history.len(), horizon, "Training model");

        let registry = self.registry.clone();
        let task_symbol = symbol.clone();
        // Kept for the timeout path, where the blocked task owns the original.
        let backup = self.config.retrain_timeout.map(|_| history.clone());
        let task = tokio::task::spawn_blocking(move || registry.forecast(&task_symbol, technique, history, horizon));

        let joined = match self.config.retrain_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    let reason = ForecastError::Timeout(format!("training exceeded {:?}", limit));
                    warn!(symbol = %symbol, technique = %technique, error = %reason, "Using moving-average fallback");
                    self.tracking.track(&symbol);
                    let series = backup.ok_or_else(|| ForecastError::InvalidData("missing history".to_string()))?;
                    return Ok(fallback_forecast(
                        technique,
                        &series,
                        horizon,
                        self.registry.model_config(),
                        reason.to_string(),
                    ));
                }
            },
            None => task.await,
        };

        joined.map_err(|e| ForecastError::FitFailure(format!("training task failed: {}", e)))
    }

    /// Track `symbol` for live updates, with or without trained models.
    pub fn subscribe(&self, symbol: &str) -> Result<(), ForecastError> {
        let symbol = normalize_symbol(symbol).ok_or_else(|| ForecastError::InvalidData("empty symbol".to_string()))?;
        if self.tracking.track(&symbol) {
            info!(symbol = %symbol, "Subscribed");
        }
        Ok(())
    }

    /// Stop live updates for `symbol`; evicts its models when configured.
    pub async fn unsubscribe(&self, symbol: &str) {
        let Some(symbol) = normalize_symbol(symbol) else {
            return;
        };
        if self.registry.untrack(&symbol, self.config.evict_on_untrack) {
            info!(symbol = %symbol, "Unsubscribed");
        }
        if self.config.evict_on_untrack {
            self.publisher.forget(&symbol).await;
        }
    }

    pub fn updates(&self) -> broadcast::Receiver<StockUpdate> {
        self.publisher.subscribe()
    }

    pub async fn latest_update(&self, symbol: &str) -> Option<StockUpdate> {
        let symbol = normalize_symbol(symbol)?;
        self.publisher.latest(&symbol).await
    }

    pub fn scheduler(&self) -> LiveUpdateScheduler {
        LiveUpdateScheduler::new(
            self.data.clone(),
            self.registry.clone(),
            self.tracking.clone(),
            self.publisher.clone(),
            self.config.retrain_timeout,
        )
    }

    /// Spawn the scheduler loop at the configured period.
    pub fn start_scheduler(&self) -> SchedulerHandle {
        self.scheduler().spawn(self.config.update_interval)
    }
}

fn validate_request(symbol: &str, horizon: usize) -> Result<String, ForecastError> {
    if horizon == 0 {
        return Err(ForecastError::InvalidData("horizon must be positive".to_string()));
    }
    normalize_symbol(symbol).ok_or_else(|| ForecastError::InvalidData("empty symbol".to_string()))
}
