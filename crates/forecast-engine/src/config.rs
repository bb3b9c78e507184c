use forecast_core::{BarInterval, HistoryPeriod};
use std::time::Duration;

/// Runtime settings for the engine and its scheduler.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scheduler period.
    pub update_interval: Duration,
    /// History fetched for on-demand forecasts.
    pub history_period: HistoryPeriod,
    pub history_interval: BarInterval,
    /// Budget per train/refresh; `None` waits for completion.
    pub retrain_timeout: Option<Duration>,
    /// Rolling cap on each model's retained history.
    pub history_cap: Option<usize>,
    /// Drop a symbol's models when it is unsubscribed.
    pub evict_on_untrack: bool,
    pub broadcast_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(5),
            history_period: HistoryPeriod::Year1,
            history_interval: BarInterval::Day1,
            retrain_timeout: None,
            history_cap: None,
            evict_on_untrack: true,
            broadcast_capacity: 2048,
        }
    }
}
