use forecast_core::MarketCalendar;
use serde::{Deserialize, Serialize};

/// ARIMA(p, d, 0) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArimaConfig {
    pub ar_order: usize,
    pub differencing: usize,
    /// Central coverage of the reported interval.
    pub interval_width: f64,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self {
            ar_order: 5,
            differencing: 1,
            interval_width: 0.95,
        }
    }
}

impl ArimaConfig {
    /// Fewest closes a fit will accept.
    pub fn min_history(&self) -> usize {
        self.ar_order + self.differencing + 10
    }
}

/// Additive trend + seasonality settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub daily_seasonality: bool,
    pub yearly_fourier_order: usize,
    pub weekly_fourier_order: usize,
    pub daily_fourier_order: usize,
    /// Trend flexibility; smaller values give a stiffer trend.
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub holidays_prior_scale: f64,
    pub n_changepoints: usize,
    /// Share of history (from the start) eligible for changepoints.
    pub changepoint_range: f64,
    pub interval_width: f64,
    pub calendar: MarketCalendar,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            yearly_seasonality: true,
            weekly_seasonality: true,
            daily_seasonality: true,
            yearly_fourier_order: 10,
            weekly_fourier_order: 3,
            daily_fourier_order: 4,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            holidays_prior_scale: 10.0,
            n_changepoints: 25,
            changepoint_range: 0.8,
            interval_width: 0.95,
            calendar: MarketCalendar::UsMarket,
        }
    }
}

/// Bagged regression-tree settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

/// Moving-average fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Number of trailing closes averaged into the base price.
    pub window: usize,
    /// Jitter half-range as a fraction of the base (0.01 = +/-1%).
    pub jitter: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { window: 5, jitter: 0.01 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub arima: ArimaConfig,
    pub decomposition: DecompositionConfig,
    pub ensemble: EnsembleConfig,
    pub fallback: FallbackConfig,
}
