use anyhow::{bail, Context, Result};
use forecast_core::{BarInterval, HistoryPeriod, Technique};
use forecast_engine::{normalize_symbol, EngineConfig};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    // External APIs
    pub polygon_api_key: String,
    pub polygon_rate_limit: usize,         // requests per minute

    // Forecasting
    pub watchlist: Vec<String>,
    pub techniques: Vec<Technique>,
    pub horizon: usize,                    // business days per on-demand forecast

    // Engine and scheduler
    pub engine: EngineConfig,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let watchlist: Vec<String> = var("WATCHLIST", "AAPL,MSFT,GOOGL,AMZN,NVDA")
            .split(',')
            .filter_map(normalize_symbol)
            .collect();

        let techniques = var("FORECAST_MODELS", "autoregressive,decomposition,ensemble")
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse::<Technique>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Invalid FORECAST_MODELS")?;

        let update_interval_secs: u64 = var("UPDATE_INTERVAL_SECS", "5")
            .parse()
            .context("Invalid UPDATE_INTERVAL_SECS")?;

        let retrain_timeout = match lookup("RETRAIN_TIMEOUT_SECS") {
            Some(v) => Some(Duration::from_secs(v.parse().context("Invalid RETRAIN_TIMEOUT_SECS")?)),
            None => None,
        };

        let history_cap = match lookup("HISTORY_CAP") {
            Some(v) => Some(v.parse::<usize>().context("Invalid HISTORY_CAP")?),
            None => None,
        };

        let engine = EngineConfig {
            update_interval: Duration::from_secs(update_interval_secs),
            history_period: var("HISTORY_PERIOD", "1y")
                .parse::<HistoryPeriod>()
                .context("Invalid HISTORY_PERIOD")?,
            history_interval: var("HISTORY_INTERVAL", "1d")
                .parse::<BarInterval>()
                .context("Invalid HISTORY_INTERVAL")?,
            retrain_timeout,
            history_cap,
            evict_on_untrack: var("EVICT_ON_UNTRACK", "true")
                .parse()
                .context("Invalid EVICT_ON_UNTRACK")?,
            ..EngineConfig::default()
        };

        let config = Self {
            polygon_api_key: lookup("POLYGON_API_KEY").context("POLYGON_API_KEY not set")?,
            polygon_rate_limit: var("POLYGON_RATE_LIMIT", "500")
                .parse()
                .context("Invalid POLYGON_RATE_LIMIT")?,
            watchlist,
            techniques,
            horizon: var("FORECAST_HORIZON", "7")
                .parse()
                .context("Invalid FORECAST_HORIZON")?,
            engine,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            bail!("FORECAST_HORIZON must be at least 1");
        }
        if self.engine.update_interval.is_zero() {
            bail!("UPDATE_INTERVAL_SECS must be at least 1");
        }
        if self.techniques.is_empty() {
            bail!("FORECAST_MODELS selects no techniques");
        }
        if self.engine.history_cap == Some(0) {
            bail!("HISTORY_CAP must be positive when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<DaemonConfig> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        DaemonConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("POLYGON_API_KEY", "key")]).unwrap();
        assert_eq!(config.polygon_rate_limit, 500);
        assert_eq!(config.horizon, 7);
        assert_eq!(config.techniques, Technique::ALL.to_vec());
        assert_eq!(config.watchlist.len(), 5);
        assert_eq!(config.engine.update_interval, Duration::from_secs(5));
        assert_eq!(config.engine.history_period, HistoryPeriod::Year1);
        assert_eq!(config.engine.history_interval, BarInterval::Day1);
        assert!(config.engine.retrain_timeout.is_none());
        assert!(config.engine.evict_on_untrack);
    }

    #[test]
    fn test_missing_api_key() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("POLYGON_API_KEY"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("POLYGON_API_KEY", "key"),
            ("WATCHLIST", " spy, qqq ,,"),
            ("FORECAST_MODELS", "arima,ml"),
            ("FORECAST_HORIZON", "10"),
            ("HISTORY_PERIOD", "6mo"),
            ("HISTORY_INTERVAL", "1h"),
            ("RETRAIN_TIMEOUT_SECS", "30"),
            ("HISTORY_CAP", "500"),
            ("EVICT_ON_UNTRACK", "false"),
        ])
        .unwrap();

        assert_eq!(config.watchlist, vec!["SPY".to_string(), "QQQ".to_string()]);
        assert_eq!(config.techniques, vec![Technique::Autoregressive, Technique::Ensemble]);
        assert_eq!(config.horizon, 10);
        assert_eq!(config.engine.history_period, HistoryPeriod::Month6);
        assert_eq!(config.engine.history_interval, BarInterval::Hour1);
        assert_eq!(config.engine.retrain_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.engine.history_cap, Some(500));
        assert!(!config.engine.evict_on_untrack);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config_from(&[("POLYGON_API_KEY", "k"), ("FORECAST_MODELS", "lstm")]).is_err());
        assert!(config_from(&[("POLYGON_API_KEY", "k"), ("FORECAST_HORIZON", "0")]).is_err());
        assert!(config_from(&[("POLYGON_API_KEY", "k"), ("UPDATE_INTERVAL_SECS", "0")]).is_err());
        assert!(config_from(&[("POLYGON_API_KEY", "k"), ("HISTORY_PERIOD", "7y")]).is_err());
        assert!(config_from(&[("POLYGON_API_KEY", "k"), ("FORECAST_MODELS", " , ")]).is_err());
    }
}
