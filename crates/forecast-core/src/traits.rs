use async_trait::async_trait;
use crate::{Bar, BarInterval, BarSeries, ForecastError, HistoryPeriod};

/// Source of OHLCV bars for the forecasting core.
///
/// Implementations report bad symbols and transport failures as
/// `ForecastError::DataUnavailable`.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn get_history(
        &self,
        symbol: &str,
        period: HistoryPeriod,
        interval: BarInterval,
    ) -> Result<BarSeries, ForecastError>;

    /// Most recent 1-minute bar.
    async fn get_latest_bar(&self, symbol: &str) -> Result<Bar, ForecastError>;
}
