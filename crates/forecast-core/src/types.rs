use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ForecastError;

/// OHLCV bar data (timezone-naive timestamp)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Close minus open for this period.
    pub fn change(&self) -> f64 {
        self.close - self.open
    }

    fn validate(&self) -> Result<(), ForecastError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(ForecastError::InvalidData(format!(
                "bar at {} has a non-positive or non-finite price",
                self.timestamp
            )));
        }
        Ok(())
    }
}

/// Ordered run of bars: non-empty, strictly increasing timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Bar>", into = "Vec<Bar>")]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self, ForecastError> {
        if bars.is_empty() {
            return Err(ForecastError::InvalidData("bar series is empty".to_string()));
        }
        for bar in &bars {
            bar.validate()?;
        }
        if let Some(w) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(ForecastError::InvalidData(format!(
                "bar timestamps must be strictly increasing ({} followed by {})",
                w[0].timestamp, w[1].timestamp
            )));
        }
        Ok(Self { bars })
    }

    /// Sorts by timestamp and keeps the last bar for any repeated timestamp.
    /// Provider responses are not guaranteed to be ordered.
    pub fn from_unsorted(mut bars: Vec<Bar>) -> Result<Self, ForecastError> {
        bars.sort_by_key(|b| b.timestamp);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self::new(deduped)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false for a constructed series; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> &Bar {
        // Construction guarantees at least one bar.
        &self.bars[self.bars.len() - 1]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.last().date()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume as f64).collect()
    }

    /// Append a bar strictly after the current last timestamp.
    pub fn push(&mut self, bar: Bar) -> Result<(), ForecastError> {
        bar.validate()?;
        if bar.timestamp <= self.last().timestamp {
            return Err(ForecastError::InvalidData(format!(
                "bar at {} is not after the last stored bar at {}",
                bar.timestamp,
                self.last().timestamp
            )));
        }
        self.bars.push(bar);
        Ok(())
    }

    /// Drop the oldest bars so at most `cap` remain (cap of 0 is ignored).
    pub fn retain_last(&mut self, cap: usize) {
        if cap > 0 && self.bars.len() > cap {
            let excess = self.bars.len() - cap;
            self.bars.drain(..excess);
        }
    }
}

impl TryFrom<Vec<Bar>> for BarSeries {
    type Error = ForecastError;

    fn try_from(bars: Vec<Bar>) -> Result<Self, Self::Error> {
        Self::new(bars)
    }
}

impl From<BarSeries> for Vec<Bar> {
    fn from(series: BarSeries) -> Self {
        series.bars
    }
}

/// Forecasting technique selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technique {
    #[serde(alias = "arima")]
    Autoregressive,
    #[serde(alias = "prophet")]
    Decomposition,
    #[serde(alias = "ml")]
    Ensemble,
}

impl Technique {
    pub const ALL: [Technique; 3] = [
        Technique::Autoregressive,
        Technique::Decomposition,
        Technique::Ensemble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Technique::Autoregressive => "autoregressive",
            Technique::Decomposition => "decomposition",
            Technique::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Technique {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "autoregressive" | "arima" => Ok(Technique::Autoregressive),
            "decomposition" | "prophet" => Ok(Technique::Decomposition),
            "ensemble" | "ml" => Ok(Technique::Ensemble),
            other => Err(ForecastError::InvalidData(format!("unknown technique '{}'", other))),
        }
    }
}

/// One forecast day: `lower_bound <= predicted_price <= upper_bound`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_price: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl ForecastPoint {
    /// Builds a point from explicit bounds, widening them to contain the
    /// prediction if a model's interval came back lopsided.
    pub fn new(date: NaiveDate, predicted_price: f64, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            date,
            predicted_price,
            lower_bound: lower_bound.min(predicted_price),
            upper_bound: upper_bound.max(predicted_price),
        }
    }

    pub fn symmetric(date: NaiveDate, predicted_price: f64, half_width: f64) -> Self {
        let half = half_width.abs();
        Self::new(date, predicted_price, predicted_price - half, predicted_price + half)
    }

    pub fn is_finite(&self) -> bool {
        self.predicted_price.is_finite() && self.lower_bound.is_finite() && self.upper_bound.is_finite()
    }
}

/// Where a forecast's numbers came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForecastSource {
    Model,
    Fallback { reason: String },
}

/// Multi-day forecast over consecutive business days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub technique: Technique,
    pub points: Vec<ForecastPoint>,
    pub source: ForecastSource,
}

impl Forecast {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ForecastSource::Fallback { .. })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }
}

/// Single-step-ahead forecast produced by a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneStepForecast {
    pub next_price: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Business day the prediction targets.
    pub target_date: NaiveDate,
    pub as_of: DateTime<Utc>,
}

impl OneStepForecast {
    pub fn from_point(point: ForecastPoint) -> Self {
        Self {
            next_price: point.predicted_price,
            lower_bound: point.lower_bound,
            upper_bound: point.upper_bound,
            target_date: point.date,
            as_of: Utc::now(),
        }
    }
}

/// Live update event, one per tracked symbol per scheduler cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub change: f64,
    pub predictions: BTreeMap<Technique, OneStepForecast>,
}

/// Lookback window for a history request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryPeriod {
    Day1,
    Day5,
    Month1,
    Month3,
    Month6,
    Year1,
    Year2,
    Year5,
}

impl HistoryPeriod {
    pub fn to_days(&self) -> i64 {
        match self {
            HistoryPeriod::Day1 => 1,
            HistoryPeriod::Day5 => 5,
            HistoryPeriod::Month1 => 30,
            HistoryPeriod::Month3 => 91,
            HistoryPeriod::Month6 => 182,
            HistoryPeriod::Year1 => 365,
            HistoryPeriod::Year2 => 730,
            HistoryPeriod::Year5 => 1826,
        }
    }
}

impl FromStr for HistoryPeriod {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1d" => Ok(HistoryPeriod::Day1),
            "5d" => Ok(HistoryPeriod::Day5),
            "1mo" => Ok(HistoryPeriod::Month1),
            "3mo" => Ok(HistoryPeriod::Month3),
            "6mo" => Ok(HistoryPeriod::Month6),
            "1y" => Ok(HistoryPeriod::Year1),
            "2y" => Ok(HistoryPeriod::Year2),
            "5y" => Ok(HistoryPeriod::Year5),
            other => Err(ForecastError::InvalidData(format!("unknown history period '{}'", other))),
        }
    }
}

/// Bar resolution for a history request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarInterval {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Day1,
}

impl BarInterval {
    pub fn to_minutes(&self) -> i64 {
        match self {
            BarInterval::Minute1 => 1,
            BarInterval::Minute5 => 5,
            BarInterval::Minute15 => 15,
            BarInterval::Minute30 => 30,
            BarInterval::Hour1 => 60,
            BarInterval::Day1 => 1440,
        }
    }
}

impl FromStr for BarInterval {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(BarInterval::Minute1),
            "5m" => Ok(BarInterval::Minute5),
            "15m" => Ok(BarInterval::Minute15),
            "30m" => Ok(BarInterval::Minute30),
            "1h" => Ok(BarInterval::Hour1),
            "1d" => Ok(BarInterval::Day1),
            other => Err(ForecastError::InvalidData(format!("unknown bar interval '{}'", other))),
        }
    }
}
