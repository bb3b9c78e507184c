use chrono::NaiveDate;
use forecast_core::{
    Bar, BarSeries, Forecast, ForecastError, ForecastPoint, ForecastSource, MarketCalendar, OneStepForecast, Technique,
};
use tracing::{debug, warn};

use crate::arima::ArimaModel;
use crate::config::{FallbackConfig, ModelConfig};
use crate::decomposition::DecompositionModel;
use crate::ensemble::EnsembleModel;
use crate::fallback::fallback_points;

/// Technique-specific fitted state.
#[derive(Debug, Clone)]
enum Estimator {
    Autoregressive(ArimaModel),
    Decomposition(DecompositionModel),
    Ensemble(EnsembleModel),
}

impl Estimator {
    fn fit(&mut self, history: &BarSeries) -> Result<(), ForecastError> {
        match self {
            Estimator::Autoregressive(m) => m.fit(history),
            Estimator::Decomposition(m) => m.fit(history),
            Estimator::Ensemble(m) => m.fit(history),
        }
    }

    fn forecast(&self, history: &BarSeries, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>, ForecastError> {
        match self {
            Estimator::Autoregressive(m) => m.forecast(dates),
            Estimator::Decomposition(m) => m.forecast(dates),
            Estimator::Ensemble(m) => m.forecast(history, dates),
        }
    }
}

/// One live model for a (symbol, technique) pair.
///
/// Holds the working history and the fitted state. `train` replaces both;
/// `refresh` appends one bar and refits on the whole history. Callers must
/// serialise access (the registry keeps each model behind its own lock).
#[derive(Debug, Clone)]
pub struct ForecastModel {
    technique: Technique,
    estimator: Estimator,
    calendar: MarketCalendar,
    fallback: FallbackConfig,
    history: Option<BarSeries>,
    history_cap: Option<usize>,
    last_source: Option<ForecastSource>,
}

impl ForecastModel {
    pub fn new(technique: Technique, config: &ModelConfig) -> Self {
        let estimator = match technique {
            Technique::Autoregressive => Estimator::Autoregressive(ArimaModel::new(config.arima.clone())),
            Technique::Decomposition => Estimator::Decomposition(DecompositionModel::new(config.decomposition.clone())),
            Technique::Ensemble => Estimator::Ensemble(EnsembleModel::new(config.ensemble.clone())),
        };
        Self {
            technique,
            estimator,
            calendar: calendar_for(technique, config),
            fallback: config.fallback.clone(),
            history: None,
            history_cap: None,
            last_source: None,
        }
    }

    /// Keep at most `cap` most recent bars before every fit.
    pub fn with_history_cap(mut self, cap: Option<usize>) -> Self {
        self.history_cap = cap.filter(|c| *c > 0);
        self
    }

    pub fn technique(&self) -> Technique {
        self.technique
    }

    pub fn calendar(&self) -> MarketCalendar {
        self.calendar
    }

    pub fn is_initialized(&self) -> bool {
        self.history.is_some()
    }

    pub fn history(&self) -> Option<&BarSeries> {
        self.history.as_ref()
    }

    pub fn history_len(&self) -> usize {
        self.history.as_ref().map_or(0, |h| h.len())
    }

    /// Source of the most recent `train` result.
    pub fn last_source(&self) -> Option<&ForecastSource> {
        self.last_source.as_ref()
    }

    /// Fit on `series` and forecast the next `horizon` business days
    /// (at least one). Never fails: a fit error yields the moving-average
    /// fallback, marked as such in the returned `Forecast`.
    pub fn train(&mut self, series: BarSeries, horizon: usize) -> Forecast {
        let mut history = series;
        if let Some(cap) = self.history_cap {
            history.retain_last(cap);
        }
        let dates = self.calendar.next_business_days(history.last_date(), horizon.max(1));

        let forecast = match self.fit_and_forecast(&history, &dates) {
            Ok(points) => Forecast {
                technique: self.technique,
                points,
                source: ForecastSource::Model,
            },
            Err(e) => {
                warn!(technique = %self.technique, error = %e, "Model fit failed, using moving-average fallback");
                Forecast {
                    technique: self.technique,
                    points: fallback_points(&history, &dates, &self.fallback),
                    source: ForecastSource::Fallback { reason: e.to_string() },
                }
            }
        };

        self.history = Some(history);
        self.last_source = Some(forecast.source.clone());
        forecast
    }

    /// Append `bar`, refit on the full history and forecast one step ahead.
    ///
    /// The bar stays in the history even if the refit fails.
    pub fn refresh(&mut self, bar: Bar) -> Result<OneStepForecast, ForecastError> {
        let history = self.history.as_mut().ok_or_else(|| {
            ForecastError::ModelNotInitialized(format!("{} model has not been trained", self.technique))
        })?;
        history.push(bar)?;
        if let Some(cap) = self.history_cap {
            history.retain_last(cap);
        }

        let dates = self.calendar.next_business_days(history.last_date(), 1);
        self.estimator.fit(history)?;
        let points = self.estimator.forecast(history, &dates)?;
        let point = points
            .into_iter()
            .next()
            .filter(|p| p.is_finite())
            .ok_or_else(|| ForecastError::FitFailure("refresh produced no finite forecast".to_string()))?;

        debug!(technique = %self.technique, history = history.len(), next_price = point.predicted_price, "Refreshed model");
        Ok(OneStepForecast::from_point(point))
    }

    fn fit_and_forecast(&mut self, history: &BarSeries, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>, ForecastError> {
        self.estimator.fit(history)?;
        let points = self.estimator.forecast(history, dates)?;
        if points.len() != dates.len() || points.iter().any(|p| !p.is_finite()) {
            return Err(ForecastError::FitFailure(format!(
                "{} produced an incomplete or non-finite forecast",
                self.technique
            )));
        }
        Ok(points)
    }
}

/// Forecast calendar for a technique: only the decomposition variant skips
/// market holidays.
pub fn calendar_for(technique: Technique, config: &ModelConfig) -> MarketCalendar {
    match technique {
        Technique::Decomposition => config.decomposition.calendar,
        _ => MarketCalendar::WeekdaysOnly,
    }
}

/// Fallback forecast built without touching any model state, for callers
/// that gave up on a fit (e.g. after a timeout).
pub fn fallback_forecast(
    technique: Technique,
    series: &BarSeries,
    horizon: usize,
    config: &ModelConfig,
    reason: impl Into<String>,
) -> Forecast {
    let dates = calendar_for(technique, config).next_business_days(series.last_date(), horizon.max(1));
    Forecast {
        technique,
        points: fallback_points(series, &dates, &config.fallback),
        source: ForecastSource::Fallback { reason: reason.into() },
    }
}
