//! Bagged regression-tree ensemble over technical-indicator features.
//!
//! Each bar's feature row is paired with the next bar's close as target.
//! Multi-step forecasts are recursive: after predicting day `k`, a synthetic
//! bar is appended (open = close = prediction, high/low = prediction +/- 1%,
//! volume = mean historical volume) and day `k + 1` is predicted from the
//! features of that synthetic bar. Errors therefore compound over the
//! horizon; bounds are the tree-dispersion band `mean +/- 1.96 * std`.

pub mod features;
pub mod forest;
pub mod tree;

use chrono::{NaiveDate, NaiveTime};
use forecast_core::{stats, Bar, BarSeries, ForecastError, ForecastPoint};
use tracing::debug;

use crate::config::EnsembleConfig;
use features::{feature_matrix, StandardScaler};
use forest::RandomForest;

/// Fewest bars that yield two training rows.
pub const MIN_HISTORY: usize = 3;

#[derive(Debug, Clone)]
struct EnsembleFit {
    scaler: StandardScaler,
    forest: RandomForest,
    mean_volume: f64,
}

#[derive(Debug, Clone)]
pub struct EnsembleModel {
    config: EnsembleConfig,
    fit: Option<EnsembleFit>,
}

impl EnsembleModel {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config, fit: None }
    }

    pub fn fit(&mut self, history: &BarSeries) -> Result<(), ForecastError> {
        self.fit = None;
        let bars = history.bars();
        if bars.len() < MIN_HISTORY {
            return Err(ForecastError::FitFailure(format!(
                "ensemble needs at least {} bars, got {}",
                MIN_HISTORY,
                bars.len()
            )));
        }

        let matrix = feature_matrix(bars);
        let train_rows = &matrix[..matrix.len() - 1];
        let targets: Vec<f64> = bars[1..].iter().map(|b| b.close).collect();

        let scaler = StandardScaler::fit(train_rows);
        let scaled: Vec<Vec<f64>> = train_rows.iter().map(|r| scaler.transform(r)).collect();
        let forest = RandomForest::fit(&scaled, &targets, &self.config)?;

        debug!(rows = scaled.len(), trees = forest.len(), "Fitted ensemble");

        self.fit = Some(EnsembleFit {
            scaler,
            forest,
            mean_volume: stats::mean(&history.volumes()),
        });
        Ok(())
    }

    pub fn forecast(&self, history: &BarSeries, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>, ForecastError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ForecastError::ModelNotInitialized("ensemble has not been fitted".to_string()))?;

        let mut extended: Vec<Bar> = history.bars().to_vec();
        let synthetic_volume = fit.mean_volume.max(0.0).round() as u64;
        let mut points = Vec::with_capacity(dates.len());

        for date in dates {
            let matrix = feature_matrix(&extended);
            let row = match matrix.last() {
                Some(row) => fit.scaler.transform(row),
                None => return Err(ForecastError::InvalidData("no bars to predict from".to_string())),
            };
            let (prediction, spread) = fit.forest.predict(&row);
            if !prediction.is_finite() || !spread.is_finite() {
                return Err(ForecastError::FitFailure("ensemble prediction is not finite".to_string()));
            }

            let half = stats::Z_95 * spread;
            points.push(ForecastPoint::new(*date, prediction, prediction - half, prediction + half));

            extended.push(Bar {
                timestamp: date.and_time(NaiveTime::MIN),
                open: prediction,
                high: prediction * 1.01,
                low: prediction * 0.99,
                close: prediction,
                volume: synthetic_volume,
            });
        }
        Ok(points)
    }
}
