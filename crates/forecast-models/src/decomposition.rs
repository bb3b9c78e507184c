//! Additive trend + seasonality decomposition.
//!
//! `y(t) = trend(t) + yearly(t) + weekly(t) + daily(t) + holidays(t)`, with a
//! piecewise-linear trend whose slope may change at evenly spaced
//! changepoints over the first part of the history, Fourier-series
//! seasonalities and one indicator per market holiday. Every component is
//! linear in its coefficients, so the whole model is fitted in one penalised
//! least-squares solve; each coefficient group is shrunk according to its
//! prior scale (the changepoint prior scale controls trend flexibility).
//!
//! Interval width combines the residual variance with the uncertainty of
//! future trend changes, which grows with the distance past the history.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use forecast_core::{stats, us_market_holiday, BarSeries, ForecastError, ForecastPoint, MarketCalendar, UsHoliday};
use tracing::debug;

use crate::config::DecompositionConfig;
use crate::linalg::{dot, ridge_solve};

const YEARLY_PERIOD_DAYS: f64 = 365.25;
const WEEKLY_PERIOD_DAYS: f64 = 7.0;
const DAILY_PERIOD_DAYS: f64 = 1.0;
const TREND_PRIOR_SCALE: f64 = 5.0;

const HOLIDAYS: [UsHoliday; 10] = [
    UsHoliday::NewYearsDay,
    UsHoliday::MartinLutherKingDay,
    UsHoliday::PresidentsDay,
    UsHoliday::GoodFriday,
    UsHoliday::MemorialDay,
    UsHoliday::Juneteenth,
    UsHoliday::IndependenceDay,
    UsHoliday::LaborDay,
    UsHoliday::Thanksgiving,
    UsHoliday::Christmas,
];

#[derive(Debug, Clone)]
struct DecompositionFit {
    t_start: f64,
    t_span: f64,
    y_scale: f64,
    /// Changepoint locations on the scaled time axis.
    changepoints: Vec<f64>,
    coefficients: Vec<f64>,
    /// Residual variance on the scaled target.
    sigma2: f64,
    mean_abs_delta: f64,
    /// Time of day of the last bar; forecast dates are evaluated at it.
    clock: NaiveTime,
    /// Daily seasonality is only fitted on sub-daily bars.
    daily: bool,
}

#[derive(Debug, Clone)]
pub struct DecompositionModel {
    config: DecompositionConfig,
    fit: Option<DecompositionFit>,
}

impl DecompositionModel {
    pub fn new(config: DecompositionConfig) -> Self {
        Self { config, fit: None }
    }

    pub fn calendar(&self) -> MarketCalendar {
        self.config.calendar
    }

    fn seasonalities(&self, daily: bool) -> Vec<(f64, usize)> {
        let mut out = Vec::new();
        if self.config.yearly_seasonality {
            out.push((YEARLY_PERIOD_DAYS, self.config.yearly_fourier_order));
        }
        if self.config.weekly_seasonality {
            out.push((WEEKLY_PERIOD_DAYS, self.config.weekly_fourier_order));
        }
        if daily {
            out.push((DAILY_PERIOD_DAYS, self.config.daily_fourier_order));
        }
        out
    }

    fn uses_holidays(&self) -> bool {
        self.config.calendar == MarketCalendar::UsMarket
    }

    /// Design row layout: offset, slope, changepoint deltas, Fourier pairs,
    /// holiday indicators.
    fn design_row(&self, t_abs: f64, date: NaiveDate, t_scaled: f64, changepoints: &[f64], daily: bool) -> Vec<f64> {
        let mut row = vec![1.0, t_scaled];
        row.extend(changepoints.iter().map(|cp| (t_scaled - cp).max(0.0)));
        for (period, order) in self.seasonalities(daily) {
            for k in 1..=order {
                let angle = 2.0 * std::f64::consts::PI * k as f64 * t_abs / period;
                row.push(angle.sin());
                row.push(angle.cos());
            }
        }
        if self.uses_holidays() {
            let holiday = us_market_holiday(date);
            row.extend(HOLIDAYS.iter().map(|h| if holiday == Some(*h) { 1.0 } else { 0.0 }));
        }
        row
    }

    fn penalties(&self, n_changepoints: usize, noise_var: f64, daily: bool) -> Vec<f64> {
        let mut penalties = vec![noise_var / TREND_PRIOR_SCALE.powi(2); 2];
        penalties.extend(std::iter::repeat(noise_var / self.config.changepoint_prior_scale.powi(2)).take(n_changepoints));
        let n_fourier: usize = self.seasonalities(daily).iter().map(|(_, order)| 2 * order).sum();
        penalties.extend(std::iter::repeat(noise_var / self.config.seasonality_prior_scale.powi(2)).take(n_fourier));
        if self.uses_holidays() {
            penalties.extend(std::iter::repeat(noise_var / self.config.holidays_prior_scale.powi(2)).take(HOLIDAYS.len()));
        }
        penalties
    }

    pub fn fit(&mut self, history: &BarSeries) -> Result<(), ForecastError> {
        self.fit = None;
        let bars = history.bars();
        let n = bars.len();
        if n < 2 {
            return Err(ForecastError::FitFailure(format!(
                "decomposition needs at least 2 observations, got {}",
                n
            )));
        }
        if self.config.changepoint_prior_scale <= 0.0 {
            return Err(ForecastError::FitFailure("changepoint prior scale must be positive".to_string()));
        }

        let t_abs: Vec<f64> = bars.iter().map(|b| days_since_epoch(b.timestamp)).collect();
        let t_start = t_abs[0];
        let t_span = t_abs[n - 1] - t_start;
        if t_span <= 0.0 {
            return Err(ForecastError::FitFailure("history spans no time".to_string()));
        }
        let t_scaled: Vec<f64> = t_abs.iter().map(|t| (t - t_start) / t_span).collect();
        // On bars a day or more apart the daily terms only see one phase
        // and would absorb the level.
        let daily = self.config.daily_seasonality && t_abs.windows(2).any(|w| w[1] - w[0] < DAILY_PERIOD_DAYS);
        let clock = bars[n - 1].timestamp.time();

        let y_scale = bars.iter().map(|b| b.close.abs()).fold(0.0, f64::max);
        let y: Vec<f64> = bars.iter().map(|b| b.close / y_scale).collect();

        let changepoints = self.changepoint_locations(&t_scaled);
        let rows: Vec<Vec<f64>> = bars
            .iter()
            .enumerate()
            .map(|(i, b)| self.design_row(t_abs[i], b.date(), t_scaled[i], &changepoints, daily))
            .collect();

        // First pass with the total variance as the noise level, second
        // pass with the residual variance from the first.
        let total_var = stats::population_std_dev(&y).powi(2).max(1e-6);
        let first = ridge_solve(&rows, &y, &self.penalties(changepoints.len(), total_var, daily))?;
        let first_resid = residual_variance(&rows, &y, &first);
        let noise_var = first_resid.max(1e-6);
        let coefficients = ridge_solve(&rows, &y, &self.penalties(changepoints.len(), noise_var, daily))?;
        let sigma2 = residual_variance(&rows, &y, &coefficients);

        let deltas = &coefficients[2..2 + changepoints.len()];
        let mean_abs_delta = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64
        };

        debug!(
            observations = n,
            changepoints = changepoints.len(),
            daily,
            sigma2,
            "Fitted decomposition"
        );

        self.fit = Some(DecompositionFit {
            t_start,
            t_span,
            y_scale,
            changepoints,
            coefficients,
            sigma2,
            mean_abs_delta,
            clock,
            daily,
        });
        Ok(())
    }

    /// Evenly spaced over the first `changepoint_range` of observations,
    /// excluding the first.
    fn changepoint_locations(&self, t_scaled: &[f64]) -> Vec<f64> {
        let n = t_scaled.len();
        let hist = ((n as f64) * self.config.changepoint_range.clamp(0.0, 1.0)).floor() as usize;
        let count = self.config.n_changepoints.min(hist.saturating_sub(1));
        if count == 0 {
            return Vec::new();
        }
        (1..=count)
            .map(|i| {
                let idx = ((i * (hist - 1)) as f64 / count as f64).round() as usize;
                t_scaled[idx.min(n - 1)]
            })
            .collect()
    }

    pub fn forecast(&self, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>, ForecastError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ForecastError::ModelNotInitialized("decomposition has not been fitted".to_string()))?;
        let z = stats::interval_z(self.config.interval_width);

        dates
            .iter()
            .map(|date| {
                let t_abs = days_since_epoch(date.and_time(fit.clock));
                let t_scaled = (t_abs - fit.t_start) / fit.t_span;
                let row = self.design_row(t_abs, *date, t_scaled, &fit.changepoints, fit.daily);
                let yhat = dot(&row, &fit.coefficients) * fit.y_scale;

                let ahead = (t_scaled - 1.0).max(0.0);
                let trend_var = fit.changepoints.len() as f64 * 2.0 * fit.mean_abs_delta.powi(2) * ahead.powi(3) / 3.0;
                let half = z * (fit.sigma2 + trend_var).sqrt() * fit.y_scale;

                if !yhat.is_finite() || !half.is_finite() {
                    return Err(ForecastError::FitFailure("decomposition forecast is not finite".to_string()));
                }
                Ok(ForecastPoint::symmetric(*date, yhat, half))
            })
            .collect()
    }
}

fn days_since_epoch(ts: NaiveDateTime) -> f64 {
    ts.and_utc().timestamp() as f64 / 86_400.0
}

fn residual_variance(rows: &[Vec<f64>], y: &[f64], coefficients: &[f64]) -> f64 {
    let ss: f64 = rows
        .iter()
        .zip(y)
        .map(|(row, target)| (target - dot(row, coefficients)).powi(2))
        .sum();
    ss / rows.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_core::Bar;

    fn daily_series(start: NaiveDate, closes: &[f64]) -> BarSeries {
        daily_series_at(start, NaiveTime::MIN, closes)
    }

    fn daily_series_at(start: NaiveDate, clock: NaiveTime, closes: &[f64]) -> BarSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar {
                timestamp: (start + chrono::Duration::days(i as i64)).and_time(clock),
                open: *c,
                high: c * 1.01,
                low: c * 0.99,
                close: *c,
                volume: 5_000,
            })
            .collect();
        BarSeries::new(bars).unwrap()
    }

    #[test]
    fn test_requires_two_observations() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut model = DecompositionModel::new(DecompositionConfig::default());
        assert!(model.fit(&daily_series(start, &[100.0])).unwrap_err().is_fit_failure());
        assert!(model.fit(&daily_series(start, &[100.0, 101.0])).is_ok());
    }

    #[test]
    fn test_changepoints_in_leading_share_of_history() {
        let model = DecompositionModel::new(DecompositionConfig::default());
        let t: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let cps = model.changepoint_locations(&t);
        assert_eq!(cps.len(), 25);
        assert!(cps.iter().all(|c| *c > 0.0 && *c <= 0.8));
        assert!(cps.windows(2).all(|w| w[0] < w[1]));

        let short: Vec<f64> = (0..3).map(|i| i as f64 / 2.0).collect();
        assert!(model.changepoint_locations(&short).len() <= 1);
    }

    #[test]
    fn test_linear_trend_is_followed() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let closes: Vec<f64> = (0..200).map(|i| 100.0 + 0.5 * i as f64).collect();
        let history = daily_series(start, &closes);
        let mut model = DecompositionModel::new(DecompositionConfig::default());
        model.fit(&history).unwrap();

        let dates = model.calendar().next_business_days(history.last_date(), 5);
        let points = model.forecast(&dates).unwrap();
        let last = *closes.last().unwrap();
        assert!(points[0].predicted_price > last - 5.0 && points[0].predicted_price < last + 10.0);
        assert!(points[4].predicted_price > points[0].predicted_price);
    }

    #[test]
    fn test_interval_widens_with_horizon() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let closes: Vec<f64> = (0..150)
            .map(|i| 50.0 + (i as f64 / 9.0).sin() * 3.0 + if i > 70 { (i - 70) as f64 * 0.2 } else { 0.0 })
            .collect();
        let history = daily_series(start, &closes);
        let mut model = DecompositionModel::new(DecompositionConfig::default());
        model.fit(&history).unwrap();

        let dates = model.calendar().next_business_days(history.last_date(), 20);
        let points = model.forecast(&dates).unwrap();
        let width = |p: &ForecastPoint| p.upper_bound - p.lower_bound;
        assert!(points.iter().all(|p| p.lower_bound <= p.predicted_price && p.predicted_price <= p.upper_bound));
        assert!(width(&points[19]) >= width(&points[0]));
    }

    #[test]
    fn test_holiday_columns_follow_calendar() {
        let mut config = DecompositionConfig::default();
        let with = DecompositionModel::new(config.clone());
        config.calendar = MarketCalendar::WeekdaysOnly;
        let without = DecompositionModel::new(config);
        assert_eq!(with.penalties(0, 1.0, false).len(), without.penalties(0, 1.0, false).len() + HOLIDAYS.len());

        let christmas = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        let row = with.design_row(0.0, christmas, 0.0, &[], false);
        assert_eq!(row.iter().rev().take(HOLIDAYS.len()).sum::<f64>(), 1.0);
    }

    #[test]
    fn test_bar_clock_does_not_move_level() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + 0.1 * i as f64).collect();

        let mut next = Vec::new();
        for hour in [0, 5, 12, 21] {
            let clock = NaiveTime::from_hms_opt(hour, 0, 0).unwrap();
            let history = daily_series_at(start, clock, &closes);
            let mut model = DecompositionModel::new(DecompositionConfig::default());
            model.fit(&history).unwrap();
            assert!(!model.fit.as_ref().unwrap().daily);

            let dates = model.calendar().next_business_days(history.last_date(), 1);
            let expected = 100.0 + 0.1 * (dates[0] - start).num_days() as f64;
            let predicted = model.forecast(&dates).unwrap()[0].predicted_price;
            assert!((predicted - expected).abs() < 1.0, "hour {}: {} vs {}", hour, predicted, expected);
            next.push(predicted);
        }
        assert!(next.iter().all(|p| (p - next[0]).abs() < 0.05));
    }

    #[test]
    fn test_daily_terms_only_on_intraday_bars() {
        let start = NaiveDateTime::new(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        let bars: Vec<Bar> = (0..120)
            .map(|i| {
                let close = 50.0 + (i % 7) as f64 * 0.3 + i as f64 * 0.01;
                Bar {
                    timestamp: start + chrono::Duration::hours(i),
                    open: close,
                    high: close + 0.1,
                    low: close - 0.1,
                    close,
                    volume: 1_000,
                }
            })
            .collect();
        let history = BarSeries::new(bars).unwrap();
        let config = DecompositionConfig {
            yearly_seasonality: false,
            ..DecompositionConfig::default()
        };
        let mut model = DecompositionModel::new(config);
        model.fit(&history).unwrap();
        let fit = model.fit.as_ref().unwrap();
        assert!(fit.daily);
        assert_eq!(fit.clock, history.bars()[119].timestamp.time());

        let dates = model.calendar().next_business_days(history.last_date(), 2);
        let points = model.forecast(&dates).unwrap();
        assert!(points.iter().all(|p| p.predicted_price > 40.0 && p.predicted_price < 60.0));

        // Same closes a day apart leave the daily terms out.
        let closes: Vec<f64> = history.bars().iter().map(|b| b.close).collect();
        model.fit(&daily_series(start.date(), &closes)).unwrap();
        assert!(!model.fit.as_ref().unwrap().daily);
    }
}
