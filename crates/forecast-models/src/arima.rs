//! Integrated autoregressive model, ARIMA(p, d, 0).
//!
//! The closes are differenced `d` times and an AR(p) model is fitted to the
//! differenced series by conditional least squares (an intercept is only
//! estimated when `d == 0`). Multi-step forecasts are produced recursively on
//! the differenced scale and integrated back to prices.
//!
//! Interval variance at step `h` comes from the psi-weights of the
//! integrated AR polynomial: `var_h = sigma^2 * sum_{j<h} psi_j^2`.

use chrono::NaiveDate;
use forecast_core::{stats, BarSeries, ForecastError, ForecastPoint};
use tracing::debug;

use crate::config::ArimaConfig;
use crate::linalg::{dot, ols_solve};

#[derive(Debug, Clone)]
struct ArimaFit {
    /// AR coefficients phi_1..phi_p on the differenced scale.
    ar: Vec<f64>,
    intercept: f64,
    /// Innovation variance.
    sigma2: f64,
    /// Last value at each differencing level 0..d-1 (level 0 = closes).
    level_tails: Vec<f64>,
    /// Last `p` values of the d-times differenced series, oldest first.
    diff_tail: Vec<f64>,
    /// Sample standard deviation of the fitted closes.
    close_std: f64,
    n: usize,
}

#[derive(Debug, Clone)]
pub struct ArimaModel {
    config: ArimaConfig,
    fit: Option<ArimaFit>,
}

impl ArimaModel {
    pub fn new(config: ArimaConfig) -> Self {
        Self { config, fit: None }
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fit.as_ref().map(|f| f.ar.as_slice())
    }

    pub fn fit(&mut self, history: &BarSeries) -> Result<(), ForecastError> {
        self.fit = None;
        let closes = history.closes();
        let p = self.config.ar_order;
        let d = self.config.differencing;

        if closes.len() < self.config.min_history() {
            return Err(ForecastError::FitFailure(format!(
                "ARIMA({},{},0) needs at least {} closes, got {}",
                p,
                d,
                self.config.min_history(),
                closes.len()
            )));
        }

        let mut level_tails = Vec::with_capacity(d);
        let mut z = closes.clone();
        for _ in 0..d {
            level_tails.push(z[z.len() - 1]);
            z = difference(&z);
        }

        let with_intercept = d == 0;
        let offset = usize::from(with_intercept);
        let mut rows = Vec::with_capacity(z.len() - p);
        let mut targets = Vec::with_capacity(z.len() - p);
        for t in p..z.len() {
            let mut row = Vec::with_capacity(p + offset);
            if with_intercept {
                row.push(1.0);
            }
            row.extend((1..=p).map(|i| z[t - i]));
            rows.push(row);
            targets.push(z[t]);
        }

        let (intercept, ar) = if p == 0 && !with_intercept {
            (0.0, Vec::new())
        } else {
            let beta = ols_solve(&rows, &targets)?;
            if with_intercept {
                (beta[0], beta[1..].to_vec())
            } else {
                (0.0, beta)
            }
        };

        let residual_ss: f64 = rows
            .iter()
            .zip(&targets)
            .map(|(row, y)| {
                let fitted = if ar.is_empty() { intercept } else { intercept + dot(&ar, &row[offset..]) };
                (y - fitted).powi(2)
            })
            .sum();
        let dof = targets.len().saturating_sub(p + offset).max(1);
        let sigma2 = residual_ss / dof as f64;
        if !sigma2.is_finite() {
            return Err(ForecastError::FitFailure("ARIMA residual variance is not finite".to_string()));
        }

        debug!(order = ?(p, d, 0), sigma2, "Fitted ARIMA");

        self.fit = Some(ArimaFit {
            ar,
            intercept,
            sigma2,
            level_tails,
            diff_tail: z[z.len() - p..].to_vec(),
            close_std: stats::std_dev(&closes),
            n: closes.len(),
        });
        Ok(())
    }

    pub fn forecast(&self, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>, ForecastError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ForecastError::ModelNotInitialized("ARIMA has not been fitted".to_string()))?;
        let steps = dates.len();
        let p = fit.ar.len();

        // Recursive forecasts on the differenced scale.
        let mut window = fit.diff_tail.clone();
        let mut diff_forecasts = Vec::with_capacity(steps);
        for _ in 0..steps {
            let next = fit.intercept + (1..=p).map(|i| fit.ar[i - 1] * window[window.len() - i]).sum::<f64>();
            diff_forecasts.push(next);
            window.push(next);
        }

        // Integrate back through each differencing level.
        let mut forecasts = diff_forecasts;
        for last in fit.level_tails.iter().rev() {
            let mut acc = *last;
            forecasts = forecasts
                .into_iter()
                .map(|delta| {
                    acc += delta;
                    acc
                })
                .collect();
        }

        let z = stats::interval_z(self.config.interval_width);
        let psi = psi_weights(&fit.ar, self.config.differencing, steps);
        let approx_half = z * fit.close_std / (fit.n as f64).sqrt();

        let mut cumulative = 0.0;
        let mut points = Vec::with_capacity(steps);
        for (h, (date, mean)) in dates.iter().zip(forecasts).enumerate() {
            if !mean.is_finite() {
                return Err(ForecastError::FitFailure("ARIMA forecast diverged".to_string()));
            }
            cumulative += psi[h] * psi[h];
            let native_half = z * (fit.sigma2 * cumulative).sqrt();
            let half = if native_half.is_finite() { native_half } else { approx_half };
            points.push(ForecastPoint::symmetric(*date, mean, half));
        }
        Ok(points)
    }
}

fn difference(data: &[f64]) -> Vec<f64> {
    data.windows(2).map(|w| w[1] - w[0]).collect()
}

/// MA(infinity) weights of `phi(B) (1 - B)^d`, psi_0 = 1.
fn psi_weights(ar: &[f64], d: usize, count: usize) -> Vec<f64> {
    // Characteristic polynomial coefficients, index = lag.
    let mut poly: Vec<f64> = std::iter::once(1.0).chain(ar.iter().map(|a| -a)).collect();
    for _ in 0..d {
        let mut next = vec![0.0; poly.len() + 1];
        for (i, c) in poly.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c;
        }
        poly = next;
    }
    let level_ar: Vec<f64> = poly.iter().skip(1).map(|c| -c).collect();

    let mut psi = Vec::with_capacity(count);
    for j in 0..count {
        if j == 0 {
            psi.push(1.0);
            continue;
        }
        let value = (1..=j.min(level_ar.len())).map(|i| level_ar[i - 1] * psi[j - i]).sum::<f64>();
        psi.push(value);
    }
    psi
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_core::{Bar, MarketCalendar};

    fn series(closes: &[f64]) -> BarSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar {
                timestamp: (start + chrono::Duration::days(i as i64)).and_hms_opt(0, 0, 0).unwrap(),
                open: *c,
                high: c * 1.01,
                low: c * 0.99,
                close: *c,
                volume: 1_000,
            })
            .collect();
        BarSeries::new(bars).unwrap()
    }

    fn noisy_walk(n: usize) -> Vec<f64> {
        // Deterministic pseudo-noise so tests are reproducible.
        let mut price = 100.0;
        (0..n)
            .map(|i| {
                price += ((i * 7919) % 13) as f64 / 13.0 - 0.45;
                price
            })
            .collect()
    }

    #[test]
    fn test_psi_weights_random_walk() {
        // ARIMA(0,1,0): every psi weight is 1.
        let psi = psi_weights(&[], 1, 5);
        assert_eq!(psi, vec![1.0; 5]);
    }

    #[test]
    fn test_psi_weights_ar1_integrated() {
        // (1 - 0.5B)(1 - B) => x_t = 1.5 x_{t-1} - 0.5 x_{t-2}
        let psi = psi_weights(&[0.5], 1, 3);
        assert!((psi[1] - 1.5).abs() < 1e-12);
        assert!((psi[2] - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_difference_and_integrate() {
        assert_eq!(difference(&[1.0, 3.0, 6.0]), vec![2.0, 3.0]);
    }

    #[test]
    fn test_fit_requires_min_history() {
        let mut model = ArimaModel::new(ArimaConfig::default());
        let err = model.fit(&series(&noisy_walk(10))).unwrap_err();
        assert!(err.is_fit_failure());
        assert!(model.coefficients().is_none());
    }

    #[test]
    fn test_forecast_shape_and_widening_intervals() {
        let history = series(&noisy_walk(120));
        let mut model = ArimaModel::new(ArimaConfig::default());
        model.fit(&history).unwrap();
        assert_eq!(model.coefficients().unwrap().len(), 5);

        let dates = MarketCalendar::WeekdaysOnly.next_business_days(history.last_date(), 7);
        let points = model.forecast(&dates).unwrap();
        assert_eq!(points.len(), 7);
        for p in &points {
            assert!(p.lower_bound <= p.predicted_price && p.predicted_price <= p.upper_bound);
        }
        let width = |p: &ForecastPoint| p.upper_bound - p.lower_bound;
        assert!(width(&points[6]) >= width(&points[0]));
    }

    #[test]
    fn test_linear_trend_is_extrapolated() {
        let closes: Vec<f64> = (0..60).map(|i| 50.0 + i as f64 + if i % 2 == 0 { 0.2 } else { -0.2 }).collect();
        let history = series(&closes);
        let mut model = ArimaModel::new(ArimaConfig {
            differencing: 1,
            ar_order: 2,
            ..ArimaConfig::default()
        });
        model.fit(&history).unwrap();
        let dates = MarketCalendar::WeekdaysOnly.next_business_days(history.last_date(), 1);
        let points = model.forecast(&dates).unwrap();
        // Next close should land near the continuation of the trend.
        assert!((points[0].predicted_price - 110.2).abs() < 0.5, "got {}", points[0].predicted_price);
    }

    #[test]
    fn test_forecast_before_fit_is_rejected() {
        let model = ArimaModel::new(ArimaConfig::default());
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(matches!(model.forecast(&[date]), Err(ForecastError::ModelNotInitialized(_))));
    }
}
