use chrono::NaiveDate;
use forecast_core::{stats, BarSeries, ForecastPoint};
use rand::Rng;

use crate::config::FallbackConfig;

/// Moving-average forecast used when a model cannot be fitted.
///
/// `base` is the mean of the last `window` closes; every point is `base`
/// plus uniform jitter of +/- `jitter * base`, bracketed by
/// `1.96 * sigma / sqrt(n)` over the full close history (population sigma).
pub fn fallback_points(history: &BarSeries, dates: &[NaiveDate], config: &FallbackConfig) -> Vec<ForecastPoint> {
    fallback_points_with_rng(history, dates, config, &mut rand::thread_rng())
}

pub fn fallback_points_with_rng<R: Rng>(
    history: &BarSeries,
    dates: &[NaiveDate],
    config: &FallbackConfig,
    rng: &mut R,
) -> Vec<ForecastPoint> {
    let closes = history.closes();
    let base = stats::tail_mean(&closes, config.window.max(1));
    let half = stats::standard_error_band(&closes);

    dates
        .iter()
        .map(|date| {
            let jitter = (rng.gen::<f64>() - 0.5) * 2.0 * config.jitter * base;
            ForecastPoint::symmetric(*date, base + jitter, half)
        })
        .collect()
}
