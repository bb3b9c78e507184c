use forecast_core::Bar;
use technical_analysis::{backfill, backfill_or, pct_change, rolling_std, rsi, sma};

pub const N_FEATURES: usize = 15;

pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "ma5",
    "ma10",
    "ma20",
    "price_change",
    "price_change_5",
    "volatility",
    "volume_change",
    "volume_ma5",
    "daily_range",
    "rsi",
];

/// One feature row per bar, in `FEATURE_NAMES` order.
///
/// Rolling statistics without enough history are back-filled from the first
/// defined value after them. A column that is never defined falls back to a
/// neutral value: the bar's own close (or volume) for moving averages, zero
/// for changes and dispersion, 50 for RSI.
pub fn feature_matrix(bars: &[Bar]) -> Vec<Vec<f64>> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

    let ma5 = fill_with(&sma(&closes, 5), |i| closes[i]);
    let ma10 = fill_with(&sma(&closes, 10), |i| closes[i]);
    let ma20 = fill_with(&sma(&closes, 20), |i| closes[i]);
    let price_change = backfill_or(&pct_change(&closes, 1), 0.0);
    let price_change_5 = backfill_or(&pct_change(&closes, 5), 0.0);
    let volatility = backfill_or(&rolling_std(&closes, 10), 0.0);
    let volume_change = backfill_or(&pct_change(&volumes, 1), 0.0);
    let volume_ma5 = fill_with(&sma(&volumes, 5), |i| volumes[i]);
    let rsi14 = backfill_or(&rsi(&closes, 14), 50.0);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            vec![
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                volumes[i],
                ma5[i],
                ma10[i],
                ma20[i],
                price_change[i],
                price_change_5[i],
                volatility[i],
                volume_change[i],
                volume_ma5[i],
                (bar.high - bar.low) / bar.open,
                rsi14[i],
            ]
        })
        .collect()
}

/// Back-fill, then fall back to a per-bar value.
fn fill_with(values: &[Option<f64>], neutral: impl Fn(usize) -> f64) -> Vec<f64> {
    backfill(values)
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.unwrap_or_else(|| neutral(i)))
        .collect()
}

/// Per-column standardisation with population standard deviation.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; width];
        let mut scales = vec![1.0; width];
        for j in 0..width {
            let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
            let var = rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n;
            means[j] = mean;
            let std = var.sqrt();
            // Constant columns keep unit scale.
            scales[j] = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        }
        Self { means, scales }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect()
    }
}
