//! Rolling-window indicators aligned with their input.
//!
//! Every function returns one entry per input element; positions without
//! enough history (or with an undefined value, e.g. a division by zero) are
//! `None`. Use [`backfill`] to propagate later valid values backward.

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    let mut sum: f64 = data[..period].iter().sum();
    result[period - 1] = Some(sum / period as f64);
    for i in period..data.len() {
        sum += data[i] - data[i - period];
        result[i] = Some(sum / period as f64);
    }
    result
}

/// Rolling sample standard deviation (n - 1 denominator).
pub fn rolling_std(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period < 2 || data.len() < period {
        return result;
    }

    for i in period - 1..data.len() {
        let window = &data[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
        result[i] = Some(variance.sqrt());
    }
    result
}

/// Fractional change over `periods` steps: `x[i] / x[i - periods] - 1`.
pub fn pct_change(data: &[f64], periods: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if periods == 0 {
        return result;
    }

    for i in periods..data.len() {
        let prev = data[i - periods];
        if prev != 0.0 {
            let change = data[i] / prev - 1.0;
            if change.is_finite() {
                result[i] = Some(change);
            }
        }
    }
    result
}

/// Relative Strength Index over simple (not Wilder-smoothed) rolling means
/// of gains and losses: `100 - 100 / (1 + avg_gain / avg_loss)`.
///
/// A window with gains and no losses reads 100; a flat window is undefined.
pub fn rsi(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period + 1 {
        return result;
    }

    let mut gains = vec![0.0; data.len()];
    let mut losses = vec![0.0; data.len()];
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains[i] = change;
        } else {
            losses[i] = -change;
        }
    }

    for i in period..data.len() {
        let avg_gain = gains[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[i + 1 - period..=i].iter().sum::<f64>() / period as f64;

        result[i] = if avg_loss == 0.0 {
            if avg_gain > 0.0 { Some(100.0) } else { None }
        } else {
            Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
        };
    }
    result
}

/// Fill every undefined entry with the next defined value after it.
/// Trailing undefined entries stay `None`.
pub fn backfill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut result = values.to_vec();
    let mut next: Option<f64> = None;
    for slot in result.iter_mut().rev() {
        match slot {
            Some(v) => next = Some(*v),
            None => *slot = next,
        }
    }
    result
}

/// Back-fill, then replace anything still undefined with `fill`.
pub fn backfill_or(values: &[Option<f64>], fill: f64) -> Vec<f64> {
    backfill(values).into_iter().map(|v| v.unwrap_or(fill)).collect()
}
