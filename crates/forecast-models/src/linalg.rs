use forecast_core::ForecastError;
use nalgebra::{DMatrix, DVector};

/// Penalised least squares: minimises `|y - X b|^2 + sum(penalty_j * b_j^2)`.
///
/// `rows` is the design matrix in row-major form; every row must have
/// `penalties.len()` columns. Solves the normal equations by Cholesky and
/// falls back to SVD for rank-deficient systems.
pub fn ridge_solve(rows: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Result<Vec<f64>, ForecastError> {
    let n = rows.len();
    let k = penalties.len();
    if n == 0 || k == 0 {
        return Err(ForecastError::FitFailure("empty design matrix".to_string()));
    }
    if y.len() != n || rows.iter().any(|r| r.len() != k) {
        return Err(ForecastError::FitFailure(format!(
            "design matrix shape mismatch ({} rows, {} targets, {} columns)",
            n,
            y.len(),
            k
        )));
    }

    let x = DMatrix::from_fn(n, k, |i, j| rows[i][j]);
    let target = DVector::from_column_slice(y);
    let xt = x.transpose();
    let mut xtx = &xt * &x;
    for (j, penalty) in penalties.iter().enumerate() {
        xtx[(j, j)] += penalty.max(0.0);
    }
    let xty = &xt * &target;

    let solution = match xtx.clone().cholesky() {
        Some(chol) => chol.solve(&xty),
        None => xtx
            .svd(true, true)
            .solve(&xty, 1e-12)
            .map_err(|e| ForecastError::FitFailure(format!("least squares solve failed: {}", e)))?,
    };

    if solution.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::FitFailure("least squares produced non-finite coefficients".to_string()));
    }
    Ok(solution.iter().copied().collect())
}

/// Plain ordinary least squares.
pub fn ols_solve(rows: &[Vec<f64>], y: &[f64]) -> Result<Vec<f64>, ForecastError> {
    let k = rows.first().map(|r| r.len()).unwrap_or(0);
    ridge_solve(rows, y, &vec![0.0; k])
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
