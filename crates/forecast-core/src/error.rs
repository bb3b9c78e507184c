use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Upstream fetch failed: unknown symbol, network error, empty response.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Numerical fitting raised: insufficient data, singular system, non-finite output.
    #[error("Fit failure: {0}")]
    FitFailure(String),

    #[error("Model not initialized: {0}")]
    ModelNotInitialized(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl ForecastError {
    /// Errors the fallback path is allowed to absorb during `train`.
    pub fn is_fit_failure(&self) -> bool {
        matches!(self, ForecastError::FitFailure(_) | ForecastError::Timeout(_))
    }
}
