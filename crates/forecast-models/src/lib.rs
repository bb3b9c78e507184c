pub mod arima;
pub mod config;
pub mod decomposition;
pub mod ensemble;
pub mod fallback;
mod linalg;
pub mod model;

#[cfg(test)]
mod model_tests;

pub use config::*;
pub use model::*;
