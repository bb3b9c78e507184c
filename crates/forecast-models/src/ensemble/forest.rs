use forecast_core::{stats, ForecastError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::tree::{RegressionTree, TreeParams};
use crate::config::EnsembleConfig;

/// Bagged regression trees. Tree `i` is grown on a bootstrap sample drawn
/// from `StdRng::seed_from_u64(seed + i)`, so a fit is reproducible for a
/// given seed and training set.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &EnsembleConfig) -> Result<Self, ForecastError> {
        if config.n_trees == 0 {
            return Err(ForecastError::FitFailure("ensemble needs at least one tree".to_string()));
        }
        if x.is_empty() || x.len() != y.len() {
            return Err(ForecastError::FitFailure(format!(
                "ensemble training set has {} rows and {} targets",
                x.len(),
                y.len()
            )));
        }
        if y.iter().any(|v| !v.is_finite()) || x.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ForecastError::FitFailure("ensemble training set contains non-finite values".to_string()));
        }

        let n = x.len();
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
        };

        // Train trees in parallel using rayon
        let trees: Vec<RegressionTree> = (0..config.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
                // Bootstrap: sample N rows WITH REPLACEMENT
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, sample, params)
            })
            .collect();

        Ok(Self { trees })
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn tree_predictions(&self, row: &[f64]) -> Vec<f64> {
        self.trees.iter().map(|t| t.predict(row)).collect()
    }

    /// Mean and population standard deviation across trees.
    pub fn predict(&self, row: &[f64]) -> (f64, f64) {
        let preds = self.tree_predictions(row);
        (stats::mean(&preds), stats::population_std_dev(&preds))
    }
}
