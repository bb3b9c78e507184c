use dashmap::DashMap;
use forecast_core::{Bar, BarSeries, Forecast, ForecastError, ForecastSource, OneStepForecast, Technique};
use forecast_models::{ForecastModel, ModelConfig};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::tracking::TrackingSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryKey {
    pub symbol: String,
    pub technique: Technique,
}

impl RegistryKey {
    pub fn new(symbol: &str, technique: Technique) -> Self {
        Self {
            symbol: symbol.to_string(),
            technique,
        }
    }
}

/// A model behind its own lock; `train` and `refresh` on one model are
/// serialised, different models proceed independently.
pub type SharedModel = Arc<Mutex<ForecastModel>>;

/// Live models keyed by (symbol, technique).
///
/// The map shards guard insertion; each model has its own mutex. Model
/// handles are cloned out of the map before locking so no shard lock is
/// held during a fit.
///
/// Tracking changes made by `forecast` and `untrack` go through one
/// membership lock, so an unsubscribe that lands while a model is training
/// is not undone when the training finishes.
pub struct ModelRegistry {
    models: DashMap<RegistryKey, SharedModel>,
    model_config: ModelConfig,
    history_cap: Option<usize>,
    tracking: Arc<TrackingSet>,
    membership: Mutex<()>,
    /// Unsubscribe count per symbol.
    untracks: DashMap<String, u64>,
}

impl ModelRegistry {
    pub fn new(model_config: ModelConfig, history_cap: Option<usize>, tracking: Arc<TrackingSet>) -> Self {
        Self {
            models: DashMap::new(),
            model_config,
            history_cap,
            tracking,
            membership: Mutex::new(()),
            untracks: DashMap::new(),
        }
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn tracking(&self) -> &Arc<TrackingSet> {
        &self.tracking
    }

    /// Existing model for the key, or a fresh untrained one.
    pub fn get_or_create(&self, symbol: &str, technique: Technique) -> SharedModel {
        self.models
            .entry(RegistryKey::new(symbol, technique))
            .or_insert_with(|| {
                debug!(symbol, technique = %technique, "Creating model");
                Arc::new(Mutex::new(
                    ForecastModel::new(technique, &self.model_config).with_history_cap(self.history_cap),
                ))
            })
            .clone()
    }

    pub fn get(&self, symbol: &str, technique: Technique) -> Option<SharedModel> {
        self.models.get(&RegistryKey::new(symbol, technique)).map(|m| m.value().clone())
    }

    /// Train the (symbol, technique) model on `history` and track `symbol`,
    /// unless `symbol` was untracked while the model was training.
    /// Blocking; run it off the async runtime.
    pub fn forecast(&self, symbol: &str, technique: Technique, history: BarSeries, horizon: usize) -> Forecast {
        let (epoch, model) = {
            let _membership = self.lock_membership();
            (self.untrack_count(symbol), self.get_or_create(symbol, technique))
        };
        let forecast = lock_model(&model).train(history, horizon);

        let _membership = self.lock_membership();
        if self.untrack_count(symbol) == epoch {
            self.tracking.track(symbol);
        } else {
            debug!(symbol, technique = %technique, "Untracked during training; not re-tracking");
        }
        forecast
    }

    /// Stop tracking `symbol`, dropping its models when `evict` is set.
    /// Returns true if the symbol was tracked.
    pub fn untrack(&self, symbol: &str, evict: bool) -> bool {
        let _membership = self.lock_membership();
        *self.untracks.entry(symbol.to_string()).or_insert(0) += 1;
        let was_tracked = self.tracking.untrack(symbol);
        if evict {
            self.evict_symbol(symbol);
        }
        was_tracked
    }

    fn untrack_count(&self, symbol: &str) -> u64 {
        self.untracks.get(symbol).map(|c| *c.value()).unwrap_or(0)
    }

    fn lock_membership(&self) -> MutexGuard<'_, ()> {
        self.membership.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Refresh every live model for `symbol` with `bar`.
    ///
    /// Techniques without a model, and refreshes that fail, are left out of
    /// the result. Blocking; refreshes for different techniques run on the
    /// rayon pool in parallel.
    pub fn refresh_all(&self, symbol: &str, bar: &Bar) -> BTreeMap<Technique, OneStepForecast> {
        let models: Vec<(Technique, SharedModel)> = Technique::ALL
            .iter()
            .filter_map(|t| self.get(symbol, *t).map(|m| (*t, m)))
            .collect();

        models
            .into_par_iter()
            .filter_map(|(technique, model)| {
                let result = lock_model(&model).refresh(bar.clone());
                match result {
                    Ok(forecast) => Some((technique, forecast)),
                    Err(e @ ForecastError::FitFailure(_)) => {
                        warn!(symbol, technique = %technique, error = %e, "Refresh failed");
                        None
                    }
                    Err(e) => {
                        debug!(symbol, technique = %technique, error = %e, "Refresh skipped");
                        None
                    }
                }
            })
            .collect()
    }

    /// Drop every model for `symbol`. Returns how many were removed.
    pub fn evict_symbol(&self, symbol: &str) -> usize {
        let removed = Technique::ALL
            .iter()
            .filter(|t| self.models.remove(&RegistryKey::new(symbol, **t)).is_some())
            .count();
        if removed > 0 {
            debug!(symbol, removed, "Evicted models");
        }
        removed
    }

    pub fn techniques_for(&self, symbol: &str) -> Vec<Technique> {
        Technique::ALL
            .iter()
            .copied()
            .filter(|t| self.models.contains_key(&RegistryKey::new(symbol, *t)))
            .collect()
    }

    pub fn history_len(&self, symbol: &str, technique: Technique) -> Option<usize> {
        let model = self.get(symbol, technique)?;
        let len = lock_model(&model).history_len();
        Some(len)
    }

    pub fn last_source(&self, symbol: &str, technique: Technique) -> Option<ForecastSource> {
        let model = self.get(symbol, technique)?;
        let source = lock_model(&model).last_source().cloned();
        source
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Lock a model, recovering the guard if a previous holder panicked.
pub fn lock_model(model: &SharedModel) -> MutexGuard<'_, ForecastModel> {
    model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
