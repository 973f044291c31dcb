//! Shared store of fitted pace models.
//!
//! Models are kept per athlete and activity type, plus one population-wide
//! default per activity type. Lookups fall back from the athlete model to the
//! activity default and finally to the built-in parameters, so scheduling
//! never waits on training.
//!
//! Parameters are held behind `Arc` and swapped whole, so a reader holding a
//! resolved model keeps a consistent snapshot while a retrain replaces it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::{info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::TrainingError;
use crate::prediction::{fit_with_config, PredictionModelParameters, TrainingConfig, TrainingObservation};

/// Lookup key for a stored model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    /// `None` for the activity-type default
    pub athlete_id: Option<String>,
    pub activity_type: String,
}

impl ModelKey {
    pub fn athlete(athlete_id: &str, activity_type: &str) -> Self {
        Self {
            athlete_id: Some(athlete_id.to_string()),
            activity_type: activity_type.to_string(),
        }
    }

    pub fn activity_default(activity_type: &str) -> Self {
        Self {
            athlete_id: None,
            activity_type: activity_type.to_string(),
        }
    }
}

/// Which level of the fallback chain produced a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    Athlete,
    ActivityDefault,
    BuiltIn,
}

#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub source: ModelSource,
    pub parameters: Arc<PredictionModelParameters>,
}

/// Thread-safe model store.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<ModelKey, Arc<PredictionModelParameters>>>,
    config: TrainingConfig,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TrainingConfig) -> Self {
        Self {
            models: RwLock::default(),
            config,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Store parameters under `key`, returning the model they replace.
    pub fn replace(
        &self,
        key: ModelKey,
        parameters: PredictionModelParameters,
    ) -> Option<Arc<PredictionModelParameters>> {
        self.store(key, Arc::new(parameters))
    }

    fn store(
        &self,
        key: ModelKey,
        parameters: Arc<PredictionModelParameters>,
    ) -> Option<Arc<PredictionModelParameters>> {
        info!(
            "[Registry] Replacing model {:?}/{} ({} observations)",
            key.athlete_id,
            key.activity_type,
            parameters.observation_count()
        );
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        models.insert(key, parameters)
    }

    pub fn get(&self, key: &ModelKey) -> Option<Arc<PredictionModelParameters>> {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        models.get(key).cloned()
    }

    pub fn remove(&self, key: &ModelKey) -> Option<Arc<PredictionModelParameters>> {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        models.remove(key)
    }

    /// The most specific model available for an athlete and activity type.
    pub fn resolve(&self, athlete_id: Option<&str>, activity_type: &str) -> ResolvedModel {
        if let Some(athlete_id) = athlete_id {
            if let Some(parameters) = self.get(&ModelKey::athlete(athlete_id, activity_type)) {
                return ResolvedModel {
                    source: ModelSource::Athlete,
                    parameters,
                };
            }
        }

        if let Some(parameters) = self.get(&ModelKey::activity_default(activity_type)) {
            if athlete_id.is_some() {
                warn!(
                    "[Registry] No model for athlete {:?} on {}, using activity default",
                    athlete_id, activity_type
                );
            }
            return ResolvedModel {
                source: ModelSource::ActivityDefault,
                parameters,
            };
        }

        warn!(
            "[Registry] No model for {}, using built-in parameters",
            activity_type
        );
        ResolvedModel {
            source: ModelSource::BuiltIn,
            parameters: Arc::new(PredictionModelParameters::activity_default()),
        }
    }

    /// Fit a model for `key` and store it.
    ///
    /// On failure the previously stored model, if any, stays in place.
    pub fn retrain(
        &self,
        key: ModelKey,
        observations: &[TrainingObservation],
    ) -> Result<Arc<PredictionModelParameters>, TrainingError> {
        match fit_with_config(observations, &self.config) {
            Ok(parameters) => {
                let parameters = Arc::new(parameters);
                self.store(key, Arc::clone(&parameters));
                Ok(parameters)
            }
            Err(e) => {
                warn!(
                    "[Registry] Training failed for {:?}/{}: {}",
                    key.athlete_id, key.activity_type, e
                );
                Err(e)
            }
        }
    }

    /// Retrain several models concurrently. Results keep the input order.
    #[cfg(feature = "parallel")]
    pub fn retrain_many(
        &self,
        jobs: Vec<(ModelKey, Vec<TrainingObservation>)>,
    ) -> Vec<(ModelKey, Result<Arc<PredictionModelParameters>, TrainingError>)> {
        use rayon::prelude::*;

        jobs.into_par_iter()
            .map(|(key, observations)| {
                let result = self.retrain(key.clone(), &observations);
                (key, result)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored models, sorted by key.
    pub fn snapshot(&self) -> Vec<(ModelKey, Arc<PredictionModelParameters>)> {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = models
            .iter()
            .map(|(key, parameters)| (key.clone(), Arc::clone(parameters)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn clear(&self) {
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ============================================================================
// Global Singleton
// ============================================================================

/// Process-wide registry for callers that don't manage their own.
pub static MODEL_REGISTRY: Lazy<ModelRegistry> = Lazy::new(ModelRegistry::new);

/// Run a closure against the global registry.
pub fn with_registry<F, R>(f: F) -> R
where
    F: FnOnce(&ModelRegistry) -> R,
{
    f(&MODEL_REGISTRY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::WorkoutType;

    fn observations() -> Vec<TrainingObservation> {
        (0..20)
            .map(|i| {
                let gradient = i as f64 - 10.0;
                TrainingObservation {
                    gradient,
                    pace: 0.4 + 0.01 * gradient + 0.0005 * gradient * gradient,
                    total_distance: 10_000.0,
                    total_elevation_gain: 500.0,
                    gear: None,
                    workout_type: WorkoutType::None,
                }
            })
            .collect()
    }

    #[test]
    fn test_resolve_falls_back_to_built_in() {
        let registry = ModelRegistry::new();
        let resolved = registry.resolve(Some("athlete-1"), "Run");
        assert_eq!(resolved.source, ModelSource::BuiltIn);
        assert_eq!(
            *resolved.parameters,
            PredictionModelParameters::activity_default()
        );
    }

    #[test]
    fn test_resolve_prefers_athlete_model() {
        let registry = ModelRegistry::new();
        registry
            .retrain(ModelKey::activity_default("Run"), &observations())
            .unwrap();
        assert_eq!(
            registry.resolve(Some("athlete-1"), "Run").source,
            ModelSource::ActivityDefault
        );

        registry
            .retrain(ModelKey::athlete("athlete-1", "Run"), &observations())
            .unwrap();
        assert_eq!(
            registry.resolve(Some("athlete-1"), "Run").source,
            ModelSource::Athlete
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_failed_retrain_keeps_prior_model() {
        let registry = ModelRegistry::new();
        let key = ModelKey::athlete("athlete-1", "Run");
        let prior = registry.retrain(key.clone(), &observations()).unwrap();

        assert_eq!(
            registry.retrain(key.clone(), &[]),
            Err(TrainingError::EmptyCorpus)
        );
        assert_eq!(registry.get(&key), Some(prior));
    }
}
