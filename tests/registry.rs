//! Tests for registry module

use std::sync::Arc;
use std::thread;

use route_profile::registry::*;
use route_profile::{PredictionModelParameters, TrainingError, TrainingObservation, WorkoutType};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn observations(offset: f64) -> Vec<TrainingObservation> {
    (0..30)
        .map(|i| {
            let gradient = (i % 15) as f64 - 7.0;
            TrainingObservation {
                gradient,
                pace: offset + 0.012 * gradient + 0.0004 * gradient * gradient,
                total_distance: 8_000.0,
                total_elevation_gain: 300.0,
                gear: Some("gear-1".to_string()),
                workout_type: WorkoutType::DefaultRun,
            }
        })
        .collect()
}

#[test]
fn test_empty_corpus_falls_back_to_defaults() {
    init_logging();
    let registry = ModelRegistry::new();
    let key = ModelKey::athlete("athlete-7", "Hike");

    assert_eq!(registry.retrain(key.clone(), &[]), Err(TrainingError::EmptyCorpus));
    assert!(registry.get(&key).is_none());

    let resolved = registry.resolve(Some("athlete-7"), "Hike");
    assert_eq!(resolved.source, ModelSource::BuiltIn);
    assert_eq!(
        resolved.parameters.as_ref(),
        &PredictionModelParameters::activity_default()
    );

    let population = registry
        .retrain(ModelKey::activity_default("Hike"), &observations(0.6))
        .unwrap();
    let resolved = registry.resolve(Some("athlete-7"), "Hike");
    assert_eq!(resolved.source, ModelSource::ActivityDefault);
    assert!(Arc::ptr_eq(&resolved.parameters, &population));
}

#[test]
fn test_activity_types_are_separate() {
    let registry = ModelRegistry::new();
    registry
        .retrain(ModelKey::athlete("athlete-1", "Run"), &observations(0.35))
        .unwrap();

    assert_eq!(registry.resolve(Some("athlete-1"), "Run").source, ModelSource::Athlete);
    assert_eq!(registry.resolve(Some("athlete-1"), "Ride").source, ModelSource::BuiltIn);
    assert_eq!(registry.resolve(Some("athlete-2"), "Run").source, ModelSource::BuiltIn);
    assert_eq!(registry.resolve(None, "Run").source, ModelSource::BuiltIn);
}

#[test]
fn test_replace_returns_previous_model() {
    let registry = ModelRegistry::new();
    let key = ModelKey::activity_default("Run");

    assert!(registry
        .replace(key.clone(), PredictionModelParameters::activity_default())
        .is_none());
    let previous = registry
        .replace(key.clone(), PredictionModelParameters::activity_default())
        .unwrap();
    assert_eq!(*previous, PredictionModelParameters::activity_default());

    assert!(registry.remove(&key).is_some());
    assert!(registry.is_empty());
}

#[test]
fn test_readers_keep_their_snapshot() {
    let registry = ModelRegistry::new();
    let key = ModelKey::athlete("athlete-1", "Run");
    registry.retrain(key.clone(), &observations(0.35)).unwrap();

    let held = registry.resolve(Some("athlete-1"), "Run").parameters;
    let before = held.predict(3.0, 8_000.0, 300.0, Some("gear-1"), WorkoutType::DefaultRun);

    registry.retrain(key, &observations(0.5)).unwrap();
    let after = held.predict(3.0, 8_000.0, 300.0, Some("gear-1"), WorkoutType::DefaultRun);
    assert_eq!(before.to_bits(), after.to_bits());

    let fresh = registry.resolve(Some("athlete-1"), "Run").parameters;
    assert!(fresh.predict(3.0, 8_000.0, 300.0, Some("gear-1"), WorkoutType::DefaultRun) > before);
}

#[test]
fn test_concurrent_retrain_and_resolve() {
    let registry = Arc::new(ModelRegistry::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..10 {
                    let key = ModelKey::athlete(&format!("athlete-{}", t), "Run");
                    registry
                        .retrain(key, &observations(0.3 + i as f64 * 0.01))
                        .unwrap();
                    let athlete = format!("athlete-{}", t);
                    let resolved = registry.resolve(Some(athlete.as_str()), "Run");
                    assert_eq!(resolved.source, ModelSource::Athlete);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 4);
    assert!(snapshot.windows(2).all(|w| w[0].0 < w[1].0));
}

#[cfg(feature = "parallel")]
#[test]
fn test_retrain_many() {
    let registry = ModelRegistry::new();
    let jobs = vec![
        (ModelKey::athlete("a", "Run"), observations(0.35)),
        (ModelKey::athlete("b", "Run"), Vec::new()),
        (ModelKey::activity_default("Run"), observations(0.4)),
    ];
    let results = registry.retrain_many(jobs);

    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    assert_eq!(results[1].1, Err(TrainingError::EmptyCorpus));
    assert!(results[2].1.is_ok());
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_global_registry() {
    let key = ModelKey::athlete("global-test-athlete", "Snowshoe");
    with_registry(|registry| {
        registry.replace(key.clone(), PredictionModelParameters::activity_default());
    });
    assert_eq!(
        MODEL_REGISTRY.resolve(Some("global-test-athlete"), "Snowshoe").source,
        ModelSource::Athlete
    );
    MODEL_REGISTRY.remove(&key);
}
