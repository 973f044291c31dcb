//! Pace prediction: a ridge regression from terrain and context to pace.
//!
//! The model predicts pace in seconds per meter from:
//! - the gradient of a step, expanded to `[1, gradient, gradient²]`
//! - the total distance and total elevation gain of the effort
//! - the gear and workout type, one-hot encoded against the categories seen
//!   during training
//!
//! [`PredictionModelParameters`] holds everything needed to rebuild the
//! fitted model: coefficients in feature order, intercept and the category
//! lists that fix that order. Prediction is a stateless function of the
//! parameters and raw features, so parameters restored from storage give
//! exactly the same predictions as the in-memory model.
//!
//! ## Example
//! ```rust
//! use route_profile::prediction::{fit, TrainingObservation, WorkoutType};
//!
//! let observations: Vec<TrainingObservation> = (0..40)
//!     .map(|i| {
//!         let gradient = (i % 20) as f64 - 10.0;
//!         TrainingObservation {
//!             gradient,
//!             pace: 0.4 + 0.01 * gradient + 0.001 * gradient * gradient,
//!             total_distance: 12_000.0,
//!             total_elevation_gain: 600.0,
//!             gear: Some("g123".to_string()),
//!             workout_type: WorkoutType::LongRun,
//!         }
//!     })
//!     .collect();
//!
//! let parameters = fit(&observations).unwrap();
//! let pace = parameters.predict(0.0, 12_000.0, 600.0, Some("g123"), WorkoutType::LongRun);
//! assert!((pace - 0.4).abs() < 0.05);
//! ```

use std::collections::BTreeSet;
use std::fmt;

use faer::linalg::solvers::Solve;
use faer::{Mat, Side};
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result, TrainingError};

/// Category used for a missing gear or workout type.
pub const NONE_CATEGORY: &str = "None";

/// Features following the one-hot blocks: bias, gradient, gradient²,
/// total elevation gain, total distance.
const NUMERIC_FEATURES: usize = 5;

// ============================================================================
// Workout Type
// ============================================================================

/// Workout type as tagged by the activity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WorkoutType {
    #[default]
    None,
    DefaultRun,
    RaceRun,
    LongRun,
    WorkoutRun,
    DefaultRide,
    RaceRide,
    WorkoutRide,
}

impl WorkoutType {
    /// Category label used by the one-hot encoding.
    pub fn label(&self) -> &'static str {
        match self {
            WorkoutType::None => NONE_CATEGORY,
            WorkoutType::DefaultRun => "default run",
            WorkoutType::RaceRun => "race run",
            WorkoutType::LongRun => "long run",
            WorkoutType::WorkoutRun => "workout run",
            WorkoutType::DefaultRide => "default ride",
            WorkoutType::RaceRide => "race ride",
            WorkoutType::WorkoutRide => "workout ride",
        }
    }

    /// Map the provider's numeric workout code. Unknown codes map to `None`.
    pub fn from_code(code: Option<u8>) -> Self {
        match code {
            Some(0) => WorkoutType::DefaultRun,
            Some(1) => WorkoutType::RaceRun,
            Some(2) => WorkoutType::LongRun,
            Some(3) => WorkoutType::WorkoutRun,
            Some(10) => WorkoutType::DefaultRide,
            Some(11) => WorkoutType::RaceRide,
            Some(12) => WorkoutType::WorkoutRide,
            _ => WorkoutType::None,
        }
    }

    pub fn code(&self) -> Option<u8> {
        match self {
            WorkoutType::None => None,
            WorkoutType::DefaultRun => Some(0),
            WorkoutType::RaceRun => Some(1),
            WorkoutType::LongRun => Some(2),
            WorkoutType::WorkoutRun => Some(3),
            WorkoutType::DefaultRide => Some(10),
            WorkoutType::RaceRide => Some(11),
            WorkoutType::WorkoutRide => Some(12),
        }
    }
}

impl fmt::Display for WorkoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Training Data
// ============================================================================

/// One step of one historical effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingObservation {
    /// Slope of the step in percent
    pub gradient: f64,
    /// Elapsed seconds per meter over the step
    pub pace: f64,
    /// Total distance of the effort in meters
    pub total_distance: f64,
    /// Total elevation gain of the effort in meters
    pub total_elevation_gain: f64,
    /// Gear identifier, if the effort recorded one
    pub gear: Option<String>,
    pub workout_type: WorkoutType,
}

impl TrainingObservation {
    pub fn gear_label(&self) -> &str {
        self.gear.as_deref().unwrap_or(NONE_CATEGORY)
    }
}

/// Bounds outside of which observations are treated as recording noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingFilter {
    /// Default: -100.0 %
    pub min_gradient: f64,
    /// Default: 100.0 %
    pub max_gradient: f64,
    /// Default: 0.12 s/m (2:00 min/km)
    pub min_pace: f64,
    /// Default: 2.4 s/m (40:00 min/km)
    pub max_pace: f64,
}

impl Default for TrainingFilter {
    fn default() -> Self {
        Self {
            min_gradient: -100.0,
            max_gradient: 100.0,
            min_pace: 0.12,
            max_pace: 2.4,
        }
    }
}

impl TrainingFilter {
    pub fn accepts(&self, observation: &TrainingObservation) -> bool {
        (self.min_gradient..=self.max_gradient).contains(&observation.gradient)
            && (self.min_pace..=self.max_pace).contains(&observation.pace)
    }
}

/// Configuration for model training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Ridge regularization strength.
    /// Default: 1.0
    pub alpha: f64,

    /// Number of cross-validation folds.
    /// Default: 5
    pub folds: usize,

    /// Outlier filter applied before fitting, if any.
    /// Default: `TrainingFilter::default()`
    pub filter: Option<TrainingFilter>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            folds: 5,
            filter: Some(TrainingFilter::default()),
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Fitted model parameters, sufficient to reproduce every prediction.
///
/// Coefficients follow the feature order
/// `[gear one-hot…, workout type one-hot…, 1, gradient, gradient², total_elevation_gain, total_distance]`.
/// Deserialization validates that the coefficient count matches the
/// category lists, so a value of this type is always usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParametersRecord")]
pub struct PredictionModelParameters {
    coefficients: Vec<f64>,
    intercept: f64,
    gear_categories: Vec<String>,
    workout_type_categories: Vec<String>,
    model_score: f64,
    cv_scores: Vec<f64>,
    observation_count: usize,
}

/// Unvalidated serialized form of [`PredictionModelParameters`].
#[derive(Deserialize)]
struct ParametersRecord {
    coefficients: Vec<f64>,
    intercept: f64,
    gear_categories: Vec<String>,
    workout_type_categories: Vec<String>,
    #[serde(default)]
    model_score: f64,
    #[serde(default)]
    cv_scores: Vec<f64>,
    #[serde(default)]
    observation_count: usize,
}

impl TryFrom<ParametersRecord> for PredictionModelParameters {
    type Error = ProfileError;

    fn try_from(record: ParametersRecord) -> Result<Self> {
        let mut parameters = Self::from_parts(
            record.coefficients,
            record.intercept,
            record.gear_categories,
            record.workout_type_categories,
        )?;
        parameters.model_score = record.model_score;
        parameters.cv_scores = record.cv_scores;
        parameters.observation_count = record.observation_count;
        Ok(parameters)
    }
}

impl PredictionModelParameters {
    /// Assemble parameters from stored parts, checking their consistency.
    pub fn from_parts(
        coefficients: Vec<f64>,
        intercept: f64,
        gear_categories: Vec<String>,
        workout_type_categories: Vec<String>,
    ) -> Result<Self> {
        let expected = gear_categories.len() + workout_type_categories.len() + NUMERIC_FEATURES;
        if coefficients.len() != expected {
            return Err(ProfileError::InvalidParameters {
                expected,
                found: coefficients.len(),
            });
        }
        if let Some(index) = coefficients.iter().position(|c| !c.is_finite()) {
            return Err(ProfileError::NonFiniteValue {
                column: "coefficients",
                index,
            });
        }
        if !intercept.is_finite() {
            return Err(ProfileError::NonFiniteValue {
                column: "intercept",
                index: 0,
            });
        }

        Ok(Self {
            coefficients,
            intercept,
            gear_categories,
            workout_type_categories,
            model_score: 0.0,
            cv_scores: Vec::new(),
            observation_count: 0,
        })
    }

    /// Built-in model used when neither the athlete nor the activity type
    /// has trained parameters: 0.36 s/m (6:00 min/km) on the flat, slowing
    /// quadratically with slope and linearly with total climbing.
    pub fn activity_default() -> Self {
        Self {
            // [gear None, workout None, bias, gradient, gradient², elevation gain, distance]
            coefficients: vec![0.0, 0.0, 0.0, 0.01, 0.0007, 0.0001, 0.0],
            intercept: 0.36,
            gear_categories: vec![NONE_CATEGORY.to_string()],
            workout_type_categories: vec![NONE_CATEGORY.to_string()],
            model_score: 0.0,
            cv_scores: Vec::new(),
            observation_count: 0,
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn gear_categories(&self) -> &[String] {
        &self.gear_categories
    }

    pub fn workout_type_categories(&self) -> &[String] {
        &self.workout_type_categories
    }

    /// R² of the model on its training corpus.
    pub fn model_score(&self) -> f64 {
        self.model_score
    }

    /// R² on each held-out cross-validation fold.
    pub fn cv_scores(&self) -> &[f64] {
        &self.cv_scores
    }

    pub fn observation_count(&self) -> usize {
        self.observation_count
    }

    /// Predicted pace in seconds per meter.
    pub fn predict(
        &self,
        gradient: f64,
        total_distance: f64,
        total_elevation_gain: f64,
        gear: Option<&str>,
        workout_type: WorkoutType,
    ) -> f64 {
        let features = feature_vector(
            &self.gear_categories,
            &self.workout_type_categories,
            gradient,
            total_distance,
            total_elevation_gain,
            gear.unwrap_or(NONE_CATEGORY),
            workout_type.label(),
        );
        self.coefficients
            .iter()
            .zip(&features)
            .fold(self.intercept, |pace, (c, x)| pace + c * x)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProfileError::Serialization {
            message: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ProfileError::Serialization {
            message: e.to_string(),
        })
    }

    /// Encode as a MessagePack blob with named fields.
    #[cfg(feature = "persistence")]
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| ProfileError::Serialization {
            message: e.to_string(),
        })
    }

    #[cfg(feature = "persistence")]
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| ProfileError::Serialization {
            message: e.to_string(),
        })
    }
}

/// Predicted pace in seconds per meter for one step.
pub fn predict(
    parameters: &PredictionModelParameters,
    gradient: f64,
    total_distance: f64,
    total_elevation_gain: f64,
    gear: Option<&str>,
    workout_type: WorkoutType,
) -> f64 {
    parameters.predict(
        gradient,
        total_distance,
        total_elevation_gain,
        gear,
        workout_type,
    )
}

// ============================================================================
// Features
// ============================================================================

/// Expand raw features into the model's feature vector.
///
/// A category missing from its list falls back to the "None" category when
/// the list has one, and to all zeros otherwise.
pub fn feature_vector(
    gear_categories: &[String],
    workout_type_categories: &[String],
    gradient: f64,
    total_distance: f64,
    total_elevation_gain: f64,
    gear: &str,
    workout_type: &str,
) -> Vec<f64> {
    let mut features = Vec::with_capacity(
        gear_categories.len() + workout_type_categories.len() + NUMERIC_FEATURES,
    );
    one_hot(gear_categories, gear, &mut features);
    one_hot(workout_type_categories, workout_type, &mut features);
    features.extend([
        1.0,
        gradient,
        gradient * gradient,
        total_elevation_gain,
        total_distance,
    ]);
    features
}

fn one_hot(categories: &[String], value: &str, out: &mut Vec<f64>) {
    let hot = categories
        .iter()
        .position(|c| c == value)
        .or_else(|| categories.iter().position(|c| c == NONE_CATEGORY));
    out.extend((0..categories.len()).map(|i| if Some(i) == hot { 1.0 } else { 0.0 }));
}

// ============================================================================
// Training
// ============================================================================

/// Fit a pace model with the default training configuration.
pub fn fit(
    observations: &[TrainingObservation],
) -> std::result::Result<PredictionModelParameters, TrainingError> {
    fit_with_config(observations, &TrainingConfig::default())
}

/// Fit a pace model.
///
/// Deterministic: the same observations always give the same parameters.
pub fn fit_with_config(
    observations: &[TrainingObservation],
    config: &TrainingConfig,
) -> std::result::Result<PredictionModelParameters, TrainingError> {
    check_observations(observations)?;

    let usable: Vec<&TrainingObservation> = observations
        .iter()
        .filter(|o| config.filter.map_or(true, |f| f.accepts(o)))
        .collect();
    if usable.is_empty() {
        return Err(TrainingError::EmptyCorpus);
    }
    debug!(
        "[Prediction] {} of {} observations kept after filtering",
        usable.len(),
        observations.len()
    );

    let gear_categories = categories(usable.iter().map(|o| o.gear_label()));
    let workout_type_categories = categories(usable.iter().map(|o| o.workout_type.label()));

    let width = gear_categories.len() + workout_type_categories.len() + NUMERIC_FEATURES;
    let mut x = Array2::<f64>::zeros((usable.len(), width));
    let mut y = Array1::<f64>::zeros(usable.len());
    for (row, observation) in usable.iter().enumerate() {
        let features = feature_vector(
            &gear_categories,
            &workout_type_categories,
            observation.gradient,
            observation.total_distance,
            observation.total_elevation_gain,
            observation.gear_label(),
            observation.workout_type.label(),
        );
        x.row_mut(row).assign(&Array1::from(features));
        y[row] = observation.pace;
    }

    let (coefficients, intercept) = solve_ridge(&x, &y, config.alpha)?;
    let model_score = r2_score(&y, &(x.dot(&coefficients) + intercept));
    let cv_scores = cross_validate(&x, &y, config)?;

    info!(
        "[Prediction] Fitted model on {} observations: R² = {:.3}",
        usable.len(),
        model_score
    );

    Ok(PredictionModelParameters {
        coefficients: coefficients.to_vec(),
        intercept,
        gear_categories,
        workout_type_categories,
        model_score,
        cv_scores,
        observation_count: usable.len(),
    })
}

fn check_observations(
    observations: &[TrainingObservation],
) -> std::result::Result<(), TrainingError> {
    if observations.is_empty() {
        return Err(TrainingError::EmptyCorpus);
    }
    for (index, o) in observations.iter().enumerate() {
        let fields = [
            ("gradient", o.gradient),
            ("pace", o.pace),
            ("total_distance", o.total_distance),
            ("total_elevation_gain", o.total_elevation_gain),
        ];
        if let Some(&(field, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TrainingError::NonFiniteObservation { index, field });
        }
    }
    Ok(())
}

/// Sorted, deduplicated category labels.
fn categories<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<String> {
    labels
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Ridge regression with an unpenalized intercept.
///
/// Solves `(XcᵀXc + αI) β = Xcᵀyc` on centered data, then recovers the
/// intercept from the means.
fn solve_ridge(
    x: &Array2<f64>,
    y: &Array1<f64>,
    alpha: f64,
) -> std::result::Result<(Array1<f64>, f64), TrainingError> {
    let x_mean = x.mean_axis(Axis(0)).ok_or(TrainingError::EmptyCorpus)?;
    let y_mean = y.mean().ok_or(TrainingError::EmptyCorpus)?;
    let xc = x - &x_mean;
    let yc = y - y_mean;

    let mut gram = xc.t().dot(&xc);
    for i in 0..gram.nrows() {
        gram[[i, i]] += alpha;
    }
    let rhs = xc.t().dot(&yc);

    let coefficients = cholesky_solve(&gram, &rhs).ok_or(TrainingError::Singular)?;
    let intercept = y_mean - x_mean.dot(&coefficients);
    Ok((coefficients, intercept))
}

/// Solve `A x = b` for symmetric positive definite `A` through its
/// Cholesky factorization. `None` when `A` is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let llt = Mat::from_fn(n, n, |i, j| a[[i, j]])
        .llt(Side::Lower)
        .ok()?;
    let solution = llt.solve(&Mat::from_fn(n, 1, |i, _| b[i]));

    let solution = Array1::from_iter((0..n).map(|i| solution[(i, 0)]));
    solution.iter().all(|v| v.is_finite()).then_some(solution)
}

/// Coefficient of determination. A constant target scores 1.0 when predicted
/// exactly and 0.0 otherwise.
fn r2_score(y: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let mean = y.mean().unwrap_or(0.0);
    let ss_res: f64 = y.iter().zip(predicted).map(|(a, b)| (a - b).powi(2)).sum();
    let ss_tot: f64 = y.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// R² per fold, with row `i` held out in fold `i % folds`.
///
/// Empty when there are fewer than two observations per fold.
fn cross_validate(
    x: &Array2<f64>,
    y: &Array1<f64>,
    config: &TrainingConfig,
) -> std::result::Result<Vec<f64>, TrainingError> {
    let folds = config.folds;
    if folds < 2 || y.len() < folds * 2 {
        return Ok(Vec::new());
    }

    (0..folds)
        .map(|fold| -> std::result::Result<f64, TrainingError> {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|i| i % folds == fold);
            let (coefficients, intercept) = solve_ridge(
                &x.select(Axis(0), &train),
                &y.select(Axis(0), &train),
                config.alpha,
            )?;
            let predicted = x.select(Axis(0), &test).dot(&coefficients) + intercept;
            Ok(r2_score(&y.select(Axis(0), &test), &predicted))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
