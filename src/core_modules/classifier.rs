// THEORY:
// The `classifier` module is a distance-weighted K-Nearest-Neighbors classifier over
// the seven color features `[R, G, B, H, S, V, Kelvin]`. It labels a freshly sampled
// light against a small reference table of known lights.
//
// Key architectural principles:
// 1.  **Standardized feature space**: the raw features live on wildly different scales
//     (bytes, degrees, percentages, thousands of Kelvin). A `FeatureScaler` fitted once
//     per training run z-scores every dimension, and the same scaler is reused for every
//     query until the next training. A dimension with zero spread keeps a divisor of 1.
// 2.  **Explicit lifecycle**: a `KnnClassifier` starts Untrained. `train` and `import`
//     publish a complete `ClassifierModel`; `dispose` returns it to Untrained. There is
//     no incremental update.
// 3.  **Atomic publication**: the model sits behind an `RwLock<Option<Arc<_>>>`. A
//     prediction clones the `Arc` and releases the lock immediately, so a concurrent
//     retrain swaps the pointer without ever exposing a half-built model.
// 4.  **Deterministic votes**: every neighbor adds `1/(distance + 1e-6)` to its class.
//     Equal distances keep training order (stable sort). Equal tallies go to the
//     lexically smallest class name.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core_modules::color_space::{rgb_to_color_temperature, rgb_to_hsv};
use crate::error::{ProbeError, Result};

pub const FEATURE_DIMENSIONS: usize = 7;
pub const FEATURE_NAMES: [&str; FEATURE_DIMENSIONS] = ["R", "G", "B", "H", "S", "V", "K"];
pub const DEFAULT_K: usize = 3;
const DISTANCE_EPSILON: f64 = 1e-6;

/// The seven classifier features of an RGB color.
pub fn features_from_rgb(r: u8, g: u8, b: u8) -> [f64; FEATURE_DIMENSIONS] {
    let hsv = rgb_to_hsv(r, g, b);
    let kelvin = rgb_to_color_temperature(r, g, b).feature_value();
    [r as f64, g as f64, b as f64, hsv.h, hsv.s, hsv.v, kelvin]
}

/// One labeled reference color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataPoint {
    pub features: Vec<f64>,
    pub class_name: String,
}

impl TrainingDataPoint {
    pub fn new(features: impl Into<Vec<f64>>, class_name: impl Into<String>) -> Self {
        Self {
            features: features.into(),
            class_name: class_name.into(),
        }
    }

    pub fn from_rgb(r: u8, g: u8, b: u8, class_name: impl Into<String>) -> Self {
        Self::new(features_from_rgb(r, g, b), class_name)
    }
}

/// Per-dimension z-score parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl FeatureScaler {
    /// Fits mean and population standard deviation per dimension. All rows must share
    /// the length of the first row.
    pub fn fit(rows: &[&[f64]]) -> Self {
        let dimensions = rows.first().map_or(0, |row| row.len());
        let count = rows.len().max(1) as f64;

        let mut mean = vec![0.0; dimensions];
        for row in rows {
            for (acc, value) in mean.iter_mut().zip(row.iter()) {
                *acc += value;
            }
        }
        mean.iter_mut().for_each(|m| *m /= count);

        let mut std = vec![0.0; dimensions];
        for row in rows {
            for ((acc, value), m) in std.iter_mut().zip(row.iter()).zip(mean.iter()) {
                *acc += (value - m).powi(2);
            }
        }
        for s in std.iter_mut() {
            *s = (*s / count).sqrt();
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Self { mean, std }
    }

    pub fn dimensions(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(value, (mean, std))| (value - mean) / std)
            .collect()
    }
}

/// The complete, exportable state of a trained classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    /// Training points in standardized feature space.
    pub training_data: Vec<TrainingDataPoint>,
    pub scaler: FeatureScaler,
    pub k: usize,
    /// Distinct class names, sorted.
    pub classes: Vec<String>,
}

impl ClassifierModel {
    fn validate(&self) -> Result<()> {
        let dimensions = self.scaler.dimensions();
        if self.training_data.is_empty() {
            return Err(ProbeError::input("model has no training data"));
        }
        if dimensions == 0 || self.scaler.std.len() != dimensions || self.scaler.mean.len() != dimensions {
            return Err(ProbeError::input("model scaler is malformed"));
        }
        if self.scaler.std.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(ProbeError::input("model scaler has a zero or non-finite deviation"));
        }
        if self.scaler.mean.iter().any(|m| !m.is_finite()) {
            return Err(ProbeError::input("model scaler has a non-finite mean"));
        }
        if self.k == 0 {
            return Err(ProbeError::input("model k must be at least 1"));
        }
        if let Some(point) = self.training_data.iter().find(|p| p.features.len() != dimensions) {
            return Err(ProbeError::input(format!(
                "training point '{}' has {} features, scaler has {}",
                point.class_name,
                point.features.len(),
                dimensions
            )));
        }
        if let Some(point) = self.training_data.iter().find(|p| p.features.iter().any(|v| !v.is_finite())) {
            return Err(ProbeError::input(format!(
                "training point '{}' has a non-finite feature",
                point.class_name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub class_name: String,
    /// Euclidean distance in standardized feature space.
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_name: String,
    /// Winning tally over the sum of all K tallies, in (0, 1].
    pub confidence: f64,
    /// The K nearest training points, closest first.
    pub neighbors: Vec<Neighbor>,
    /// Normalized tally of every known class, highest first.
    pub class_scores: Vec<(String, f64)>,
}

/// Resubstitution accuracy of a trained model over a labeled set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// Shared ownership of one classifier between the pipeline and its trainers.
pub type ClassifierHandle = Arc<KnnClassifier>;

/// A distance-weighted K-NN classifier with an atomically swapped model.
#[derive(Debug)]
pub struct KnnClassifier {
    k: usize,
    model: RwLock<Option<Arc<ClassifierModel>>>,
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            model: RwLock::new(None),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Fits a scaler over `data`, standardizes every point and publishes the model.
    pub fn train(&self, data: &[TrainingDataPoint]) -> Result<()> {
        let model = Self::build_model(data, self.k)?;
        info!(
            samples = model.training_data.len(),
            classes = model.classes.len(),
            k = model.k,
            "classifier trained"
        );
        self.publish(Some(Arc::new(model)));
        Ok(())
    }

    /// Trains on a blocking worker so the tick loop keeps running. Predictions see the
    /// previous model until the new one is published.
    pub fn train_in_background(self: &Arc<Self>, data: Vec<TrainingDataPoint>) -> JoinHandle<Result<()>> {
        let classifier = Arc::clone(self);
        tokio::task::spawn_blocking(move || classifier.train(&data))
    }

    fn build_model(data: &[TrainingDataPoint], k: usize) -> Result<ClassifierModel> {
        let Some(first) = data.first() else {
            return Err(ProbeError::input("training data is empty"));
        };
        let dimensions = first.features.len();
        if dimensions == 0 {
            return Err(ProbeError::input("training points have no features"));
        }
        for (index, point) in data.iter().enumerate() {
            if point.features.len() != dimensions {
                return Err(ProbeError::input(format!(
                    "training point {} has {} features, expected {}",
                    index,
                    point.features.len(),
                    dimensions
                )));
            }
            if point.features.iter().any(|v| !v.is_finite()) {
                return Err(ProbeError::input(format!("training point {} has a non-finite feature", index)));
            }
            if point.class_name.trim().is_empty() {
                return Err(ProbeError::input(format!("training point {} has an empty class name", index)));
            }
        }

        let rows: Vec<&[f64]> = data.iter().map(|p| p.features.as_slice()).collect();
        let scaler = FeatureScaler::fit(&rows);
        let training_data = data
            .iter()
            .map(|p| TrainingDataPoint::new(scaler.transform(&p.features), p.class_name.clone()))
            .collect();
        let classes: BTreeSet<String> = data.iter().map(|p| p.class_name.clone()).collect();

        Ok(ClassifierModel {
            training_data,
            scaler,
            k,
            classes: classes.into_iter().collect(),
        })
    }

    fn publish(&self, model: Option<Arc<ClassifierModel>>) {
        match self.model.write() {
            Ok(mut guard) => *guard = model,
            Err(poisoned) => *poisoned.into_inner() = model,
        }
    }

    fn current(&self) -> Option<Arc<ClassifierModel>> {
        match self.model.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.current().is_some()
    }

    pub fn classes(&self) -> Vec<String> {
        self.current().map(|m| m.classes.clone()).unwrap_or_default()
    }

    /// Back to Untrained.
    pub fn dispose(&self) {
        self.publish(None);
    }

    pub fn predict(&self, features: &[f64]) -> Result<Prediction> {
        let model = self
            .current()
            .ok_or_else(|| ProbeError::state("predict called before the classifier was trained"))?;
        let expected = model.scaler.dimensions();
        if features.len() != expected {
            return Err(ProbeError::DimensionMismatch {
                expected,
                actual: features.len(),
            });
        }
        if let Some(index) = features.iter().position(|v| !v.is_finite()) {
            return Err(ProbeError::input(format!(
                "query feature {} ({}) is not finite",
                FEATURE_NAMES.get(index).copied().unwrap_or("?"),
                features[index]
            )));
        }

        let query = model.scaler.transform(features);
        let mut ranked: Vec<(usize, f64)> = model
            .training_data
            .iter()
            .enumerate()
            .map(|(index, point)| (index, euclidean(&query, &point.features)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(model.k);

        let mut tallies: BTreeMap<&str, f64> = model.classes.iter().map(|c| (c.as_str(), 0.0)).collect();
        let mut neighbors = Vec::with_capacity(ranked.len());
        for (index, distance) in &ranked {
            let class_name = model.training_data[*index].class_name.as_str();
            *tallies.entry(class_name).or_insert(0.0) += 1.0 / (distance + DISTANCE_EPSILON);
            neighbors.push(Neighbor {
                class_name: class_name.to_string(),
                distance: *distance,
            });
        }

        let total: f64 = tallies.values().sum();
        // BTreeMap iterates in lexical order; strict `>` keeps the first of equal tallies.
        let (winner, winning_tally) = tallies
            .iter()
            .fold(None::<(&str, f64)>, |best, (class, tally)| match best {
                Some((_, best_tally)) if *tally <= best_tally => best,
                _ => Some((*class, *tally)),
            })
            .ok_or_else(|| ProbeError::state("model has no classes"))?;

        let mut class_scores: Vec<(String, f64)> = tallies
            .iter()
            .map(|(class, tally)| (class.to_string(), tally / total))
            .collect();
        class_scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        debug!(class = winner, confidence = winning_tally / total, "classifier prediction");
        Ok(Prediction {
            class_name: winner.to_string(),
            confidence: winning_tally / total,
            neighbors,
            class_scores,
        })
    }

    /// Predicts every point of `data` and counts label matches.
    pub fn evaluate(&self, data: &[TrainingDataPoint]) -> Result<Evaluation> {
        let mut correct = 0;
        for point in data {
            if self.predict(&point.features)?.class_name == point.class_name {
                correct += 1;
            }
        }
        let total = data.len();
        Ok(Evaluation {
            total,
            correct,
            accuracy: if total == 0 { 0.0 } else { correct as f64 / total as f64 },
        })
    }

    pub fn export(&self) -> Result<ClassifierModel> {
        self.current()
            .map(|model| (*model).clone())
            .ok_or_else(|| ProbeError::state("export called before the classifier was trained"))
    }

    /// Installs a previously exported model as-is, without re-fitting.
    pub fn import(&self, model: ClassifierModel) -> Result<()> {
        model.validate()?;
        info!(samples = model.training_data.len(), k = model.k, "classifier model imported");
        self.publish(Some(Arc::new(model)));
        Ok(())
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export()?)?)
    }

    pub fn import_json(&self, json: &str) -> Result<()> {
        self.import(serde_json::from_str(json)?)
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
