//! Domain types for classifier artefacts and the traits tying them to the
//! rest of the service.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::error::{ServeError, ServeResult};
use crate::data::domain::{Dataset, N_FEATURES};

use super::forest::RandomForest;
use super::logistic::LogisticRegression;

/// Symbolic name of a served model.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelName {
    LogisticRegression,
    RandomForest,
}

impl ModelName {
    pub const ALL: [ModelName; 2] = [ModelName::LogisticRegression, ModelName::RandomForest];

    /// Store key and URL segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::LogisticRegression => "logistic_regression",
            ModelName::RandomForest => "random_forest",
        }
    }

    /// Human readable name written into prediction records.
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelName::LogisticRegression => "logistic regression",
            ModelName::RandomForest => "Random Forest",
        }
    }

    /// File name used by the training command.
    pub fn artefact_file(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ServeError::ModelNotFound(s.to_string()))
    }
}

/// A trained classifier that maps one feature row to a class index.
pub trait Predictor: Send + Sync + fmt::Debug {
    fn kind(&self) -> ModelName;

    /// Class membership scores for a single row.
    fn predict_proba(&self, x: &[f64; N_FEATURES]) -> ServeResult<Vec<f64>>;

    /// Index of the highest scoring class.
    fn predict(&self, x: &[f64; N_FEATURES]) -> ServeResult<usize> {
        let proba = self.predict_proba(x)?;
        if proba.is_empty() || proba.iter().any(|p| !p.is_finite()) {
            return Err(ServeError::Prediction(format!(
                "{} produced non-finite scores",
                self.kind()
            )));
        }
        Ok(argmax(&proba))
    }
}

/// Serialised form of any supported classifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
}

impl ModelArtifact {
    pub fn kind(&self) -> ModelName {
        match self {
            ModelArtifact::LogisticRegression(_) => ModelName::LogisticRegression,
            ModelArtifact::RandomForest(_) => ModelName::RandomForest,
        }
    }

    /// Structural checks performed before an artefact may serve traffic.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ModelArtifact::LogisticRegression(m) => m.validate(),
            ModelArtifact::RandomForest(m) => m.validate(),
        }
    }

    pub fn into_predictor(self) -> Arc<dyn Predictor> {
        match self {
            ModelArtifact::LogisticRegression(m) => Arc::new(m),
            ModelArtifact::RandomForest(m) => Arc::new(m),
        }
    }
}

/// Repository contract for model artefacts.
pub trait ModelRepo {
    fn put_model(&self, path: &Path, artefact: &ModelArtifact) -> ServeResult<()>;
    fn get_model(&self, path: &Path) -> ServeResult<ModelArtifact>;
}

/// Interface for components that can fit a classifier.
pub trait Trainer {
    fn name(&self) -> ModelName;
    fn fit(&self, data: &Dataset) -> ServeResult<ModelArtifact>;
}

/// Index of the largest value; the first one wins ties.
pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best_i, best_v)
            }
        })
        .0
}
