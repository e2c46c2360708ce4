//! Core data definitions: the request feature vector, species labels and the
//! in-memory training dataset.

use serde::{Deserialize, Serialize};

use crate::common::error::{ServeError, ServeResult};

/// Number of measurements in a feature vector.
pub const N_FEATURES: usize = 4;

/// Inclusive upper bound for each measurement, in field order.
pub const FEATURE_MAX: [f64; N_FEATURES] = [8.0, 4.5, 7.0, 2.5];

/// Wire names for each measurement, in field order.
pub const FEATURE_NAMES: [&str; N_FEATURES] =
    ["sepalLength", "sepalWidth", "petalLength", "petalWidth"];

/// Four flower measurements in centimetres.
///
/// Absent fields take the measurements of the classic setosa sample.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureVector {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            sepal_length: 5.1,
            sepal_width: 3.5,
            petal_length: 1.4,
            petal_width: 0.2,
        }
    }
}

impl FeatureVector {
    pub fn new(sepal_length: f64, sepal_width: f64, petal_length: f64, petal_width: f64) -> Self {
        Self {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
        }
    }

    /// Model input row, in training column order.
    pub fn as_array(&self) -> [f64; N_FEATURES] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }

    /// Check every field lies in `(0, max]`. NaN never passes.
    pub fn validate(&self) -> ServeResult<()> {
        let values = self.as_array();
        let violations: Vec<String> = FEATURE_NAMES
            .iter()
            .zip(values.iter().zip(FEATURE_MAX.iter()))
            .filter(|(_, (value, max))| !(**value > 0.0 && **value <= **max))
            .map(|(name, (value, max))| format!("{name}={value} must be > 0 and <= {max}"))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ServeError::invalid(violations.join("; ")))
        }
    }
}

impl From<[f64; N_FEATURES]> for FeatureVector {
    fn from(row: [f64; N_FEATURES]) -> Self {
        Self::new(row[0], row[1], row[2], row[3])
    }
}

/// Iris species, indexed the way the classifiers were trained.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Setosa,
    Versicolor,
    Virginica,
}

impl Species {
    /// Label table; position is the class index.
    pub const ALL: [Species; 3] = [Species::Setosa, Species::Versicolor, Species::Virginica];

    /// Positional lookup from a classifier's class index.
    pub fn from_index(index: usize) -> ServeResult<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(ServeError::UnknownClass(index))
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Setosa => "setosa",
            Species::Versicolor => "versicolor",
            Species::Virginica => "virginica",
        }
    }

    /// Parse a dataset label, accepting the `Iris-` prefix of the UCI file.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        let label = label.strip_prefix("Iris-").unwrap_or(label);
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str().eq_ignore_ascii_case(label))
    }
}

/// Labelled samples used to fit and score classifiers.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub features: Vec<[f64; N_FEATURES]>,
    pub targets: Vec<usize>,
}

impl Dataset {
    pub fn push(&mut self, row: [f64; N_FEATURES], target: usize) {
        self.features.push(row);
        self.targets.push(target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of distinct classes, assuming labels are dense from zero.
    pub fn n_classes(&self) -> usize {
        self.targets.iter().max().map_or(0, |m| m + 1)
    }
}
