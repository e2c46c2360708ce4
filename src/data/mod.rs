//! Data domain: request features, species labels and training datasets.

pub mod domain;
pub mod service;

pub use domain::{Dataset, FeatureVector, Species, N_FEATURES};
