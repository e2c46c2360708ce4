//! Inference orchestration: validate, predict, label.

use std::time::Instant;

use tracing::debug;

use crate::common::error::ServeResult;
use crate::data::domain::{FeatureVector, Species};
use crate::training::domain::ModelName;

use super::domain::{ModelStore, PredictionRecord};

/// Run one prediction and build the record that should be persisted.
///
/// Validation happens before the model lookup, so a bad request never reaches
/// a classifier.
pub fn predict(
    store: &ModelStore,
    name: ModelName,
    features: &FeatureVector,
) -> ServeResult<PredictionRecord> {
    features.validate()?;

    let start = Instant::now();
    let model = store.get(name)?;
    let index = model.predict(&features.as_array())?;
    let species = Species::from_index(index)?;

    debug!(
        model = %name,
        species = species.as_str(),
        latency_us = start.elapsed().as_micros() as u64,
        "prediction"
    );
    Ok(PredictionRecord::new(*features, species, name))
}
