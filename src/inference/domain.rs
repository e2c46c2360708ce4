//! Domain definitions for serving: the model store and prediction records.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::common::config::{AppCfg, ENV_LR, ENV_RF};
use crate::common::error::{ServeError, ServeResult};
use crate::data::domain::{FeatureVector, Species};
use crate::training::domain::{ModelName, ModelRepo, Predictor};

/// Loaded classifiers keyed by name.
///
/// Built once at startup and shared read-only with the request handlers.
#[derive(Clone, Debug, Default)]
pub struct ModelStore {
    models: BTreeMap<ModelName, Arc<dyn Predictor>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one artefact and check it is the kind of model `name` expects.
    pub fn load(
        repo: &dyn ModelRepo,
        name: ModelName,
        path: &Path,
    ) -> ServeResult<Arc<dyn Predictor>> {
        let artefact = repo.get_model(path)?;
        if artefact.kind() != name {
            return Err(ServeError::model_load(
                path.display().to_string(),
                format!("artefact holds a {} model, expected {name}", artefact.kind()),
            ));
        }
        Ok(artefact.into_predictor())
    }

    /// Load every configured model. Failures are logged and leave the entry
    /// absent so the service can still start.
    pub fn from_config(cfg: &AppCfg, repo: &dyn ModelRepo) -> Self {
        let mut store = Self::new();
        let sources = [
            (ModelName::LogisticRegression, ENV_LR, cfg.lr_path.as_deref()),
            (ModelName::RandomForest, ENV_RF, cfg.rf_path.as_deref()),
        ];

        for (name, env_key, path) in sources {
            let Some(path) = path else {
                error!(model = %name, "no artefact path configured, set {env_key}");
                continue;
            };
            match Self::load(repo, name, path) {
                Ok(predictor) => {
                    info!(model = %name, path = %path.display(), "model loaded");
                    store.insert(name, predictor);
                }
                Err(err) => error!(model = %name, error = %err, "model failed to load"),
            }
        }
        store
    }

    pub fn insert(&mut self, name: ModelName, predictor: Arc<dyn Predictor>) {
        self.models.insert(name, predictor);
    }

    pub fn get(&self, name: ModelName) -> ServeResult<Arc<dyn Predictor>> {
        self.models
            .get(&name)
            .cloned()
            .ok_or_else(|| ServeError::ModelNotFound(name.to_string()))
    }

    /// Loaded model names in stable order.
    pub fn names(&self) -> Vec<ModelName> {
        self.models.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn clear(&mut self) {
        self.models.clear();
    }
}

/// One persisted prediction: the inputs, the label and the model used.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(flatten)]
    pub features: FeatureVector,
    pub species: Species,
    /// Display name of the model, e.g. `"Random Forest"`.
    pub model: String,
}

impl PredictionRecord {
    pub fn new(features: FeatureVector, species: Species, model: ModelName) -> Self {
        Self {
            features,
            species,
            model: model.display_name().to_string(),
        }
    }
}

/// Body returned by the predict endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Species,
}
