//! Training domain: classifier artefacts, trainers and their persistence.

pub mod domain;
pub mod forest;
pub mod logistic;
pub mod repo_fs;
pub mod service;

pub use domain::{ModelArtifact, ModelName, ModelRepo, Predictor, Trainer};
pub use forest::{ForestTrainer, RandomForest};
pub use logistic::{LogisticRegression, LogisticTrainer};
pub use repo_fs::FsModelRepo;
