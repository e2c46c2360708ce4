//! Inference domain: the model store, single predictions and the background
//! prediction logger.

pub mod domain;
pub mod service;
pub mod workers;

pub use domain::{ModelStore, PredictionRecord, PredictionResponse};
pub use workers::{LoggerHandle, LoggerStats, PredictionLogger};
