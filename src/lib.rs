// lib.rs - iris classifier service
pub mod common;
pub mod data;
pub mod training;
pub mod inference;
pub mod evaluation;
pub mod api;

pub use common::{AppCfg, ErrorCode, ServeError, ServeResult};
pub use inference::{ModelStore, PredictionLogger, PredictionRecord};
pub use training::ModelName;
