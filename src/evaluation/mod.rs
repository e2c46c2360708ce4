//! Evaluation of trained classifiers on labelled data.

pub mod domain;
pub mod service;

pub use domain::EvalSuite;
