//! Domain primitives for model evaluation.

use crate::training::domain::ModelName;

/// Summary of how a model scores against a labelled dataset.
#[derive(Clone, Debug)]
pub struct EvalSuite {
    pub model: ModelName,
    pub samples: usize,
    pub correct: usize,
    /// Rows are true classes, columns predicted classes.
    pub confusion: Vec<Vec<usize>>,
}

impl EvalSuite {
    pub fn accuracy(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.correct as f64 / self.samples as f64
        }
    }
}
