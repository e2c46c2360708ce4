//! Multinomial logistic regression.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::error::{ServeError, ServeResult};
use crate::data::domain::{Dataset, N_FEATURES};

use super::domain::{ModelArtifact, ModelName, Predictor, Trainer};

/// One weight row and one intercept per class.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub n_features: usize,
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

impl LogisticRegression {
    pub fn n_classes(&self) -> usize {
        self.intercept.len()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.n_features != N_FEATURES {
            return Err(format!(
                "expected {N_FEATURES} features, artefact declares {}",
                self.n_features
            ));
        }
        if self.coef.is_empty() {
            return Err("no classes".to_string());
        }
        if self.coef.len() != self.intercept.len() {
            return Err(format!(
                "{} coefficient rows but {} intercepts",
                self.coef.len(),
                self.intercept.len()
            ));
        }
        if let Some(row) = self.coef.iter().position(|r| r.len() != self.n_features) {
            return Err(format!("coefficient row {row} has the wrong width"));
        }
        Ok(())
    }

    /// Raw per-class scores before softmax.
    pub fn decision_function(&self, x: &[f64]) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(w, b)| w.iter().zip(x).map(|(wi, xi)| wi * xi).sum::<f64>() + b)
            .collect()
    }
}

impl Predictor for LogisticRegression {
    fn kind(&self) -> ModelName {
        ModelName::LogisticRegression
    }

    fn predict_proba(&self, x: &[f64; N_FEATURES]) -> ServeResult<Vec<f64>> {
        Ok(softmax(&self.decision_function(x)))
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp: Vec<f64> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.iter().map(|&x| x / sum).collect()
}

/// Full-batch gradient descent on the L2-regularised cross entropy.
#[derive(Clone, Debug)]
pub struct LogisticTrainer {
    pub max_iter: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for LogisticTrainer {
    fn default() -> Self {
        Self {
            max_iter: 8000,
            learning_rate: 0.02,
            l2: 0.01,
        }
    }
}

impl Trainer for LogisticTrainer {
    fn name(&self) -> ModelName {
        ModelName::LogisticRegression
    }

    fn fit(&self, data: &Dataset) -> ServeResult<ModelArtifact> {
        if data.is_empty() {
            return Err(ServeError::invalid("cannot fit on an empty dataset"));
        }
        let n = data.len() as f64;
        let k = data.n_classes();
        let mut model = LogisticRegression {
            n_features: N_FEATURES,
            coef: vec![vec![0.0; N_FEATURES]; k],
            intercept: vec![0.0; k],
        };

        for iter in 0..self.max_iter {
            let mut grad_w = vec![[0.0; N_FEATURES]; k];
            let mut grad_b = vec![0.0; k];
            let mut loss = 0.0;

            for (x, &y) in data.features.iter().zip(&data.targets) {
                let proba = softmax(&model.decision_function(x));
                loss -= proba[y].max(f64::MIN_POSITIVE).ln();
                for (c, p) in proba.iter().enumerate() {
                    let err = p - if c == y { 1.0 } else { 0.0 };
                    grad_b[c] += err;
                    for (g, xi) in grad_w[c].iter_mut().zip(x) {
                        *g += err * xi;
                    }
                }
            }

            for c in 0..k {
                model.intercept[c] -= self.learning_rate * grad_b[c] / n;
                for (j, w) in model.coef[c].iter_mut().enumerate() {
                    *w -= self.learning_rate * (grad_w[c][j] / n + self.l2 * *w);
                }
            }

            if iter % 1000 == 0 {
                debug!(iter, loss = loss / n, "logistic regression epoch");
            }
        }

        Ok(ModelArtifact::LogisticRegression(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::service::iris;

    fn fitted() -> LogisticRegression {
        match LogisticTrainer::default().fit(&iris().unwrap()).unwrap() {
            ModelArtifact::LogisticRegression(m) => m,
            other => panic!("unexpected artefact {:?}", other.kind()),
        }
    }

    #[test]
    fn softmax_is_a_distribution() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn classic_setosa_sample_is_setosa() {
        let model = fitted();
        model.validate().unwrap();
        assert_eq!(model.predict(&[5.1, 3.5, 1.4, 0.2]).unwrap(), 0);
    }

    #[test]
    fn separates_the_three_species_on_archetypes() {
        let model = fitted();
        assert_eq!(model.predict(&[5.9, 2.8, 4.3, 1.3]).unwrap(), 1);
        assert_eq!(model.predict(&[7.2, 3.6, 6.1, 2.5]).unwrap(), 2);
    }

    #[test]
    fn validation_catches_shape_mismatches() {
        let mut model = fitted();
        model.intercept.pop();
        assert!(model.validate().is_err());

        let mut model = fitted();
        model.coef[1].push(0.0);
        assert!(model.validate().is_err());

        let mut model = fitted();
        model.n_features = 3;
        assert!(model.validate().is_err());
    }
}
