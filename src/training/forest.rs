//! Random forest of CART trees with Gini splits.
//!
//! Trees are stored as flat node arrays in pre-order, so a child index is
//! always greater than its parent's. Loading relies on that to rule out
//! cycles.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::error::{ServeError, ServeResult};
use crate::data::domain::{Dataset, N_FEATURES};

use super::domain::{ModelArtifact, ModelName, Predictor, Trainer};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Samples with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        proba: Vec<f64>,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {i} splits on unknown feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {i} has a non-finite threshold"));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= len {
                            return Err(format!("node {i} has out-of-order child {child}"));
                        }
                    }
                }
                Node::Leaf { proba } => {
                    if proba.len() != n_classes {
                        return Err(format!(
                            "leaf {i} has {} classes, expected {n_classes}",
                            proba.len()
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf(&self, x: &[f64]) -> ServeResult<&[f64]> {
        let mut idx = 0;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(Node::Leaf { proba }) => return Ok(proba.as_slice()),
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if x[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => break,
            }
        }
        Err(ServeError::Prediction(format!(
            "tree walk escaped at node {idx}"
        )))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub n_classes: usize,
    pub trees: Vec<Tree>,
}

impl RandomForest {
    pub fn validate(&self) -> Result<(), String> {
        if self.n_features != N_FEATURES {
            return Err(format!(
                "expected {N_FEATURES} features, artefact declares {}",
                self.n_features
            ));
        }
        if self.n_classes == 0 {
            return Err("no classes".to_string());
        }
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes)
                .map_err(|e| format!("tree {t}: {e}"))?;
        }
        Ok(())
    }
}

impl Predictor for RandomForest {
    fn kind(&self) -> ModelName {
        ModelName::RandomForest
    }

    /// Mean of the leaf distributions across trees.
    fn predict_proba(&self, x: &[f64; N_FEATURES]) -> ServeResult<Vec<f64>> {
        let mut acc = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (a, p) in acc.iter_mut().zip(tree.leaf(x)?) {
                *a += p;
            }
        }
        let n = self.trees.len() as f64;
        Ok(acc.into_iter().map(|a| a / n).collect())
    }
}

/// Bootstrap-aggregated CART trainer.
#[derive(Clone, Debug)]
pub struct ForestTrainer {
    pub n_trees: usize,
    /// Features considered per split; `None` means `sqrt(n_features)`.
    pub max_features: Option<usize>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestTrainer {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_features: None,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
}

impl ForestTrainer {
    fn features_per_split(&self) -> usize {
        self.max_features
            .unwrap_or_else(|| (N_FEATURES as f64).sqrt().round() as usize)
            .clamp(1, N_FEATURES)
    }

    fn grow(&self, data: &Dataset, samples: &[usize], n_classes: usize, rng: &mut StdRng) -> Tree {
        let mut tree = Tree::default();
        self.grow_node(data, samples, n_classes, 0, rng, &mut tree.nodes);
        tree
    }

    fn grow_node(
        &self,
        data: &Dataset,
        samples: &[usize],
        n_classes: usize,
        depth: usize,
        rng: &mut StdRng,
        nodes: &mut Vec<Node>,
    ) -> usize {
        let counts = class_counts(data, samples, n_classes);
        let id = nodes.len();
        nodes.push(Node::Leaf {
            proba: counts
                .iter()
                .map(|c| *c as f64 / samples.len() as f64)
                .collect(),
        });

        let pure = counts.iter().filter(|c| **c > 0).count() <= 1;
        let too_deep = self.max_depth.is_some_and(|d| depth >= d);
        if pure || too_deep || samples.len() < self.min_samples_split {
            return id;
        }

        let mut features: Vec<usize> = (0..N_FEATURES).collect();
        features.shuffle(rng);
        let (tried, rest) = features.split_at(self.features_per_split());
        // Fall back to the unsampled features when none of the sampled ones splits.
        let choice = best_split(data, samples, &counts, tried)
            .or_else(|| best_split(data, samples, &counts, rest));
        let Some(choice) = choice else {
            return id;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&s| data.features[s][choice.feature] <= choice.threshold);

        let left_id = self.grow_node(data, &left, n_classes, depth + 1, rng, nodes);
        let right_id = self.grow_node(data, &right, n_classes, depth + 1, rng, nodes);
        nodes[id] = Node::Split {
            feature: choice.feature,
            threshold: choice.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }
}

impl Trainer for ForestTrainer {
    fn name(&self) -> ModelName {
        ModelName::RandomForest
    }

    fn fit(&self, data: &Dataset) -> ServeResult<ModelArtifact> {
        if data.is_empty() {
            return Err(ServeError::invalid("cannot fit on an empty dataset"));
        }
        if self.n_trees == 0 {
            return Err(ServeError::invalid("a forest needs at least one tree"));
        }
        let n = data.len();
        let n_classes = data.n_classes();

        let trees: Vec<Tree> = (0..self.n_trees)
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                self.grow(data, &bootstrap, n_classes, &mut rng)
            })
            .collect();

        debug!(
            trees = trees.len(),
            nodes = trees.iter().map(|t| t.nodes.len()).sum::<usize>(),
            "random forest grown"
        );

        Ok(ModelArtifact::RandomForest(RandomForest {
            n_features: N_FEATURES,
            n_classes,
            trees,
        }))
    }
}

fn class_counts(data: &Dataset, samples: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &s in samples {
        counts[data.targets[s]] += 1;
    }
    counts
}

/// Gini = 1 - Σ p_i²
fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Lowest weighted child impurity over the given features, if it beats the parent.
fn best_split(
    data: &Dataset,
    samples: &[usize],
    counts: &[usize],
    features: &[usize],
) -> Option<SplitChoice> {
    let n = samples.len();
    let mut best_score = gini(counts, n) - 1e-12;
    let mut best = None;

    for &feature in features {
        let mut order = samples.to_vec();
        order.sort_by(|&a, &b| data.features[a][feature].total_cmp(&data.features[b][feature]));

        let mut left = vec![0usize; counts.len()];
        let mut right = counts.to_vec();
        for pos in 0..n - 1 {
            let class = data.targets[order[pos]];
            left[class] += 1;
            right[class] -= 1;

            let here = data.features[order[pos]][feature];
            let next = data.features[order[pos + 1]][feature];
            if next <= here {
                continue;
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            let score = (n_left as f64 * gini(&left, n_left)
                + n_right as f64 * gini(&right, n_right))
                / n as f64;
            if score < best_score {
                best_score = score;
                best = Some(SplitChoice {
                    feature,
                    threshold: (here + next) / 2.0,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::service::iris;

    fn fitted(n_trees: usize) -> RandomForest {
        let trainer = ForestTrainer {
            n_trees,
            ..ForestTrainer::default()
        };
        match trainer.fit(&iris().unwrap()).unwrap() {
            ModelArtifact::RandomForest(m) => m,
            other => panic!("unexpected artefact {:?}", other.kind()),
        }
    }

    fn stump() -> RandomForest {
        RandomForest {
            n_features: N_FEATURES,
            n_classes: 3,
            trees: vec![Tree {
                nodes: vec![
                    Node::Split {
                        feature: 2,
                        threshold: 2.45,
                        left: 1,
                        right: 2,
                    },
                    Node::Leaf {
                        proba: vec![1.0, 0.0, 0.0],
                    },
                    Node::Leaf {
                        proba: vec![0.0, 0.5, 0.5],
                    },
                ],
            }],
        }
    }

    #[test]
    fn gini_of_pure_and_even_sets() {
        assert_eq!(gini(&[4, 0, 0], 4), 0.0);
        assert!((gini(&[1, 1], 2) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn stump_routes_on_threshold() {
        let forest = stump();
        forest.validate().unwrap();
        assert_eq!(forest.predict(&[5.1, 3.5, 2.45, 0.2]).unwrap(), 0);
        // Tie between versicolor and virginica resolves to the lower index.
        assert_eq!(forest.predict(&[6.0, 3.0, 4.5, 1.5]).unwrap(), 1);
    }

    #[test]
    fn fitted_forest_is_valid_and_recognises_setosa() {
        let forest = fitted(10);
        forest.validate().unwrap();
        assert_eq!(forest.trees.len(), 10);
        assert_eq!(forest.predict(&[5.1, 3.5, 1.4, 0.2]).unwrap(), 0);
        assert_eq!(forest.predict(&[7.2, 3.6, 6.1, 2.5]).unwrap(), 2);
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let a = serde_json::to_string(&fitted(5)).unwrap();
        let b = serde_json::to_string(&fitted(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn validation_rejects_backward_children() {
        let mut forest = stump();
        forest.trees[0].nodes[0] = Node::Split {
            feature: 2,
            threshold: 2.45,
            left: 0,
            right: 2,
        };
        assert!(forest.validate().is_err());
    }

    #[test]
    fn validation_rejects_bad_leaves_and_features() {
        let mut forest = stump();
        forest.trees[0].nodes[1] = Node::Leaf { proba: vec![1.0] };
        assert!(forest.validate().is_err());

        let mut forest = stump();
        forest.trees[0].nodes[0] = Node::Split {
            feature: 9,
            threshold: 1.0,
            left: 1,
            right: 2,
        };
        assert!(forest.validate().is_err());

        let mut forest = stump();
        forest.trees.clear();
        assert!(forest.validate().is_err());
    }

    #[test]
    fn zero_trees_is_rejected() {
        let trainer = ForestTrainer {
            n_trees: 0,
            ..ForestTrainer::default()
        };
        assert!(trainer.fit(&iris().unwrap()).is_err());
    }
}
