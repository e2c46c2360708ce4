//! Service layer fitting classifiers and persisting their artefacts.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::common::error::ServeResult;
use crate::data::domain::Dataset;
use crate::evaluation::{service as evaluation, EvalSuite};

use super::domain::{ModelName, ModelRepo, Trainer};
use super::forest::ForestTrainer;
use super::logistic::LogisticTrainer;

/// Outcome of one training run.
#[derive(Clone, Debug)]
pub struct TrainedModel {
    pub name: ModelName,
    pub path: PathBuf,
    pub train_score: EvalSuite,
}

/// Fit one model, score it on its training data and write it to `path`.
pub fn train(
    trainer: &dyn Trainer,
    data: &Dataset,
    repo: &dyn ModelRepo,
    path: &Path,
) -> ServeResult<TrainedModel> {
    let artefact = trainer.fit(data)?;
    let train_score = evaluation::evaluate(artefact.clone().into_predictor().as_ref(), data)?;
    repo.put_model(path, &artefact)?;

    info!(
        model = %trainer.name(),
        path = %path.display(),
        accuracy = train_score.accuracy(),
        "model trained"
    );

    Ok(TrainedModel {
        name: trainer.name(),
        path: path.to_path_buf(),
        train_score,
    })
}

/// Train both served models into `out_dir` under their conventional names.
pub fn train_all(
    data: &Dataset,
    out_dir: &Path,
    logistic: &LogisticTrainer,
    forest: &ForestTrainer,
    repo: &dyn ModelRepo,
) -> ServeResult<Vec<TrainedModel>> {
    let trainers: [&dyn Trainer; 2] = [logistic, forest];
    trainers
        .iter()
        .map(|t| train(*t, data, repo, &out_dir.join(t.name().artefact_file())))
        .collect()
}
