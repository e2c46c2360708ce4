//! Filesystem repository for trained model artefacts.

use std::fs::{self, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::error::{ServeError, ServeResult};

use super::domain::{ModelArtifact, ModelRepo};

/// Persist artefacts as pretty JSON documents on the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsModelRepo;

impl FsModelRepo {
    pub fn new() -> Self {
        Self
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl ModelRepo for FsModelRepo {
    fn put_model(&self, path: &Path, artefact: &ModelArtifact) -> ServeResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let staging = Self::staging_path(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&staging)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, artefact)?;
        writer.flush()?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    /// Read, decode and validate an artefact. Every failure is a `ModelLoad`.
    fn get_model(&self, path: &Path) -> ServeResult<ModelArtifact> {
        let shown = path.display().to_string();
        let file = fs::File::open(path).map_err(|e| ServeError::model_load(&shown, e))?;
        let artefact: ModelArtifact = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ServeError::model_load(&shown, e))?;
        artefact
            .validate()
            .map_err(|e| ServeError::model_load(&shown, e))?;
        Ok(artefact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::domain::ModelName;
    use crate::training::logistic::LogisticRegression;

    fn tiny_lr() -> ModelArtifact {
        ModelArtifact::LogisticRegression(LogisticRegression {
            n_features: 4,
            coef: vec![vec![0.0, 0.0, -1.0, 0.0], vec![0.0, 0.0, 1.0, 0.0]],
            intercept: vec![2.5, -2.5],
        })
    }

    #[test]
    fn put_then_get_preserves_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lr.json");
        let repo = FsModelRepo::new();

        repo.put_model(&path, &tiny_lr()).unwrap();
        assert!(!FsModelRepo::staging_path(&path).exists());

        let loaded = repo.get_model(&path).unwrap();
        assert_eq!(loaded.kind(), ModelName::LogisticRegression);
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsModelRepo::new()
            .get_model(&dir.path().join("absent.json"))
            .unwrap_err();
        assert!(matches!(err, ServeError::ModelLoad { .. }), "{err}");
    }

    #[test]
    fn garbage_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pkl");
        fs::write(&path, b"\x80\x04\x95 not json").unwrap();
        let err = FsModelRepo::new().get_model(&path).unwrap_err();
        assert!(matches!(err, ServeError::ModelLoad { .. }), "{err}");
    }

    #[test]
    fn structurally_invalid_artefact_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lr.json");
        fs::write(
            &path,
            r#"{"kind":"logistic_regression","n_features":4,"coef":[[1,2]],"intercept":[0]}"#,
        )
        .unwrap();
        let err = FsModelRepo::new().get_model(&path).unwrap_err();
        assert!(err.to_string().contains("wrong width"), "{err}");
    }
}
