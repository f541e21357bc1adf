use std::{
    fs,
    path::{Path, PathBuf},
};

use super::ridge::FittedModel;
use crate::error::{ForecastError, ForecastResult};

/// Persisted model plus the separately stored training feature list.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    /// Fitted model.
    pub model: FittedModel,
    /// Feature names in training order.
    pub feature_names: Vec<String>,
}

impl ModelArtifact {
    /// Pairs a model with its own feature list.
    #[must_use]
    pub fn from_model(model: FittedModel) -> Self {
        let feature_names = model.feature_names();
        Self {
            model,
            feature_names,
        }
    }

    /// Writes both files; each is written to a sibling temp file and renamed
    /// into place so a failed write leaves the previous artifact intact.
    pub fn save(&self, model_path: &Path, feature_names_path: &Path) -> ForecastResult<()> {
        self.verify()?;
        write_json_atomic(model_path, &serde_json::to_vec_pretty(&self.model)?)?;
        write_json_atomic(
            feature_names_path,
            &serde_json::to_vec_pretty(&self.feature_names)?,
        )?;
        Ok(())
    }

    /// Loads both files and checks that they describe the same schema.
    pub fn load(model_path: &Path, feature_names_path: &Path) -> ForecastResult<Self> {
        let model: FittedModel = serde_json::from_slice(&fs::read(model_path)?)?;
        let feature_names: Vec<String> = serde_json::from_slice(&fs::read(feature_names_path)?)?;
        let artifact = Self {
            model,
            feature_names,
        };
        artifact.verify()?;
        Ok(artifact)
    }

    fn verify(&self) -> ForecastResult<()> {
        let trained = self.model.feature_names();
        if trained.len() != self.feature_names.len() {
            return Err(ForecastError::ArtifactMismatch(format!(
                "model has {} coefficients, feature list has {} names",
                trained.len(),
                self.feature_names.len()
            )));
        }
        let mismatch = self.model.schema().diff_ordered(&self.feature_names);
        if !mismatch.is_empty() {
            return Err(ForecastError::ArtifactMismatch(mismatch.to_string()));
        }
        Ok(())
    }
}

fn write_json_atomic(path: &Path, bytes: &[u8]) -> ForecastResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let staging = staging_path(path);
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path)?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
