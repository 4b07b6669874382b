use crate::error::{Result, TaggerError};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const MODEL_ROOT: &str = "models";
pub const MODEL_EXTENSION: &str = "onnx";
pub const TAGS_EXTENSION: &str = "csv";

/// The `<name>.onnx` / `<name>.csv` pair of a tagging model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    dir: PathBuf,
    name: String,
}

impl ModelFiles {
    pub fn new<P: AsRef<Path>>(dir: P, name: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_file_name(&self) -> String {
        format!("{}.{}", self.name, MODEL_EXTENSION)
    }

    pub fn tags_file_name(&self) -> String {
        format!("{}.{}", self.name, TAGS_EXTENSION)
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(self.model_file_name())
    }

    pub fn tags_path(&self) -> PathBuf {
        self.dir.join(self.tags_file_name())
    }

    /// Checks that the model file exists and is not empty.
    pub fn check_model(&self) -> Result<PathBuf> {
        let path = self.model_path();
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TaggerError::NotFound(path))
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.len() == 0 {
            return Err(TaggerError::CorruptResource {
                path,
                reason: "model file is empty".to_string(),
            });
        }
        Ok(path)
    }
}

/// Names of the models in `dir` that have both an `.onnx` and a `.csv` file.
pub fn available_models<P: AsRef<Path>>(dir: P) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(TaggerError::NotFound(dir.to_path_buf()));
    }
    let mut models = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some(MODEL_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if ModelFiles::new(dir, stem).tags_path().is_file() {
                models.push(stem.to_string());
            }
        }
    }
    models.sort();
    Ok(models)
}

/// Creates the model directory if it is missing and returns its absolute path.
pub fn ensure_dir<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        tracing::info!(dir = %dir.display(), "created model directory");
    }
    Ok(fs::canonicalize(dir)?)
}
