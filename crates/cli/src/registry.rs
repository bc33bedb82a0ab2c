//! File-based processor registry
//!
//! Pipeline definitions live in a directory as `<processor>.json`.

use advisor_lib::{AdvisorError, ErrorReport, Pipeline};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no pipeline definition for '{name}' in {}", .dir.display())]
    NotFound { name: String, dir: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Invalid(#[from] AdvisorError),
}

impl RegistryError {
    pub fn report(&self) -> ErrorReport {
        match self {
            Self::Invalid(err) => err.report(),
            Self::NotFound { name, dir } => ErrorReport::new("NotFound", self.to_string())
                .with_remediation(format!(
                    "add {}/{}.json or pass --file",
                    dir.display(),
                    name
                )),
            Self::Io { .. } => ErrorReport::new("Io", self.to_string()),
        }
    }
}

pub struct PipelineRegistry {
    dir: PathBuf,
}

impl PipelineRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the definition registered for a processor
    ///
    /// A definition without its own `name` takes the processor name.
    pub fn load(&self, name: &str) -> Result<Pipeline, RegistryError> {
        let path = self.dir.join(format!("{}.json", name));
        if !path.is_file() {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
                dir: self.dir.clone(),
            });
        }
        let pipeline = load_file(&path)?;
        Ok(match pipeline.name() {
            Some(_) => pipeline,
            None => pipeline.with_name(name),
        })
    }
}

/// Load a pipeline definition from an explicit path
pub fn load_file(path: &Path) -> Result<Pipeline, RegistryError> {
    debug!(path = %path.display(), "Loading pipeline definition");
    let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Pipeline::parse(&text)?)
}
