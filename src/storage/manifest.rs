//! Project manifest (`package.json`)
//!
//! Only the `name` field is required; it names the distribution archive.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_MANIFEST: &str = "package.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Manifest {} has no \"name\" field", .0.display())]
    MissingName(PathBuf),

    #[error("Invalid project name '{0}': must be non-empty and contain no path separators")]
    InvalidName(String),
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Deserialize)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let name = raw.name.ok_or_else(|| ManifestError::MissingName(path.to_path_buf()))?;
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
            return Err(ManifestError::InvalidName(name));
        }

        Ok(Self {
            name: trimmed.to_string(),
            version: raw.version,
        })
    }

    /// `<name>.zip`
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.name)
    }
}
