//! Project discovery
//!
//! A project is the nearest directory, starting from the working directory,
//! that holds a manifest (`package.json`) or a `themekit.toml`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;

use super::config::{Config, CONFIG_FILE};
use super::manifest::{Manifest, DEFAULT_MANIFEST};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("No theme project found from {} (looked for package.json or themekit.toml)", .0.display())]
    NotFound(PathBuf),

    #[error("Project root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// A theme project
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens the project rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ProjectError::NotADirectory(root).into());
        }
        let root = root.canonicalize().unwrap_or(root);
        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens an explicit root, or the project around the current directory
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(root) => Self::open(root),
            None => {
                let cwd = std::env::current_dir()?;
                let root = Self::find_root(&cwd).ok_or(ProjectError::NotFound(cwd))?;
                Self::open(root)
            }
        }
    }

    /// Walks up from `start` to the nearest directory with a manifest or
    /// project config
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(DEFAULT_MANIFEST).is_file() || current.join(CONFIG_FILE).is_file() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reads the manifest named in the package settings
    pub fn manifest(&self) -> Result<Manifest> {
        Ok(Manifest::load(&self.config.manifest_path())?)
    }

    /// Returns a relative path from the project root
    pub fn relative_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(|p| p.to_path_buf())
    }
}
