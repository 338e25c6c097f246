//! # Storage Layer
//!
//! Project files themekit reads and writes.
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Project config | TOML | `themekit.toml` |
//! | Global config | TOML | `~/.config/themekit/config.toml` |
//! | Manifest | JSON | `package.json` |
//! | Archive | zip (deflate) | `dist/<name>.zip` |
//!
//! ## Key Types
//!
//! - [`Project`] - Project root discovery and configuration
//! - [`Config`] - Project and global configuration
//! - [`Manifest`] - Project name for the archive
//! - [`FileSet`] - Exclusion-filtered files to package

mod archive;
mod config;
mod manifest;
mod project;

pub use archive::{write_archive, ArchiveError, ArchiveReport, FileSet};
pub use config::{
    Config, ConfigError, CssConfig, GlobalConfig, PackageConfig, ReloadConfig, ThemeConfig, WatchConfig, CONFIG_FILE,
};
pub use manifest::{Manifest, ManifestError, DEFAULT_MANIFEST};
pub use project::{Project, ProjectError};
