//! Configuration handling for themekit
//!
//! Configuration is stored in `themekit.toml` at the project root (project)
//! and `~/.config/themekit/config.toml` (global). Every section is optional;
//! missing values fall back to the defaults below.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::OutputFormat;
use crate::css::ChainOptions;

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "themekit.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// CSS pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CssConfig {
    /// Directory holding the top-level stylesheets
    pub source_dir: PathBuf,

    /// Glob of compiled files inside `source_dir`
    pub source_glob: String,

    /// Where compiled CSS and maps are written
    pub output_dir: PathBuf,

    /// Browser queries for vendor prefixing
    pub browsers: Vec<String>,

    /// Write `<name>.css.map` next to each output
    pub source_maps: bool,

    pub minify: bool,
}

impl Default for CssConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("assets/css"),
            source_glob: "*.css".to_string(),
            output_dir: PathBuf::from("assets/built"),
            browsers: vec!["last 2 versions".to_string()],
            source_maps: true,
            minify: true,
        }
    }
}

impl CssConfig {
    pub fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            browsers: self.browsers.clone(),
            minify: self.minify,
        }
    }
}

/// Packaging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PackageConfig {
    pub dist_dir: PathBuf,

    /// Glob patterns excluded from the archive, matched against paths
    /// relative to the project root and each of their ancestors
    pub exclude: Vec<String>,

    /// Manifest file providing the archive name
    pub manifest: PathBuf,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            dist_dir: PathBuf::from("dist"),
            exclude: vec!["node_modules".to_string(), "dist".to_string()],
            manifest: PathBuf::from("package.json"),
        }
    }
}

/// Live-reload server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReloadConfig {
    /// Port to listen on; 0 picks a free port
    pub port: u16,

    pub enabled: bool,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            port: 1234,
            enabled: true,
        }
    }
}

/// File watcher settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Debounce window in milliseconds
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 200 }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Project-level configuration (`themekit.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ThemeConfig {
    pub css: CssConfig,
    pub package: PackageConfig,
    pub reload: ReloadConfig,
    pub watch: WatchConfig,
}

impl ThemeConfig {
    /// Parses and validates a `themekit.toml` document
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ThemeConfig = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.css.source_glob.trim().is_empty() {
            return Err(ConfigError::Invalid("css.source_glob must not be empty".to_string()));
        }
        if let Err(e) = glob::Pattern::new(&self.css.source_glob) {
            return Err(ConfigError::Invalid(format!("css.source_glob: {}", e)));
        }
        for pattern in &self.package.exclude {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::Invalid(format!("package.exclude '{}': {}", pattern, e)));
            }
        }
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::Invalid("watch.debounce_ms must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Loads `themekit.toml` from a project root, defaults when absent
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to load {}", config_path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,

    /// Ring the terminal bell when a stylesheet fails to compile
    pub beep: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_format: OutputFormat::Text,
            beep: true,
        }
    }
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub theme: ThemeConfig,
    pub global: GlobalConfig,
    pub project_root: PathBuf,
}

impl Config {
    /// Loads both layers for a project root
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let theme = ThemeConfig::load(project_root)?;

        Ok(Self {
            theme,
            global,
            project_root: project_root.to_path_buf(),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "themekit", "themekit").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    pub fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Resolves a configured path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.resolve(&self.theme.css.source_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.theme.css.output_dir)
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.resolve(&self.theme.package.dist_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.theme.package.manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = ThemeConfig::default();

        assert_eq!(config.css.source_dir, PathBuf::from("assets/css"));
        assert_eq!(config.css.source_glob, "*.css");
        assert_eq!(config.css.output_dir, PathBuf::from("assets/built"));
        assert_eq!(config.css.browsers, vec!["last 2 versions"]);
        assert_eq!(config.package.exclude, vec!["node_modules", "dist"]);
        assert_eq!(config.reload.port, 1234);
        assert_eq!(config.watch.debounce(), Duration::from_millis(200));
        assert!(GlobalConfig::default().beep);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[css]
output_dir = "public/css"
minify = false

[reload]
port = 35729
"#;

        let config = ThemeConfig::parse(toml).unwrap();
        assert_eq!(config.css.output_dir, PathBuf::from("public/css"));
        assert!(!config.css.minify);
        assert_eq!(config.css.source_dir, PathBuf::from("assets/css"));
        assert_eq!(config.reload.port, 35729);
        assert!(config.reload.enabled);
        assert_eq!(config.package, PackageConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ThemeConfig::parse("[css]\nsource = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = ThemeConfig::parse("[deploy]\nhost = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(ThemeConfig::parse("[reload]\nport = \"high\"\n"), Err(ConfigError::Parse(_))));
        assert!(matches!(ThemeConfig::parse("[watch]\ndebounce_ms = 0\n"), Err(ConfigError::Invalid(_))));
        assert!(matches!(ThemeConfig::parse("[css]\nsource_glob = \"[\"\n"), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn parse_global_config() {
        let toml = r#"
default_format = "json"
beep = false
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
        assert!(!config.beep);
    }

    #[test]
    fn toml_round_trip_keeps_values() {
        let mut config = ThemeConfig::default();
        config.css.browsers = vec!["defaults".into(), "not dead".into()];
        let text = config.to_toml().unwrap();
        assert!(text.contains("[css]"));
        assert_eq!(ThemeConfig::parse(&text).unwrap(), config);
    }

    #[test]
    fn load_from_project_root() {
        let dir = TempDir::new().unwrap();
        assert_eq!(ThemeConfig::load(dir.path()).unwrap(), ThemeConfig::default());

        fs::write(dir.path().join(CONFIG_FILE), "[package]\ndist_dir = \"out\"\n").unwrap();
        let config = ThemeConfig::load(dir.path()).unwrap();
        assert_eq!(config.package.dist_dir, PathBuf::from("out"));

        fs::write(dir.path().join(CONFIG_FILE), "not toml [").unwrap();
        let err = ThemeConfig::load(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse configuration"));
    }

    #[test]
    fn paths_resolve_against_root() {
        let config = Config {
            theme: ThemeConfig::default(),
            global: GlobalConfig::default(),
            project_root: PathBuf::from("/srv/theme"),
        };
        assert_eq!(config.source_dir(), PathBuf::from("/srv/theme/assets/css"));
        assert_eq!(config.dist_dir(), PathBuf::from("/srv/theme/dist"));
        assert_eq!(config.resolve(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
