//! CSS build pipeline
//!
//! Enumerates the top-level stylesheets, runs each through the processor
//! chain and writes `<name>.css` plus `<name>.css.map` to the output
//! directory. A stylesheet that fails to compile is reported and skipped;
//! filesystem failures around it end the run.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use serde::Serialize;
use thiserror::Error;

use super::ast::{Source, Stylesheet};
use super::chain::{ChainError, ProcessContext, ProcessorChain};
use super::error::{CssError, Warning};
use super::parser;
use super::serialize::serialize;
use super::sourcemap::{SourceMap, SourceMapBuilder};
use crate::storage::Config;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Source directory not found: {}", .0.display())]
    MissingSourceDir(PathBuf),

    #[error("Invalid source glob '{glob}': {message}")]
    Glob { glob: String, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of compiling one stylesheet, before anything is written
#[derive(Debug, Clone)]
pub struct CompiledFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub css: String,
    pub map: Option<SourceMap>,
    pub warnings: Vec<Warning>,
}

impl CompiledFile {
    /// `<output>.map`
    pub fn map_path(&self) -> PathBuf {
        let mut name = self.output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".map");
        self.output.with_file_name(name)
    }
}

/// One stylesheet that compiled and was written
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub map: Option<PathBuf>,
    /// False when the output already had identical content
    pub changed: bool,
    pub warnings: Vec<Warning>,
}

/// One stylesheet that failed to compile
#[derive(Debug)]
pub struct FileFailure {
    pub source: PathBuf,
    pub error: CssError,
}

impl FileFailure {
    /// Single-line diagnostic
    pub fn diagnostic(&self) -> String {
        self.error.to_string()
    }
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub files: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
}

impl BuildReport {
    /// Outputs whose content changed in this run
    pub fn changed_outputs(&self) -> Vec<&Path> {
        self.files
            .iter()
            .filter(|f| f.changed)
            .map(|f| f.output.as_path())
            .collect()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.files.iter().flat_map(|f| f.warnings.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct CssPipeline {
    source_dir: PathBuf,
    source_glob: String,
    output_dir: PathBuf,
    source_maps: bool,
    chain: ProcessorChain,
}

impl CssPipeline {
    /// Builds the pipeline and its processor chain for a project; relative
    /// directories resolve against the project root
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        let css = &config.theme.css;
        Ok(Self {
            source_dir: config.source_dir(),
            source_glob: css.source_glob.clone(),
            output_dir: config.output_dir(),
            source_maps: css.source_maps,
            chain: ProcessorChain::standard(&css.chain_options())?,
        })
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Top-level stylesheets matching the source glob, sorted
    pub fn sources(&self) -> Result<Vec<PathBuf>, PipelineError> {
        if !self.source_dir.is_dir() {
            return Err(PipelineError::MissingSourceDir(self.source_dir.clone()));
        }

        let pattern = format!(
            "{}/{}",
            Pattern::escape(&self.source_dir.to_string_lossy()),
            self.source_glob
        );
        let paths = glob::glob(&pattern).map_err(|e| PipelineError::Glob {
            glob: self.source_glob.clone(),
            message: e.to_string(),
        })?;

        let mut sources: Vec<PathBuf> = paths.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        sources.sort();
        Ok(sources)
    }

    /// True when `path` is one of the compiled sources or could be imported
    /// by one (any `.css` file under the source directory)
    pub fn is_relevant(&self, path: &Path) -> bool {
        path.starts_with(&self.source_dir)
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
            && !path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'))
    }

    /// Compiles one stylesheet from its content
    pub fn compile(&self, path: &Path, content: String) -> Result<CompiledFile, CssError> {
        let nodes = parser::parse(&content, 0, path)?;
        let mut sheet = Stylesheet {
            sources: vec![Source {
                path: path.to_path_buf(),
                content,
            }],
            nodes,
            ..Default::default()
        };

        let mut ctx = ProcessContext::new();
        self.chain.run(&mut sheet, &mut ctx)?;

        let serialized = serialize(&sheet);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "style.css".to_string());
        let output = self.output_dir.join(&name);

        let mut css = serialized.css;
        let map = if self.source_maps {
            let mut builder = SourceMapBuilder::new();
            for source in &sheet.sources {
                let relative = relative_path(&source.path, &self.output_dir);
                builder.add_source(to_url(&relative), Some(source.content.clone()));
            }
            for mapping in serialized.mappings {
                builder.add_mapping(mapping);
            }

            if !css.is_empty() && !css.ends_with('\n') {
                css.push('\n');
            }
            css.push_str(&format!("/*# sourceMappingURL={}.map */\n", name));
            Some(builder.build(name))
        } else {
            None
        };

        Ok(CompiledFile {
            source: path.to_path_buf(),
            output,
            css,
            map,
            warnings: ctx.warnings,
        })
    }

    /// Compiles every source and writes the results
    pub fn run(&self) -> Result<BuildReport, PipelineError> {
        let sources = self.sources()?;
        let mut report = BuildReport::default();

        fs::create_dir_all(&self.output_dir).map_err(|source| PipelineError::Write {
            path: self.output_dir.clone(),
            source,
        })?;

        for path in sources {
            let content = fs::read_to_string(&path).map_err(|source| PipelineError::Read {
                path: path.clone(),
                source,
            })?;

            match self.compile(&path, content) {
                Ok(compiled) => report.files.push(self.write(compiled)?),
                Err(error) => report.failures.push(FileFailure { source: path, error }),
            }
        }

        Ok(report)
    }

    fn write(&self, compiled: CompiledFile) -> Result<FileReport, PipelineError> {
        let mut changed = write_if_changed(&compiled.output, compiled.css.as_bytes())?;

        let map = match &compiled.map {
            Some(map) => {
                let map_path = compiled.map_path();
                changed |= write_if_changed(&map_path, map.to_json().as_bytes())?;
                Some(map_path)
            }
            None => None,
        };

        Ok(FileReport {
            source: compiled.source,
            output: compiled.output,
            map,
            changed,
            warnings: compiled.warnings,
        })
    }
}

/// Writes `content` unless the file already holds the same bytes
fn write_if_changed(path: &Path, content: &[u8]) -> Result<bool, PipelineError> {
    if let Ok(existing) = fs::read(path) {
        if blake3::hash(&existing) == blake3::hash(content) {
            return Ok(false);
        }
    }

    fs::write(path, content).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Folds `.` and `..` components without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` relative to the directory `base`
fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let path = normalize(path);
    let base = normalize(base);

    let common = path
        .components()
        .zip(base.components())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in base.components().skip(common) {
        out.push("..");
    }
    for component in path.components().skip(common) {
        out.push(component.as_os_str());
    }
    out
}

fn to_url(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CssConfig, GlobalConfig, ThemeConfig};
    use tempfile::TempDir;

    fn project_config(root: &Path, css: CssConfig) -> Config {
        Config {
            theme: ThemeConfig {
                css,
                ..ThemeConfig::default()
            },
            global: GlobalConfig::default(),
            project_root: root.to_path_buf(),
        }
    }

    fn setup(files: &[(&str, &str)]) -> (TempDir, CssPipeline) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join("assets/css").join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let pipeline = CssPipeline::new(&project_config(dir.path(), CssConfig::default())).unwrap();
        (dir, pipeline)
    }

    #[test]
    fn relative_paths() {
        assert_eq!(
            relative_path(Path::new("/p/assets/css/screen.css"), Path::new("/p/assets/built")),
            PathBuf::from("../css/screen.css")
        );
        assert_eq!(
            relative_path(Path::new("/p/assets/css/../vendor/x.css"), Path::new("/p/assets/built")),
            PathBuf::from("../vendor/x.css")
        );
    }

    #[test]
    fn sources_are_top_level_css_only() {
        let (_dir, pipeline) = setup(&[
            ("screen.css", "a { b: c }"),
            ("amp.css", "a { b: c }"),
            ("parts/nav.css", "a { b: c }"),
            ("notes.txt", "x"),
        ]);
        let names: Vec<String> = pipeline
            .sources()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["amp.css", "screen.css"]);
    }

    #[test]
    fn missing_source_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = CssPipeline::new(&project_config(dir.path(), CssConfig::default())).unwrap();
        assert!(matches!(pipeline.run(), Err(PipelineError::MissingSourceDir(_))));
    }

    #[test]
    fn compiles_through_the_full_chain() {
        let (dir, pipeline) = setup(&[
            (
                "screen.css",
                "@import \"parts/vars.css\";\n/* layout */\n.btn {\n  color: color(var(--brand) a(50%));\n  appearance: none;\n  margin: 0px;\n}\n",
            ),
            ("parts/vars.css", ":root { --brand: #ff0000; }\n"),
        ]);

        let report = pipeline.run().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.files.len(), 1);

        let css = fs::read_to_string(dir.path().join("assets/built/screen.css")).unwrap();
        assert_eq!(
            css,
            ".btn{color:rgba(255,0,0,.5);-webkit-appearance:none;-moz-appearance:none;appearance:none;margin:0}\n/*# sourceMappingURL=screen.css.map */\n"
        );
    }

    #[test]
    fn source_map_points_into_original_files() {
        let (dir, pipeline) = setup(&[
            ("screen.css", "@import 'parts/base.css';\n\n.main {\n  color: red;\n}\n"),
            ("parts/base.css", "body {\n  margin: 0;\n}\n"),
        ]);
        pipeline.run().unwrap();

        let json = fs::read_to_string(dir.path().join("assets/built/screen.css.map")).unwrap();
        let map = SourceMap::from_json(&json).unwrap();
        assert_eq!(map.file, "screen.css");
        assert_eq!(map.sources, vec!["../css/screen.css", "../css/parts/base.css"]);
        assert_eq!(map.sources_content[1].as_deref(), Some("body {\n  margin: 0;\n}\n"));

        // body{margin:0}.main{color:red}
        assert_eq!(map.lookup(0, 0), Some(("../css/parts/base.css", 0, 0)));
        assert_eq!(map.lookup(0, 5), Some(("../css/parts/base.css", 1, 2)));
        assert_eq!(map.lookup(0, 14), Some(("../css/screen.css", 2, 0)));
        assert_eq!(map.lookup(0, 20), Some(("../css/screen.css", 3, 2)));

        for mapping in map.decode().unwrap() {
            assert!((mapping.source as usize) < map.sources.len());
        }
    }

    #[test]
    fn broken_file_is_reported_and_others_continue() {
        let (dir, pipeline) = setup(&[
            ("a.css", "a { color: red;\n"),
            ("b.css", "b { color: blue }"),
        ]);

        let report = pipeline.run().unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.files.len(), 1);
        assert!(report.failures[0].diagnostic().contains("a.css:1:3: Unclosed block"));
        assert!(!dir.path().join("assets/built/a.css").exists());
        assert!(dir.path().join("assets/built/b.css").exists());
    }

    #[test]
    fn unchanged_output_is_not_rewritten() {
        let (dir, pipeline) = setup(&[("screen.css", "a { color: red }")]);

        assert!(pipeline.run().unwrap().files[0].changed);
        let second = pipeline.run().unwrap();
        assert!(!second.files[0].changed);
        assert!(second.changed_outputs().is_empty());

        fs::write(dir.path().join("assets/css/screen.css"), "a { color: blue }").unwrap();
        assert!(pipeline.run().unwrap().files[0].changed);
    }

    #[test]
    fn maps_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("assets/css")).unwrap();
        fs::write(dir.path().join("assets/css/screen.css"), "a { color: red }").unwrap();

        let config = CssConfig {
            source_maps: false,
            minify: false,
            ..CssConfig::default()
        };
        let pipeline = CssPipeline::new(&project_config(dir.path(), config)).unwrap();
        let report = pipeline.run().unwrap();

        assert!(report.files[0].map.is_none());
        let css = fs::read_to_string(dir.path().join("assets/built/screen.css")).unwrap();
        assert_eq!(css, "a {\n  color: red;\n}\n");
    }

    #[test]
    fn warnings_are_collected_per_file() {
        let (_dir, pipeline) = setup(&[("screen.css", "a { color: var(--nope) }")]);
        let report = pipeline.run().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn relevant_paths() {
        let (dir, pipeline) = setup(&[("screen.css", "")]);
        let css = dir.path().join("assets/css");
        assert!(pipeline.is_relevant(&css.join("parts/nav.css")));
        assert!(!pipeline.is_relevant(&css.join("screen.css.swp")));
        assert!(!pipeline.is_relevant(&css.join(".#screen.css")));
        assert!(!pipeline.is_relevant(&dir.path().join("assets/built/screen.css")));
    }
}
