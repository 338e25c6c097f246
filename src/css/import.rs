//! `@import` inlining
//!
//! Replaces local imports with the parsed contents of the imported files,
//! recursively. Supports globs (`@import "components/*.css"`), omitted
//! `.css` extensions and `_partial.css` files. Each file is inlined at most
//! once per compilation, which also breaks import cycles.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;

use super::ast::{AtRule, AtRuleBody, Node, Source, SourceLocation, Stylesheet};
use super::chain::{ProcessContext, Processor, Stage};
use super::error::CssError;
use super::parser;
use super::value::find_function;

#[derive(Debug, Default)]
pub struct ImportInliner;

impl ImportInliner {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for ImportInliner {
    fn name(&self) -> &'static str {
        "import"
    }

    fn stage(&self) -> Stage {
        Stage::Assemble
    }

    fn process(&self, sheet: &mut Stylesheet, _ctx: &mut ProcessContext) -> Result<(), CssError> {
        let mut seen: HashSet<PathBuf> = sheet
            .sources
            .iter()
            .map(|s| canonical(&s.path))
            .collect();

        let nodes = std::mem::take(&mut sheet.nodes);
        sheet.nodes = inline(nodes, &mut sheet.sources, &mut seen, false)?;
        Ok(())
    }
}

/// A parsed `@import` prelude
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTarget {
    pub url: String,
    pub media: String,
}

impl ImportTarget {
    /// Parses `"file.css" media`, `'file'`, `url(file.css) media`
    pub fn parse(prelude: &str) -> Option<Self> {
        let prelude = prelude.trim();
        let (url, rest) = if let Some(quote) = prelude.chars().next().filter(|c| *c == '"' || *c == '\'') {
            let end = prelude[1..].find(quote)? + 1;
            (&prelude[1..end], &prelude[end + 1..])
        } else {
            let call = find_function(prelude, "url", 0).filter(|call| call.start == 0)?;
            let inner = call.args(prelude).trim();
            let unquoted = inner
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
                .unwrap_or(inner);
            (unquoted, &prelude[call.end()..])
        };

        Some(Self {
            url: url.trim().to_string(),
            media: rest.trim().to_string(),
        })
    }

    /// Imports that stay in the output for the browser to fetch
    pub fn is_remote(&self) -> bool {
        let url = self.url.to_ascii_lowercase();
        url.starts_with("http://") || url.starts_with("https://") || url.starts_with("//")
    }

    fn is_glob(&self) -> bool {
        self.url.contains(['*', '?', '['])
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn import_error(path: &Path, location: SourceLocation, target: &str) -> CssError {
    CssError::Import {
        path: path.to_path_buf(),
        line: location.line + 1,
        column: location.column + 1,
        target: target.to_string(),
    }
}

/// Files an import refers to, in inlining order
fn resolve(target: &ImportTarget, base_dir: &Path) -> Vec<PathBuf> {
    if target.is_glob() {
        // only the import's own text is a pattern; the directory is literal
        let base = Pattern::escape(&base_dir.to_string_lossy());
        let pattern = if base.is_empty() {
            target.url.clone()
        } else {
            format!("{}/{}", base, target.url)
        };
        let mut matches: Vec<PathBuf> = glob::glob(&pattern)
            .map(|paths| paths.filter_map(Result::ok).filter(|p| p.is_file()).collect())
            .unwrap_or_default();
        matches.sort();
        return matches;
    }

    let path = base_dir.join(&target.url);
    let mut candidates = vec![path.clone()];
    if path.extension().is_none() {
        candidates.push(path.with_extension("css"));
    }
    if let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) {
        if !name.starts_with('_') {
            let partial = path.with_file_name(format!("_{}", name));
            if partial.extension().is_none() {
                candidates.push(partial.with_extension("css"));
            }
            candidates.push(partial);
        }
    }

    candidates.into_iter().find(|p| p.is_file()).into_iter().collect()
}

fn inline(
    nodes: Vec<Node>,
    sources: &mut Vec<Source>,
    seen: &mut HashSet<PathBuf>,
    imported: bool,
) -> Result<Vec<Node>, CssError> {
    let mut out = Vec::with_capacity(nodes.len());

    for node in nodes {
        let at = match node {
            Node::AtRule(at) if at.is("import") => at,
            // an imported file's charset is decided by the importer
            Node::AtRule(at) if imported && at.is("charset") => continue,
            other => {
                out.push(other);
                continue;
            }
        };

        let importer = sources
            .get(at.location.source)
            .map(|s| s.path.clone())
            .unwrap_or_default();

        let target = match ImportTarget::parse(&at.prelude) {
            Some(target) => target,
            None => return Err(import_error(&importer, at.location, &at.prelude)),
        };
        if target.is_remote() {
            out.push(Node::AtRule(at));
            continue;
        }

        let base_dir = importer.parent().map(Path::to_path_buf).unwrap_or_default();
        let files = resolve(&target, &base_dir);
        if files.is_empty() && !target.is_glob() {
            return Err(import_error(&importer, at.location, &target.url));
        }

        let mut inlined = Vec::new();
        for file in files {
            if !seen.insert(canonical(&file)) {
                continue;
            }

            let content = fs::read_to_string(&file).map_err(|source| CssError::Io {
                path: file.clone(),
                source,
            })?;
            let index = sources.len();
            let parsed = parser::parse(&content, index, &file)?;
            sources.push(Source {
                path: file,
                content,
            });

            inlined.extend(inline(parsed, sources, seen, true)?);
        }

        if target.media.is_empty() {
            out.extend(inlined);
        } else if !inlined.is_empty() {
            out.push(Node::AtRule(AtRule {
                name: "media".to_string(),
                prelude: target.media,
                body: Some(AtRuleBody::Rules(inlined)),
                location: at.location,
            }));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::ast::Rule;
    use tempfile::TempDir;

    fn load(path: &Path) -> Stylesheet {
        let content = fs::read_to_string(path).unwrap();
        let nodes = parser::parse(&content, 0, path).unwrap();
        Stylesheet {
            sources: vec![Source {
                path: path.to_path_buf(),
                content,
            }],
            nodes,
            ..Default::default()
        }
    }

    fn selectors(nodes: &[Node]) -> Vec<String> {
        nodes
            .iter()
            .filter_map(|n| match n {
                Node::Rule(Rule { selector, .. }) => Some(selector.clone()),
                _ => None,
            })
            .collect()
    }

    fn run(sheet: &mut Stylesheet) -> Result<(), CssError> {
        ImportInliner::new().process(sheet, &mut ProcessContext::new())
    }

    #[test]
    fn parses_import_preludes() {
        assert_eq!(
            ImportTarget::parse("\"a.css\""),
            Some(ImportTarget { url: "a.css".into(), media: String::new() })
        );
        assert_eq!(
            ImportTarget::parse("url('b.css') screen and (min-width: 10px)"),
            Some(ImportTarget { url: "b.css".into(), media: "screen and (min-width: 10px)".into() })
        );
        assert_eq!(
            ImportTarget::parse("url(c)"),
            Some(ImportTarget { url: "c".into(), media: String::new() })
        );
        assert_eq!(ImportTarget::parse("nonsense"), None);
        assert!(ImportTarget::parse("'https://fonts.example/x.css'").unwrap().is_remote());
    }

    #[test]
    fn inlines_nested_imports_with_locations() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("parts")).unwrap();
        fs::write(dir.path().join("main.css"), "@import \"parts/base\";\nmain { a: b }").unwrap();
        fs::write(dir.path().join("parts/base.css"), "@charset \"utf-8\";\n@import '_vars.css';\nbase { a: b }").unwrap();
        fs::write(dir.path().join("parts/_vars.css"), ":root { --x: 1 }").unwrap();

        let mut sheet = load(&dir.path().join("main.css"));
        run(&mut sheet).unwrap();

        assert_eq!(selectors(&sheet.nodes), vec![":root", "base", "main"]);
        assert_eq!(sheet.sources.len(), 3);

        // nodes keep the location in the file they came from
        let base = &sheet.nodes[1];
        assert_eq!(base.location().line, 2);
        assert!(sheet.source_path(base.location()).ends_with("parts/base.css"));
    }

    #[test]
    fn resolves_partials() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.css"), "@import 'grid';").unwrap();
        fs::write(dir.path().join("_grid.css"), "grid { a: b }").unwrap();

        let mut sheet = load(&dir.path().join("main.css"));
        run(&mut sheet).unwrap();
        assert_eq!(selectors(&sheet.nodes), vec!["grid"]);
    }

    #[test]
    fn expands_globs_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("components")).unwrap();
        fs::write(dir.path().join("main.css"), "@import \"components/*.css\";").unwrap();
        fs::write(dir.path().join("components/b.css"), "b { a: b }").unwrap();
        fs::write(dir.path().join("components/a.css"), "a { a: b }").unwrap();

        let mut sheet = load(&dir.path().join("main.css"));
        run(&mut sheet).unwrap();
        assert_eq!(selectors(&sheet.nodes), vec!["a", "b"]);
    }

    #[test]
    fn globs_under_a_bracketed_directory() {
        let dir = TempDir::new().unwrap();
        let theme = dir.path().join("theme [v2]");
        fs::create_dir_all(theme.join("components")).unwrap();
        fs::write(theme.join("main.css"), "@import \"components/*.css\";").unwrap();
        fs::write(theme.join("components/card.css"), "card { a: b }").unwrap();

        let mut sheet = load(&theme.join("main.css"));
        run(&mut sheet).unwrap();
        assert_eq!(selectors(&sheet.nodes), vec!["card"]);
    }

    #[test]
    fn wraps_media_imports() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.css"), "@import 'print.css' print;").unwrap();
        fs::write(dir.path().join("print.css"), "p { a: b }").unwrap();

        let mut sheet = load(&dir.path().join("main.css"));
        run(&mut sheet).unwrap();

        match &sheet.nodes[0] {
            Node::AtRule(at) => {
                assert!(at.is("media"));
                assert_eq!(at.prelude, "print");
            }
            other => panic!("expected @media, got {:?}", other),
        }
    }

    #[test]
    fn skips_duplicates_and_cycles() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.css"), "@import 'a.css';\n@import 'a.css';\n@import 'main.css';").unwrap();
        fs::write(dir.path().join("a.css"), "@import 'main.css';\na { a: b }").unwrap();

        let mut sheet = load(&dir.path().join("main.css"));
        run(&mut sheet).unwrap();
        assert_eq!(selectors(&sheet.nodes), vec!["a"]);
    }

    #[test]
    fn keeps_remote_imports() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.css"), "@import url(https://fonts.example/css);").unwrap();

        let mut sheet = load(&dir.path().join("main.css"));
        run(&mut sheet).unwrap();
        assert!(matches!(&sheet.nodes[0], Node::AtRule(at) if at.is("import")));
    }

    #[test]
    fn missing_import_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.css"), "a { a: b }\n@import 'missing.css';").unwrap();

        let mut sheet = load(&dir.path().join("main.css"));
        let err = run(&mut sheet).unwrap_err();
        assert!(matches!(err, CssError::Import { line: 2, .. }));
        assert!(err.to_string().contains("cannot resolve import 'missing.css'"));
    }
}
