//! Stylesheet tree
//!
//! Every node remembers where it was parsed from so the source map can point
//! back to the original file after any number of processors have run.

use std::path::{Path, PathBuf};

/// Position in one of the stylesheet's sources (0-based, UTF-16 columns)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub source: usize,
    pub line: u32,
    pub column: u32,
}

/// A file that contributed nodes to a stylesheet
#[derive(Debug, Clone)]
pub struct Source {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
    pub location: SourceLocation,
}

impl Declaration {
    pub fn new(property: impl Into<String>, value: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
            important: false,
            location,
        }
    }

    /// Custom properties (`--name`) are case-sensitive and never rewritten
    pub fn is_custom_property(&self) -> bool {
        self.property.starts_with("--")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selector: String,
    pub declarations: Vec<Declaration>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtRuleBody {
    /// `@media`, `@supports`, `@keyframes`...
    Rules(Vec<Node>),
    /// `@font-face`, `@page`...
    Declarations(Vec<Declaration>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtRule {
    pub name: String,
    pub prelude: String,
    pub body: Option<AtRuleBody>,
    pub location: SourceLocation,
}

impl AtRule {
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    /// Text between `/*` and `*/`
    pub text: String,
    pub location: SourceLocation,
}

impl Comment {
    /// `/*! ... */` comments survive minification
    pub fn is_preserved(&self) -> bool {
        self.text.starts_with('!')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Rule(Rule),
    AtRule(AtRule),
    Comment(Comment),
}

impl Node {
    pub fn location(&self) -> SourceLocation {
        match self {
            Node::Rule(rule) => rule.location,
            Node::AtRule(at) => at.location,
            Node::Comment(comment) => comment.location,
        }
    }
}

/// How the serializer lays out the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compact,
}

/// A parsed stylesheet and the files it was assembled from
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    pub sources: Vec<Source>,
    pub nodes: Vec<Node>,
    pub style: OutputStyle,
}

impl Stylesheet {
    /// Path of the source a location refers to
    pub fn source_path(&self, location: SourceLocation) -> &Path {
        self.sources
            .get(location.source)
            .map(|s| s.path.as_path())
            .unwrap_or_else(|| Path::new("<unknown>"))
    }

    /// Applies `f` to every declaration, including those nested in at-rules
    pub fn for_each_declaration_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Declaration),
    {
        walk_declarations_mut(&mut self.nodes, &mut f);
    }

    /// Like [`Stylesheet::for_each_declaration_mut`] but stops at the first error
    pub fn try_for_each_declaration_mut<F, E>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&mut Declaration) -> Result<(), E>,
    {
        try_walk_declarations_mut(&mut self.nodes, &mut f)
    }
}

fn walk_declarations_mut<F>(nodes: &mut [Node], f: &mut F)
where
    F: FnMut(&mut Declaration),
{
    for node in nodes {
        match node {
            Node::Rule(rule) => rule.declarations.iter_mut().for_each(&mut *f),
            Node::AtRule(at) => match &mut at.body {
                Some(AtRuleBody::Rules(children)) => walk_declarations_mut(children, f),
                Some(AtRuleBody::Declarations(decls)) => decls.iter_mut().for_each(&mut *f),
                None => {}
            },
            Node::Comment(_) => {}
        }
    }
}

fn try_walk_declarations_mut<F, E>(nodes: &mut [Node], f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Declaration) -> Result<(), E>,
{
    for node in nodes {
        match node {
            Node::Rule(rule) => {
                for decl in &mut rule.declarations {
                    f(decl)?;
                }
            }
            Node::AtRule(at) => match &mut at.body {
                Some(AtRuleBody::Rules(children)) => try_walk_declarations_mut(children, f)?,
                Some(AtRuleBody::Declarations(decls)) => {
                    for decl in decls {
                        f(decl)?;
                    }
                }
                None => {}
            },
            Node::Comment(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32) -> SourceLocation {
        SourceLocation { source: 0, line, column: 0 }
    }

    fn sheet() -> Stylesheet {
        Stylesheet {
            sources: vec![Source {
                path: PathBuf::from("a.css"),
                content: String::new(),
            }],
            nodes: vec![
                Node::Rule(Rule {
                    selector: "a".into(),
                    declarations: vec![Declaration::new("color", "red", loc(0))],
                    location: loc(0),
                }),
                Node::AtRule(AtRule {
                    name: "media".into(),
                    prelude: "print".into(),
                    body: Some(AtRuleBody::Rules(vec![Node::Rule(Rule {
                        selector: "b".into(),
                        declarations: vec![Declaration::new("color", "blue", loc(2))],
                        location: loc(2),
                    })])),
                    location: loc(1),
                }),
            ],
            style: OutputStyle::Expanded,
        }
    }

    #[test]
    fn walks_nested_declarations() {
        let mut sheet = sheet();
        let mut seen = Vec::new();
        sheet.for_each_declaration_mut(|d| seen.push(d.value.clone()));
        assert_eq!(seen, vec!["red", "blue"]);
    }

    #[test]
    fn try_walk_stops_on_error() {
        let mut sheet = sheet();
        let mut visited = 0;
        let result: Result<(), String> = sheet.try_for_each_declaration_mut(|d| {
            visited += 1;
            if d.value == "red" {
                Err("stop".into())
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("stop".to_string()));
        assert_eq!(visited, 1);
    }

    #[test]
    fn source_path_for_unknown_index() {
        let sheet = sheet();
        assert_eq!(sheet.source_path(loc(0)), Path::new("a.css"));
        let missing = SourceLocation { source: 9, line: 0, column: 0 };
        assert_eq!(sheet.source_path(missing), Path::new("<unknown>"));
    }
}
