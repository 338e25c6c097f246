//! CSS parser
//!
//! A small recursive-descent parser that produces the [`Stylesheet`] tree.
//! It is tolerant where browsers are (stray semicolons, a missing final
//! semicolon) and strict about structure (unclosed blocks, strings,
//! brackets, declarations without a colon, nested rules).

use std::path::Path;

use super::ast::{AtRule, AtRuleBody, Comment, Declaration, Node, Rule, SourceLocation};
use super::error::CssError;

/// At-rules whose block holds declarations instead of rules
const DECLARATION_AT_RULES: &[&str] = &[
    "font-face",
    "page",
    "counter-style",
    "property",
    "viewport",
    "-ms-viewport",
    "font-palette-values",
];

/// Parses `content` into nodes located in source number `source`
pub fn parse(content: &str, source: usize, path: &Path) -> Result<Vec<Node>, CssError> {
    let mut parser = Parser::new(content, source, path);
    parser.parse_nodes(None)
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    source: usize,
    path: &'a Path,
}

impl<'a> Parser<'a> {
    fn new(content: &str, source: usize, path: &'a Path) -> Self {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        Self {
            chars: content.chars().collect(),
            pos: 0,
            line: 0,
            column: 0,
            source,
            path,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += c.len_utf16() as u32;
        }
        Some(c)
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            source: self.source,
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, at: SourceLocation, message: impl Into<String>) -> CssError {
        CssError::Syntax {
            path: self.path.to_path_buf(),
            line: at.line + 1,
            column: at.column + 1,
            message: message.into(),
        }
    }

    fn at_comment(&self) -> bool {
        self.peek() == Some('/') && self.peek_at(1) == Some('*')
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Reads a comment starting at `/*`, returning the text between the markers
    fn read_comment(&mut self) -> Result<String, CssError> {
        let start = self.location();
        self.bump();
        self.bump();

        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error(start, "Unclosed comment")),
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    return Ok(text);
                }
                Some(_) => {
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
            }
        }
    }

    /// Reads a quoted string including its quotes
    fn read_string(&mut self, out: &mut String) -> Result<(), CssError> {
        let start = self.location();
        let quote = match self.bump() {
            Some(q) => q,
            None => return Ok(()),
        };
        out.push(quote);

        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error(start, "Unclosed string")),
                Some('\\') => {
                    out.push('\\');
                    if let Some(next) = self.bump() {
                        out.push(next);
                    }
                }
                Some(c) if c == quote => {
                    out.push(c);
                    return Ok(());
                }
                Some(c) => out.push(c),
            }
        }
    }

    /// Reads raw text up to one of `stops` at bracket depth zero
    ///
    /// Comments are dropped, strings and escapes are kept verbatim. The stop
    /// character is not consumed; `None` means end of input.
    fn read_until(&mut self, stops: &[char]) -> Result<(String, Option<char>), CssError> {
        let mut text = String::new();
        let mut brackets: Vec<(char, SourceLocation)> = Vec::new();

        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    if let Some((_, open)) = brackets.first() {
                        return Err(self.error(*open, "Unclosed bracket"));
                    }
                    return Ok((text, None));
                }
            };

            if brackets.is_empty() && stops.contains(&c) {
                return Ok((text, Some(c)));
            }

            match c {
                '/' if self.at_comment() => {
                    self.read_comment()?;
                }
                '"' | '\'' => self.read_string(&mut text)?,
                '\\' => {
                    self.bump();
                    text.push('\\');
                    if let Some(next) = self.bump() {
                        text.push(next);
                    }
                }
                '(' | '[' => {
                    brackets.push((c, self.location()));
                    self.bump();
                    text.push(c);
                }
                ')' | ']' => {
                    let opener = if c == ')' { '(' } else { '[' };
                    if brackets.last().map(|(b, _)| *b) == Some(opener) {
                        brackets.pop();
                    }
                    self.bump();
                    text.push(c);
                }
                _ => {
                    self.bump();
                    text.push(c);
                }
            }
        }
    }

    fn parse_nodes(&mut self, open: Option<SourceLocation>) -> Result<Vec<Node>, CssError> {
        let mut nodes = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    return match open {
                        Some(open) => Err(self.error(open, "Unclosed block")),
                        None => Ok(nodes),
                    };
                }
                Some('}') => {
                    if open.is_some() {
                        self.bump();
                        return Ok(nodes);
                    }
                    return Err(self.error(self.location(), "Unexpected '}'"));
                }
                Some(';') => {
                    self.bump();
                }
                Some('/') if self.at_comment() => {
                    let location = self.location();
                    let text = self.read_comment()?;
                    nodes.push(Node::Comment(Comment { text, location }));
                }
                Some('@') => nodes.push(self.parse_at_rule()?),
                Some(_) => nodes.push(Node::Rule(self.parse_rule()?)),
            }
        }
    }

    fn parse_rule(&mut self) -> Result<Rule, CssError> {
        let location = self.location();
        let (prelude, stop) = self.read_until(&['{', ';', '}'])?;
        let selector = collapse_whitespace(&prelude);

        if stop != Some('{') {
            return Err(self.error(location, format!("Unknown word '{}'", first_word(&selector))));
        }
        if selector.is_empty() {
            return Err(self.error(location, "Rule without selector"));
        }

        let open = self.location();
        self.bump();
        let declarations = self.parse_declarations(open)?;

        Ok(Rule {
            selector,
            declarations,
            location,
        })
    }

    fn parse_at_rule(&mut self) -> Result<Node, CssError> {
        let location = self.location();
        self.bump();

        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error(location, "At-rule without name"));
        }

        let (prelude, stop) = self.read_until(&['{', ';', '}'])?;
        let prelude = prelude.trim().to_string();

        let body = match stop {
            Some('{') => {
                let open = self.location();
                self.bump();
                let lowered = name.to_ascii_lowercase();
                if DECLARATION_AT_RULES.contains(&lowered.as_str()) {
                    Some(AtRuleBody::Declarations(self.parse_declarations(open)?))
                } else {
                    Some(AtRuleBody::Rules(self.parse_nodes(Some(open))?))
                }
            }
            Some(';') => {
                self.bump();
                None
            }
            _ => None,
        };

        Ok(Node::AtRule(AtRule {
            name,
            prelude,
            body,
            location,
        }))
    }

    fn parse_declarations(&mut self, open: SourceLocation) -> Result<Vec<Declaration>, CssError> {
        let mut declarations = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error(open, "Unclosed block")),
                Some('}') => {
                    self.bump();
                    return Ok(declarations);
                }
                Some(';') => {
                    self.bump();
                }
                Some('/') if self.at_comment() => {
                    self.read_comment()?;
                }
                Some(_) => declarations.push(self.parse_declaration(open)?),
            }
        }
    }

    fn parse_declaration(&mut self, open: SourceLocation) -> Result<Declaration, CssError> {
        let location = self.location();
        let (raw_property, stop) = self.read_until(&[':', ';', '{', '}'])?;
        let raw_property = raw_property.trim();

        match stop {
            Some(':') => {}
            Some('{') => return Err(self.error(location, "Nested rules are not supported")),
            None => return Err(self.error(open, "Unclosed block")),
            _ => return Err(self.error(location, format!("Unknown word '{}'", first_word(raw_property)))),
        }
        if raw_property.is_empty() {
            return Err(self.error(location, "Declaration without property name"));
        }
        self.bump();

        let (raw_value, stop) = self.read_until(&[';', '{', '}'])?;
        match stop {
            Some(';') => {
                self.bump();
            }
            Some('}') => {}
            Some('{') => return Err(self.error(location, "Nested rules are not supported")),
            None => return Err(self.error(open, "Unclosed block")),
            Some(_) => {}
        }

        let property = if raw_property.starts_with("--") {
            raw_property.to_string()
        } else {
            raw_property.to_ascii_lowercase()
        };
        let (value, important) = split_important(raw_value.trim());

        Ok(Declaration {
            property,
            value,
            important,
            location,
        })
    }
}

/// Splits a trailing `!important` off a declaration value
fn split_important(value: &str) -> (String, bool) {
    if let Some(idx) = value.rfind('!') {
        let tail = value[idx + 1..].trim();
        if tail.eq_ignore_ascii_case("important") {
            return (value[..idx].trim_end().to_string(), true);
        }
    }
    (value.to_string(), false)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_word(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(css: &str) -> Result<Vec<Node>, CssError> {
        parse(css, 0, Path::new("test.css"))
    }

    fn rule(node: &Node) -> &Rule {
        match node {
            Node::Rule(rule) => rule,
            other => panic!("expected rule, got {:?}", other),
        }
    }

    #[test]
    fn parses_rules_and_declarations() {
        let nodes = parse_str("a, b > c {\n  color: red;\n  margin: 0 auto !important\n}").unwrap();
        assert_eq!(nodes.len(), 1);

        let rule = rule(&nodes[0]);
        assert_eq!(rule.selector, "a, b > c");
        assert_eq!(rule.declarations.len(), 2);
        assert_eq!(rule.declarations[0].property, "color");
        assert_eq!(rule.declarations[0].value, "red");
        assert_eq!(rule.declarations[0].location.line, 1);
        assert_eq!(rule.declarations[0].location.column, 2);
        assert_eq!(rule.declarations[1].value, "0 auto");
        assert!(rule.declarations[1].important);
    }

    #[test]
    fn keeps_strings_and_urls_intact() {
        let nodes = parse_str(r#"a { content: "a;b}"; background: url(data:image/png;base64,AAA=) }"#).unwrap();
        let rule = rule(&nodes[0]);
        assert_eq!(rule.declarations[0].value, r#""a;b}""#);
        assert_eq!(rule.declarations[1].value, "url(data:image/png;base64,AAA=)");
    }

    #[test]
    fn parses_at_rules() {
        let css = "@charset \"utf-8\";\n@import 'x.css' screen;\n@media (max-width: 10px) { a { b: c } }\n@font-face { font-family: X; src: url(x.woff) }";
        let nodes = parse_str(css).unwrap();
        assert_eq!(nodes.len(), 4);

        match &nodes[1] {
            Node::AtRule(at) => {
                assert!(at.is("import"));
                assert_eq!(at.prelude, "'x.css' screen");
                assert!(at.body.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        match &nodes[2] {
            Node::AtRule(at) => {
                assert_eq!(at.prelude, "(max-width: 10px)");
                assert!(matches!(&at.body, Some(AtRuleBody::Rules(children)) if children.len() == 1));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &nodes[3] {
            Node::AtRule(at) => {
                assert!(matches!(&at.body, Some(AtRuleBody::Declarations(decls)) if decls.len() == 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn keeps_top_level_comments() {
        let nodes = parse_str("/*! keep */\na { /* inner */ color: red }").unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(matches!(&nodes[0], Node::Comment(c) if c.is_preserved()));
        assert_eq!(rule(&nodes[1]).declarations.len(), 1);
    }

    #[test]
    fn custom_property_case_is_preserved() {
        let nodes = parse_str(":root { --Main-Color: #FFF; COLOR: Red }").unwrap();
        let rule = rule(&nodes[0]);
        assert_eq!(rule.declarations[0].property, "--Main-Color");
        assert_eq!(rule.declarations[1].property, "color");
        assert_eq!(rule.declarations[1].value, "Red");
    }

    #[test]
    fn unclosed_block_points_at_opening_brace() {
        let err = parse_str("a {\n  color: red;\n").unwrap_err();
        assert_eq!(err.to_string(), "test.css:1:3: Unclosed block");
    }

    #[test]
    fn stray_closing_brace_is_an_error() {
        let err = parse_str("a { color: red } }").unwrap_err();
        assert!(err.to_string().contains("Unexpected '}'"));
    }

    #[test]
    fn declaration_without_colon_is_an_error() {
        let err = parse_str("a { color red; }").unwrap_err();
        assert!(err.to_string().contains("Unknown word 'color'"));
    }

    #[test]
    fn nested_rule_is_an_error() {
        let err = parse_str("a { b { color: red } }").unwrap_err();
        assert!(err.to_string().contains("Nested rules"));
    }

    #[test]
    fn unclosed_string_and_comment() {
        assert!(parse_str("a { content: \"oops }").unwrap_err().to_string().contains("Unclosed string"));
        assert!(parse_str("/* never ends").unwrap_err().to_string().contains("Unclosed comment"));
    }

    #[test]
    fn unclosed_bracket() {
        let err = parse_str("a { width: calc(1px + 2px; }").unwrap_err();
        assert!(err.to_string().contains("Unclosed bracket"));
    }

    #[test]
    fn tolerates_stray_semicolons_and_bom() {
        let nodes = parse_str("\u{feff};a { ; color: red;; }").unwrap();
        assert_eq!(rule(&nodes[0]).declarations.len(), 1);
    }

    #[test]
    fn split_important_variants() {
        assert_eq!(split_important("red !important"), ("red".into(), true));
        assert_eq!(split_important("red ! IMPORTANT"), ("red".into(), true));
        assert_eq!(split_important("red"), ("red".into(), false));
    }
}
