//! Stylesheet serialization
//!
//! Writes the tree back to text and records a mapping for every rule,
//! at-rule and declaration it emits.

use super::ast::{AtRule, AtRuleBody, Comment, Declaration, Node, OutputStyle, Rule, SourceLocation, Stylesheet};
use super::sourcemap::Mapping;

/// Generated CSS and the positions it maps back to
#[derive(Debug, Clone, Default)]
pub struct Serialized {
    pub css: String,
    pub mappings: Vec<Mapping>,
}

/// Serializes a stylesheet in its own output style
pub fn serialize(sheet: &Stylesheet) -> Serialized {
    let mut printer = Printer::new(sheet.style);
    printer.nodes(&sheet.nodes, 0);
    printer.finish()
}

struct Printer {
    style: OutputStyle,
    out: String,
    line: u32,
    column: u32,
    mappings: Vec<Mapping>,
}

impl Printer {
    fn new(style: OutputStyle) -> Self {
        Self {
            style,
            out: String::new(),
            line: 0,
            column: 0,
            mappings: Vec::new(),
        }
    }

    fn finish(mut self) -> Serialized {
        if self.style == OutputStyle::Expanded && !self.out.is_empty() && !self.out.ends_with('\n') {
            self.write("\n");
        }
        Serialized {
            css: self.out,
            mappings: self.mappings,
        }
    }

    fn compact(&self) -> bool {
        self.style == OutputStyle::Compact
    }

    fn write(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += c.len_utf16() as u32;
            }
        }
        self.out.push_str(text);
    }

    fn mark(&mut self, location: SourceLocation) {
        self.mappings.push(Mapping {
            generated_line: self.line,
            generated_column: self.column,
            source: location.source as u32,
            original_line: location.line,
            original_column: location.column,
        });
    }

    fn indent(&mut self, depth: usize) {
        if !self.compact() {
            self.write(&"  ".repeat(depth));
        }
    }

    fn nodes(&mut self, nodes: &[Node], depth: usize) {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 && depth == 0 && !self.compact() {
                self.write("\n");
            }
            match node {
                Node::Rule(rule) => self.rule(rule, depth),
                Node::AtRule(at) => self.at_rule(at, depth),
                Node::Comment(comment) => self.comment(comment, depth),
            }
        }
    }

    fn rule(&mut self, rule: &Rule, depth: usize) {
        self.indent(depth);
        self.mark(rule.location);
        self.write(&rule.selector);
        self.block(&rule.declarations, depth);
    }

    fn block(&mut self, declarations: &[Declaration], depth: usize) {
        if self.compact() {
            self.write("{");
            for (i, decl) in declarations.iter().enumerate() {
                if i > 0 {
                    self.write(";");
                }
                self.declaration(decl);
            }
            self.write("}");
        } else {
            self.write(" {\n");
            for decl in declarations {
                self.indent(depth + 1);
                self.declaration(decl);
                self.write(";\n");
            }
            self.indent(depth);
            self.write("}\n");
        }
    }

    fn declaration(&mut self, decl: &Declaration) {
        self.mark(decl.location);
        self.write(&decl.property);
        self.write(if self.compact() { ":" } else { ": " });
        self.write(&decl.value);
        if decl.important {
            self.write(if self.compact() { "!important" } else { " !important" });
        }
    }

    fn at_rule(&mut self, at: &AtRule, depth: usize) {
        self.indent(depth);
        self.mark(at.location);
        self.write("@");
        self.write(&at.name);
        if !at.prelude.is_empty() {
            self.write(" ");
            self.write(&at.prelude);
        }

        match &at.body {
            None => {
                self.write(";");
                if !self.compact() {
                    self.write("\n");
                }
            }
            Some(AtRuleBody::Declarations(decls)) => self.block(decls, depth),
            Some(AtRuleBody::Rules(children)) => {
                self.write(if self.compact() { "{" } else { " {\n" });
                self.nodes(children, depth + 1);
                self.indent(depth);
                self.write(if self.compact() { "}" } else { "}\n" });
            }
        }
    }

    fn comment(&mut self, comment: &Comment, depth: usize) {
        self.indent(depth);
        self.write("/*");
        self.write(&comment.text);
        self.write("*/");
        if !self.compact() {
            self.write("\n");
        }
    }
}
