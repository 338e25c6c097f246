//! Minification
//!
//! Runs last. Drops comments other than `/*! ... */`, collapses whitespace,
//! shortens numbers and colors, merges adjacent rules with the same selector,
//! removes duplicate declarations and empty blocks, then switches the sheet to
//! compact output.

use std::collections::HashSet;
use std::convert::Infallible;

use super::ast::{AtRuleBody, Declaration, Node, OutputStyle, Stylesheet};
use super::chain::{ProcessContext, Processor, Stage};
use super::color::shorten_hex;
use super::error::CssError;
use super::value::{replace_functions, split_top_level};

const LENGTH_UNITS: &[&str] = &[
    "px", "em", "rem", "ex", "ch", "vw", "vh", "vmin", "vmax", "cm", "mm", "q", "in", "pt", "pc",
];

/// `0px` and `0` differ here
const ZERO_UNIT_SENSITIVE: &[&str] = &["flex", "flex-basis", "-webkit-flex", "-ms-flex"];

/// Functions whose arguments must keep units
const MATH_FUNCTIONS: &[&str] = &["calc", "min", "max", "clamp", "-webkit-calc"];

#[derive(Debug, Default)]
pub struct Minifier;

impl Minifier {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for Minifier {
    fn name(&self) -> &'static str {
        "minify"
    }

    fn stage(&self) -> Stage {
        Stage::Finalize
    }

    fn process(&self, sheet: &mut Stylesheet, _ctx: &mut ProcessContext) -> Result<(), CssError> {
        let nodes = std::mem::take(&mut sheet.nodes);
        sheet.nodes = minify_nodes(nodes);
        sheet.style = OutputStyle::Compact;
        Ok(())
    }
}

fn minify_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());

    for node in nodes {
        match node {
            Node::Comment(comment) => {
                if comment.is_preserved() {
                    out.push(Node::Comment(comment));
                }
            }
            Node::Rule(mut rule) => {
                rule.selector = minify_selector(&rule.selector);
                minify_block(&mut rule.declarations);
                if rule.declarations.is_empty() {
                    continue;
                }
                if let Some(Node::Rule(previous)) = out.last_mut() {
                    if previous.selector == rule.selector {
                        previous.declarations.extend(rule.declarations);
                        dedupe(&mut previous.declarations);
                        continue;
                    }
                }
                out.push(Node::Rule(rule));
            }
            Node::AtRule(mut at) => {
                at.prelude = minify_prelude(&at.prelude);
                match at.body.take() {
                    None => {}
                    Some(AtRuleBody::Rules(children)) => {
                        let children = minify_nodes(children);
                        if children.is_empty() {
                            continue;
                        }
                        at.body = Some(AtRuleBody::Rules(children));
                    }
                    Some(AtRuleBody::Declarations(mut decls)) => {
                        minify_block(&mut decls);
                        if decls.is_empty() {
                            continue;
                        }
                        at.body = Some(AtRuleBody::Declarations(decls));
                    }
                }
                out.push(Node::AtRule(at));
            }
        }
    }

    out
}

fn minify_block(decls: &mut Vec<Declaration>) {
    for decl in decls.iter_mut() {
        decl.value = minify_value(&decl.property, &decl.value);
    }
    dedupe(decls);
}

/// Removes exact repeats, keeping the last occurrence
fn dedupe(decls: &mut Vec<Declaration>) {
    let mut seen = HashSet::new();
    let mut keep = vec![true; decls.len()];
    for (i, decl) in decls.iter().enumerate().rev() {
        keep[i] = seen.insert((decl.property.clone(), decl.value.clone(), decl.important));
    }
    let mut flags = keep.into_iter();
    decls.retain(|_| flags.next().unwrap_or(true));
}

/// Copies a quoted string starting at `chars[i]`, returns the index after it
fn copy_string(chars: &[char], mut i: usize, out: &mut String) -> usize {
    let quote = chars[i];
    out.push(quote);
    i += 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        if c == '\\' {
            if let Some(&next) = chars.get(i) {
                out.push(next);
                i += 1;
            }
        } else if c == quote {
            break;
        }
    }
    i
}

/// `rgb(255, 0, 0)` -> `#f00`
fn shorten_rgb(value: &str) -> String {
    let result: Result<String, Infallible> = replace_functions(value, "rgb", |args| {
        let channels: Vec<u8> = split_top_level(args, ',')
            .iter()
            .filter_map(|part| part.trim().parse::<u8>().ok())
            .collect();
        if channels.len() != 3 || split_top_level(args, ',').len() != 3 {
            return Ok(None);
        }
        Ok(Some(shorten_hex(&format!(
            "{:02x}{:02x}{:02x}",
            channels[0], channels[1], channels[2]
        ))))
    });
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

fn shorten_hex_word(word: &str) -> String {
    let digits = &word[1..];
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return word.to_string();
    }
    match digits.len() {
        3 => format!("#{}", digits.to_ascii_lowercase()),
        6 => shorten_hex(&digits.to_ascii_lowercase()),
        _ => word.to_string(),
    }
}

/// `0.50em` -> `.5em`, `0px` -> `0` when `strip_zero_unit`
fn shorten_number(word: &str, strip_zero_unit: bool) -> String {
    let (sign, rest) = match word.chars().next() {
        Some(c @ ('+' | '-')) => (Some(c), &word[1..]),
        _ => (None, word),
    };

    let int_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let (int, after_int) = rest.split_at(int_len);
    let (frac, unit) = match after_int.strip_prefix('.') {
        Some(after_dot) => {
            let frac_len = after_dot.chars().take_while(|c| c.is_ascii_digit()).count();
            if frac_len == 0 && int.is_empty() {
                return word.to_string();
            }
            after_dot.split_at(frac_len)
        }
        None => ("", after_int),
    };

    if int.is_empty() && frac.is_empty() {
        return word.to_string();
    }
    if !(unit.is_empty() || unit == "%" || unit.chars().all(|c| c.is_ascii_alphabetic())) {
        return word.to_string();
    }

    let int = int.trim_start_matches('0');
    let frac = frac.trim_end_matches('0');

    if int.is_empty() && frac.is_empty() {
        let unit_lower = unit.to_ascii_lowercase();
        if strip_zero_unit && LENGTH_UNITS.contains(&unit_lower.as_str()) {
            return "0".to_string();
        }
        return format!("0{}", unit);
    }

    let mut out = String::with_capacity(word.len());
    if let Some(sign) = sign {
        out.push(sign);
    }
    out.push_str(int);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    out.push_str(unit);
    out
}

struct ValueWriter {
    out: String,
    word: String,
    pending_space: bool,
    functions: Vec<String>,
    keep_zero_units: bool,
}

impl ValueWriter {
    fn emit(&mut self, text: &str) {
        let first = text.chars().next();
        if self.pending_space
            && !self.out.is_empty()
            && !self.out.ends_with(['(', ','])
            && !matches!(first, Some(')' | ','))
        {
            self.out.push(' ');
        }
        self.pending_space = false;
        self.out.push_str(text);
    }

    fn flush_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let word = std::mem::take(&mut self.word);
        let in_math = self
            .functions
            .iter()
            .any(|f| MATH_FUNCTIONS.contains(&f.as_str()));
        let minified = if word.starts_with('#') {
            shorten_hex_word(&word)
        } else {
            shorten_number(&word, !self.keep_zero_units && !in_math)
        };
        self.emit(&minified);
    }
}

/// Minifies one declaration value; custom properties are only trimmed
pub fn minify_value(property: &str, value: &str) -> String {
    let value = value.trim();
    if property.starts_with("--") {
        return value.to_string();
    }

    let value = shorten_rgb(value);
    let chars: Vec<char> = value.chars().collect();
    let mut writer = ValueWriter {
        out: String::with_capacity(value.len()),
        word: String::new(),
        pending_space: false,
        functions: Vec::new(),
        keep_zero_units: ZERO_UNIT_SENSITIVE.contains(&property),
    };

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                writer.flush_word();
                let mut text = String::new();
                i = copy_string(&chars, i, &mut text);
                writer.emit(&text);
                continue;
            }
            c if c.is_whitespace() => {
                writer.flush_word();
                writer.pending_space = true;
            }
            '(' => {
                let name = std::mem::take(&mut writer.word);
                let lower = name.to_ascii_lowercase();
                if lower == "url" {
                    // copied as written up to the closing parenthesis
                    let mut text = name;
                    text.push('(');
                    i += 1;
                    while i < chars.len() {
                        if chars[i] == '"' || chars[i] == '\'' {
                            i = copy_string(&chars, i, &mut text);
                            continue;
                        }
                        text.push(chars[i]);
                        i += 1;
                        if chars[i - 1] == ')' {
                            break;
                        }
                    }
                    writer.emit(&text);
                    continue;
                }
                writer.functions.push(lower);
                writer.emit(&format!("{}(", name));
            }
            ')' => {
                writer.flush_word();
                writer.functions.pop();
                writer.emit(")");
            }
            ',' | '/' => {
                writer.flush_word();
                writer.emit(&c.to_string());
            }
            _ => writer.word.push(c),
        }
        i += 1;
    }
    writer.flush_word();
    writer.out
}

/// Collapses whitespace and drops it around combinators and commas
pub fn minify_selector(selector: &str) -> String {
    let chars: Vec<char> = selector.trim().chars().collect();
    let mut out = String::with_capacity(selector.len());
    let mut pending_space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                if pending_space && !out.is_empty() && !out.ends_with(['>', '+', '~', ',', '(']) {
                    out.push(' ');
                }
                pending_space = false;
                i = copy_string(&chars, i, &mut out);
                continue;
            }
            '[' => {
                if pending_space && !out.is_empty() && !out.ends_with(['>', '+', '~', ',', '(']) {
                    out.push(' ');
                }
                pending_space = false;
                while i < chars.len() {
                    if chars[i] == '"' || chars[i] == '\'' {
                        i = copy_string(&chars, i, &mut out);
                        continue;
                    }
                    if !chars[i].is_whitespace() {
                        out.push(chars[i]);
                    }
                    i += 1;
                    if out.ends_with(']') {
                        break;
                    }
                }
                continue;
            }
            c if c.is_whitespace() => pending_space = true,
            '>' | '+' | '~' | ',' | ')' => {
                pending_space = false;
                out.push(c);
            }
            _ => {
                if pending_space && !out.is_empty() && !out.ends_with(['>', '+', '~', ',', '(']) {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
        i += 1;
    }

    out
}

/// Collapses whitespace in an at-rule prelude, tightening `( a : b )`
pub fn minify_prelude(prelude: &str) -> String {
    let chars: Vec<char> = prelude.trim().chars().collect();
    let mut out = String::with_capacity(prelude.len());
    let mut pending_space = false;
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            i = copy_string(&chars, i, &mut out);
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            i += 1;
            continue;
        }

        let tight_before = c == ')' || c == ',' || (c == ':' && depth > 0);
        let tight_after = out.ends_with(['(', ',']) || (depth > 0 && out.ends_with(':'));
        if pending_space && !out.is_empty() && !tight_before && !tight_after {
            out.push(' ');
        }
        pending_space = false;

        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        out.push(c);
        i += 1;
    }

    out
}
