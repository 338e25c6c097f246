//! Vendor prefixing
//!
//! A browser query (`last 2 versions`, `defaults`, `> 1%`) is reduced to a
//! coverage level: how far back the supported browsers reach. Every entry of
//! the prefix tables names the level from which its prefixes are needed, so a
//! wider target gets more prefixes. Prefixed duplicates are inserted right
//! before the standard declaration, never twice, and prefixes the target no
//! longer needs are dropped when the standard form is present.

use std::collections::HashSet;

use super::ast::{AtRule, AtRuleBody, Declaration, Node, Rule, Stylesheet};
use super::chain::{ChainError, ProcessContext, Processor, Stage};
use super::error::CssError;

const VENDORS: &[&str] = &["-webkit-", "-moz-", "-ms-", "-o-"];

/// Coverage level derived from browser queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BrowserTarget {
    level: u8,
}

impl BrowserTarget {
    pub fn new(level: u8) -> Self {
        Self { level }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Combines queries; the widest one wins. `not ...` and `dead` queries
    /// narrow nothing here and are accepted as-is.
    pub fn parse(queries: &[String]) -> Result<Self, ChainError> {
        let mut level = 0u8;
        for raw in queries {
            for query in raw.split(',') {
                if let Some(found) = parse_query(query).ok_or_else(|| ChainError::InvalidBrowserQuery(raw.clone()))? {
                    level = level.max(found);
                }
            }
        }
        Ok(Self { level })
    }

    fn needs(&self, min_level: u8) -> bool {
        self.level >= min_level
    }
}

impl Default for BrowserTarget {
    fn default() -> Self {
        Self { level: 2 }
    }
}

/// `Some(Some(level))` for a coverage query, `Some(None)` for an accepted
/// query that sets no level, `None` when unrecognized
fn parse_query(query: &str) -> Option<Option<u8>> {
    let query = query.trim().to_ascii_lowercase();
    let words: Vec<&str> = query.split_whitespace().collect();

    match words.as_slice() {
        [] => Some(None),
        ["defaults"] => Some(Some(2)),
        ["dead"] | ["not", ..] => Some(None),
        ["last", n, unit] if unit.starts_with("version") => n.parse::<u8>().ok().map(Some),
        ["last", n, _browser, unit] if unit.starts_with("version") => n.parse::<u8>().ok().map(Some),
        [op, pct] if *op == ">" || *op == ">=" => {
            let share = pct.strip_suffix('%')?.parse::<f64>().ok()?;
            Some(Some(if share < 1.0 { 2 } else { 1 }))
        }
        [gt_pct] if gt_pct.starts_with('>') => {
            let share = gt_pct.trim_start_matches(['>', '=']).strip_suffix('%')?.parse::<f64>().ok()?;
            Some(Some(if share < 1.0 { 2 } else { 1 }))
        }
        _ => None,
    }
}

struct PropertyPrefix {
    property: &'static str,
    prefixes: &'static [&'static str],
    min_level: u8,
    /// Only prefix declarations with this value
    only_value: Option<&'static str>,
}

const fn prop(property: &'static str, prefixes: &'static [&'static str], min_level: u8) -> PropertyPrefix {
    PropertyPrefix {
        property,
        prefixes,
        min_level,
        only_value: None,
    }
}

const PROPERTIES: &[PropertyPrefix] = &[
    prop("appearance", &["-webkit-", "-moz-"], 1),
    prop("user-select", &["-webkit-", "-moz-", "-ms-"], 1),
    prop("backdrop-filter", &["-webkit-"], 1),
    prop("text-size-adjust", &["-webkit-", "-moz-", "-ms-"], 1),
    prop("hyphens", &["-webkit-", "-ms-"], 1),
    prop("clip-path", &["-webkit-"], 1),
    prop("mask", &["-webkit-"], 1),
    prop("mask-image", &["-webkit-"], 1),
    prop("mask-size", &["-webkit-"], 1),
    prop("mask-position", &["-webkit-"], 1),
    prop("mask-repeat", &["-webkit-"], 1),
    prop("box-decoration-break", &["-webkit-"], 1),
    PropertyPrefix {
        property: "background-clip",
        prefixes: &["-webkit-"],
        min_level: 1,
        only_value: Some("text"),
    },
    prop("tab-size", &["-moz-"], 2),
    prop("text-decoration-skip-ink", &["-webkit-"], 2),
    prop("columns", &["-webkit-", "-moz-"], 3),
    prop("column-count", &["-webkit-", "-moz-"], 3),
    prop("column-gap", &["-webkit-", "-moz-"], 3),
    prop("column-rule", &["-webkit-", "-moz-"], 3),
    prop("column-width", &["-webkit-", "-moz-"], 3),
    prop("transform", &["-webkit-"], 3),
    prop("transform-origin", &["-webkit-"], 3),
    prop("transition", &["-webkit-"], 3),
    prop("animation", &["-webkit-"], 3),
    prop("animation-name", &["-webkit-"], 3),
    prop("animation-duration", &["-webkit-"], 3),
    prop("animation-delay", &["-webkit-"], 3),
    prop("animation-fill-mode", &["-webkit-"], 3),
    prop("filter", &["-webkit-"], 3),
    prop("flex", &["-webkit-"], 3),
    prop("flex-direction", &["-webkit-"], 3),
    prop("flex-wrap", &["-webkit-"], 3),
    prop("flex-grow", &["-webkit-"], 3),
    prop("flex-shrink", &["-webkit-"], 3),
    prop("flex-basis", &["-webkit-"], 3),
    prop("justify-content", &["-webkit-"], 3),
    prop("align-items", &["-webkit-"], 3),
    prop("align-self", &["-webkit-"], 3),
    prop("order", &["-webkit-"], 3),
];

struct ValuePrefix {
    properties: &'static [&'static str],
    value: &'static str,
    prefixed: &'static [&'static str],
    min_level: u8,
}

const SIZING: &[&str] = &["width", "height", "min-width", "min-height", "max-width", "max-height"];

const VALUES: &[ValuePrefix] = &[
    ValuePrefix {
        properties: &["position"],
        value: "sticky",
        prefixed: &["-webkit-sticky"],
        min_level: 1,
    },
    ValuePrefix {
        properties: SIZING,
        value: "fit-content",
        prefixed: &["-moz-fit-content"],
        min_level: 1,
    },
    ValuePrefix {
        properties: &["display"],
        value: "flex",
        prefixed: &["-webkit-box", "-ms-flexbox"],
        min_level: 2,
    },
    ValuePrefix {
        properties: &["display"],
        value: "inline-flex",
        prefixed: &["-webkit-inline-box", "-ms-inline-flexbox"],
        min_level: 2,
    },
    ValuePrefix {
        properties: &["display"],
        value: "grid",
        prefixed: &["-ms-grid"],
        min_level: 3,
    },
];

struct SelectorPrefix {
    pseudo: &'static str,
    prefixed: &'static [&'static str],
    min_level: u8,
}

const SELECTORS: &[SelectorPrefix] = &[
    SelectorPrefix {
        pseudo: "::placeholder",
        prefixed: &["::-webkit-input-placeholder", "::-moz-placeholder", ":-ms-input-placeholder"],
        min_level: 1,
    },
    SelectorPrefix {
        pseudo: "::selection",
        prefixed: &["::-moz-selection"],
        min_level: 2,
    },
    SelectorPrefix {
        pseudo: ":fullscreen",
        prefixed: &[":-webkit-full-screen", ":-moz-full-screen", ":-ms-fullscreen"],
        min_level: 2,
    },
];

const KEYFRAMES_LEVEL: u8 = 3;

/// Splits `-webkit-appearance` into (`-webkit-`, `appearance`)
fn split_vendor(name: &str) -> Option<(&'static str, &str)> {
    VENDORS
        .iter()
        .find_map(|vendor| name.strip_prefix(vendor).map(|rest| (*vendor, rest)))
}

fn property_entry(property: &str) -> Option<&'static PropertyPrefix> {
    PROPERTIES.iter().find(|entry| entry.property == property)
}

fn value_entry(property: &str, value: &str) -> Option<&'static ValuePrefix> {
    VALUES
        .iter()
        .find(|entry| entry.value == value && entry.properties.contains(&property))
}

pub struct Prefixer {
    target: BrowserTarget,
}

impl Prefixer {
    pub fn new(target: BrowserTarget) -> Self {
        Self { target }
    }

    fn property_applies(&self, entry: &PropertyPrefix, value: &str) -> bool {
        self.target.needs(entry.min_level) && entry.only_value.map_or(true, |only| only == value)
    }

    /// A prefixed declaration the target no longer needs, shadowed by its
    /// standard form in the same block
    fn is_obsolete(&self, decl: &Declaration, present: &HashSet<(String, String)>) -> bool {
        let value = decl.value.trim().to_ascii_lowercase();

        if let Some((vendor, base)) = split_vendor(&decl.property) {
            if let Some(entry) = property_entry(base) {
                let needed = self.property_applies(entry, &value) && entry.prefixes.contains(&vendor);
                let standard_present = present.iter().any(|(p, _)| p == base);
                return !needed && standard_present;
            }
            return false;
        }

        VALUES.iter().any(|entry| {
            entry.properties.contains(&decl.property.as_str())
                && entry.prefixed.contains(&value.as_str())
                && !self.target.needs(entry.min_level)
                && present.contains(&(decl.property.clone(), entry.value.to_string()))
        })
    }

    fn prefix_block(&self, decls: &mut Vec<Declaration>) {
        let original = std::mem::take(decls);
        let present: HashSet<(String, String)> = original
            .iter()
            .map(|d| (d.property.clone(), d.value.trim().to_ascii_lowercase()))
            .collect();
        let has_property = |property: &str| present.iter().any(|(p, _)| p == property);

        for decl in original.iter() {
            if self.is_obsolete(decl, &present) {
                continue;
            }

            let value = decl.value.trim().to_ascii_lowercase();

            if let Some(entry) = property_entry(&decl.property) {
                if self.property_applies(entry, &value) {
                    for vendor in entry.prefixes {
                        let property = format!("{}{}", vendor, decl.property);
                        if !has_property(&property) {
                            decls.push(Declaration {
                                property,
                                ..decl.clone()
                            });
                        }
                    }
                }
            }

            if let Some(entry) = value_entry(&decl.property, &value) {
                if self.target.needs(entry.min_level) {
                    for prefixed in entry.prefixed {
                        if !present.contains(&(decl.property.clone(), prefixed.to_string())) {
                            decls.push(Declaration {
                                value: prefixed.to_string(),
                                ..decl.clone()
                            });
                        }
                    }
                }
            }

            decls.push(decl.clone());
        }
    }

    fn prefix_selectors(&self, nodes: Vec<Node>) -> Vec<Node> {
        let existing: HashSet<String> = nodes
            .iter()
            .filter_map(|node| match node {
                Node::Rule(rule) => Some(rule.selector.clone()),
                _ => None,
            })
            .collect();

        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Rule(rule) => {
                    for entry in SELECTORS.iter().filter(|e| self.target.needs(e.min_level)) {
                        if !rule.selector.contains(entry.pseudo) {
                            continue;
                        }
                        for prefixed in entry.prefixed {
                            let selector = rule.selector.replace(entry.pseudo, prefixed);
                            if !existing.contains(&selector) {
                                out.push(Node::Rule(Rule {
                                    selector,
                                    ..rule.clone()
                                }));
                            }
                        }
                    }
                    out.push(Node::Rule(rule));
                }
                Node::AtRule(mut at) if !at.name.eq_ignore_ascii_case("keyframes") => {
                    if let Some(AtRuleBody::Rules(children)) = at.body.take() {
                        at.body = Some(AtRuleBody::Rules(self.prefix_selectors(children)));
                    }
                    out.push(Node::AtRule(at));
                }
                other => out.push(other),
            }
        }
        out
    }

    fn prefix_keyframes(&self, nodes: Vec<Node>) -> Vec<Node> {
        let webkit_names: HashSet<String> = nodes
            .iter()
            .filter_map(|node| match node {
                Node::AtRule(at) if at.name.eq_ignore_ascii_case("-webkit-keyframes") => Some(at.prelude.trim().to_string()),
                _ => None,
            })
            .collect();

        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::AtRule(at) if at.name.eq_ignore_ascii_case("keyframes") => {
                    if !webkit_names.contains(at.prelude.trim()) {
                        out.push(Node::AtRule(webkit_keyframes(&at)));
                    }
                    out.push(Node::AtRule(at));
                }
                Node::AtRule(mut at) => {
                    if let Some(AtRuleBody::Rules(children)) = at.body.take() {
                        at.body = Some(AtRuleBody::Rules(self.prefix_keyframes(children)));
                    }
                    out.push(Node::AtRule(at));
                }
                other => out.push(other),
            }
        }
        out
    }
}

/// `@-webkit-keyframes` copy whose frames use `-webkit-` properties
fn webkit_keyframes(at: &AtRule) -> AtRule {
    let mut copy = AtRule {
        name: "-webkit-keyframes".to_string(),
        ..at.clone()
    };
    if let Some(AtRuleBody::Rules(frames)) = &mut copy.body {
        for frame in frames.iter_mut() {
            if let Node::Rule(rule) = frame {
                for decl in &mut rule.declarations {
                    let webkit = property_entry(&decl.property).is_some_and(|e| e.prefixes.contains(&"-webkit-"));
                    if webkit {
                        decl.property = format!("-webkit-{}", decl.property);
                    }
                }
            }
        }
    }
    copy
}

impl Processor for Prefixer {
    fn name(&self) -> &'static str {
        "autoprefixer"
    }

    fn stage(&self) -> Stage {
        Stage::Transform
    }

    fn process(&self, sheet: &mut Stylesheet, _ctx: &mut ProcessContext) -> Result<(), CssError> {
        if self.target.needs(KEYFRAMES_LEVEL) {
            let nodes = std::mem::take(&mut sheet.nodes);
            sheet.nodes = self.prefix_keyframes(nodes);
        }

        let nodes = std::mem::take(&mut sheet.nodes);
        sheet.nodes = self.prefix_selectors(nodes);

        prefix_blocks(&mut sheet.nodes, self);
        Ok(())
    }
}

/// Keyframe frames are left alone; `webkit_keyframes` handles their prefixes
fn prefix_blocks(nodes: &mut [Node], prefixer: &Prefixer) {
    for node in nodes {
        match node {
            Node::Rule(rule) => prefixer.prefix_block(&mut rule.declarations),
            Node::AtRule(at) if at.name.to_ascii_lowercase().ends_with("keyframes") => {}
            Node::AtRule(at) => match &mut at.body {
                Some(AtRuleBody::Rules(children)) => prefix_blocks(children, prefixer),
                Some(AtRuleBody::Declarations(decls)) => prefixer.prefix_block(decls),
                None => {}
            },
            Node::Comment(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::parser::parse;
    use crate::css::serialize::serialize;
    use std::path::Path;

    fn run(css: &str, level: u8) -> String {
        let mut sheet = Stylesheet {
            nodes: parse(css, 0, Path::new("t.css")).unwrap(),
            ..Default::default()
        };
        Prefixer::new(BrowserTarget::new(level))
            .process(&mut sheet, &mut ProcessContext::new())
            .unwrap();
        serialize(&sheet).css
    }

    fn queries(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_browser_queries() {
        assert_eq!(BrowserTarget::parse(&queries(&["last 2 versions"])).unwrap().level(), 2);
        assert_eq!(BrowserTarget::parse(&queries(&["last 1 version", "> 1%"])).unwrap().level(), 1);
        assert_eq!(BrowserTarget::parse(&queries(&["defaults, not dead"])).unwrap().level(), 2);
        assert_eq!(BrowserTarget::parse(&queries(&["last 4 Chrome versions"])).unwrap().level(), 4);
        assert_eq!(BrowserTarget::parse(&queries(&[">0.5%"])).unwrap().level(), 2);
        assert_eq!(BrowserTarget::parse(&[]).unwrap().level(), 0);
        assert_eq!(
            BrowserTarget::parse(&queries(&["last 2 versions", "every browser"])).unwrap_err(),
            ChainError::InvalidBrowserQuery("every browser".into())
        );
    }

    #[test]
    fn prefixes_properties_and_values() {
        let css = run("a { appearance: none; display: flex; position: sticky }", 2);
        assert_eq!(
            css,
            "a {\n  -webkit-appearance: none;\n  -moz-appearance: none;\n  appearance: none;\n  display: -webkit-box;\n  display: -ms-flexbox;\n  display: flex;\n  position: -webkit-sticky;\n  position: sticky;\n}\n"
        );
    }

    #[test]
    fn level_limits_prefixes() {
        let css = run("a { display: flex; transform: none }", 1);
        assert_eq!(css, "a {\n  display: flex;\n  transform: none;\n}\n");

        let css = run("a { transform: none }", 3);
        assert!(css.contains("-webkit-transform: none;"));
    }

    #[test]
    fn does_not_duplicate_existing_prefixes() {
        let css = run("a { -webkit-appearance: none; appearance: none }", 2);
        assert_eq!(css.matches("-webkit-appearance").count(), 1);
        assert!(css.contains("-moz-appearance: none;"));
    }

    #[test]
    fn background_clip_only_for_text() {
        assert!(run("a { background-clip: text }", 1).contains("-webkit-background-clip: text;"));
        assert!(!run("a { background-clip: padding-box }", 1).contains("-webkit-"));
    }

    #[test]
    fn removes_prefixes_the_target_no_longer_needs() {
        let css = run("a { -webkit-transform: none; transform: none; display: -webkit-box; display: flex }", 1);
        assert_eq!(css, "a {\n  transform: none;\n  display: flex;\n}\n");

        // without the standard form the prefixed one stays
        assert!(run("a { -webkit-transform: none }", 1).contains("-webkit-transform"));
    }

    #[test]
    fn duplicates_placeholder_rules() {
        let css = run("input::placeholder { color: gray }", 2);
        assert!(css.starts_with("input::-webkit-input-placeholder {"));
        assert!(css.contains("input::-moz-placeholder {"));
        assert!(css.contains("input:-ms-input-placeholder {"));
        assert!(css.contains("input::placeholder {"));
    }

    #[test]
    fn prefixes_keyframes_for_wide_targets() {
        let src = "@keyframes spin { from { transform: rotate(0) } to { transform: rotate(360deg) } }";
        assert!(!run(src, 2).contains("-webkit-keyframes"));

        let css = run(src, 3);
        assert!(css.starts_with("@-webkit-keyframes spin {\n  from {\n    -webkit-transform: rotate(0);\n  }"));
        assert!(css.contains("@keyframes spin {\n  from {\n    transform: rotate(0);\n  }"));
        assert_eq!(css.matches("-webkit-transform").count(), 2);
    }

    #[test]
    fn prefixes_inside_media_rules() {
        let css = run("@media print { a { user-select: none } }", 1);
        assert!(css.contains("    -ms-user-select: none;"));
    }
}
