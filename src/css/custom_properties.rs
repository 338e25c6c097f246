//! Custom property resolution
//!
//! Custom properties declared on top-level `:root` rules are substituted into
//! every `var()` reference. Definitions that were fully resolved are removed;
//! a definition stays when its own value cannot be resolved or when the
//! output still references it.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;

use super::ast::{Declaration, Node, Stylesheet};
use super::chain::{ProcessContext, Processor, Stage};
use super::error::CssError;
use super::value::{find_function, replace_functions, split_top_level};

const NAME: &str = "custom-properties";

#[derive(Debug, Default)]
pub struct CustomProperties;

impl CustomProperties {
    pub fn new() -> Self {
        Self
    }
}

fn is_root_selector(selector: &str) -> bool {
    selector.trim() == ":root"
}

/// Why a value could not be fully resolved
#[derive(Debug, Clone, PartialEq)]
enum Unresolved {
    Undefined(String),
    Circular(String),
}

struct Resolver<'a> {
    definitions: &'a HashMap<String, String>,
}

impl Resolver<'_> {
    /// Substitutes `var()` references; unresolvable references are left in place
    fn resolve(&self, value: &str, stack: &mut Vec<String>, problems: &mut Vec<Unresolved>) -> String {
        let result: Result<String, Infallible> = replace_functions(value, "var", |args| {
            let parts = split_top_level(args, ',');
            let name = parts[0].trim().to_string();
            let fallback = if parts.len() > 1 {
                Some(args[parts[0].len() + 1..].trim().to_string())
            } else {
                None
            };

            if stack.contains(&name) {
                problems.push(Unresolved::Circular(name));
                return Ok(None);
            }

            if let Some(definition) = self.definitions.get(&name) {
                stack.push(name.clone());
                let resolved = self.resolve(definition, stack, problems);
                stack.pop();
                if find_function(&resolved, "var", 0).is_none() {
                    return Ok(Some(resolved));
                }
            }

            match fallback {
                Some(fallback) => Ok(Some(self.resolve(&fallback, stack, problems))),
                None => {
                    if !self.definitions.contains_key(&name) {
                        problems.push(Unresolved::Undefined(name));
                    }
                    Ok(None)
                }
            }
        });

        match result {
            Ok(resolved) => resolved,
            Err(never) => match never {},
        }
    }
}

/// Names of every `var()` reference in `value`, fallbacks included
fn collect_references(value: &str, names: &mut HashSet<String>) {
    let mut cursor = 0;
    while let Some(call) = find_function(value, "var", cursor) {
        let args = call.args(value);
        let parts = split_top_level(args, ',');
        names.insert(parts[0].trim().to_string());
        if parts.len() > 1 {
            collect_references(&args[parts[0].len() + 1..], names);
        }
        cursor = call.end();
    }
}

/// Definitions that must stay in the output: those whose value cannot be
/// resolved and those still referenced after substitution, followed through
/// the values of the kept definitions
fn still_needed(sheet: &mut Stylesheet, resolver: &Resolver<'_>) -> HashSet<String> {
    let mut pending: Vec<String> = resolver
        .definitions
        .iter()
        .filter(|(name, value)| {
            let resolved = resolver.resolve(value, &mut vec![(*name).clone()], &mut Vec::new());
            find_function(&resolved, "var", 0).is_some()
        })
        .map(|(name, _)| name.clone())
        .collect();

    let mut referenced = HashSet::new();
    sheet.for_each_declaration_mut(|decl| collect_references(&decl.value, &mut referenced));
    pending.extend(referenced.into_iter().filter(|name| resolver.definitions.contains_key(name)));

    let mut keep = HashSet::new();
    while let Some(name) = pending.pop() {
        if !keep.insert(name.clone()) {
            continue;
        }
        if let Some(value) = resolver.definitions.get(&name) {
            let mut nested = HashSet::new();
            collect_references(value, &mut nested);
            pending.extend(nested.into_iter().filter(|n| resolver.definitions.contains_key(n)));
        }
    }
    keep
}

impl Processor for CustomProperties {
    fn name(&self) -> &'static str {
        NAME
    }

    fn stage(&self) -> Stage {
        Stage::Transform
    }

    fn process(&self, sheet: &mut Stylesheet, ctx: &mut ProcessContext) -> Result<(), CssError> {
        // pull the definitions out before substitution so they are not
        // rewritten or reported
        let mut definitions = HashMap::new();
        let mut pulled: Vec<(usize, Vec<Declaration>)> = Vec::new();
        for (index, node) in sheet.nodes.iter_mut().enumerate() {
            if let Node::Rule(rule) = node {
                if is_root_selector(&rule.selector) {
                    let (custom, regular): (Vec<Declaration>, Vec<Declaration>) =
                        std::mem::take(&mut rule.declarations)
                            .into_iter()
                            .partition(Declaration::is_custom_property);
                    rule.declarations = regular;
                    for decl in &custom {
                        definitions.insert(decl.property.clone(), decl.value.clone());
                    }
                    if !custom.is_empty() {
                        pulled.push((index, custom));
                    }
                }
            }
        }

        let resolver = Resolver {
            definitions: &definitions,
        };
        let mut reports = Vec::new();
        sheet.for_each_declaration_mut(|decl| {
            if find_function(&decl.value, "var", 0).is_none() {
                return;
            }
            let mut problems = Vec::new();
            decl.value = resolver.resolve(&decl.value, &mut Vec::new(), &mut problems);
            for problem in problems {
                reports.push((decl.location, problem));
            }
        });

        for (location, problem) in reports {
            let message = match problem {
                Unresolved::Undefined(name) => format!("variable '{}' is undefined and used without a fallback", name),
                Unresolved::Circular(name) => format!("circular reference to variable '{}'", name),
            };
            let path = sheet.source_path(location).to_path_buf();
            ctx.warn(NAME, &path, location, message);
        }

        let keep = still_needed(sheet, &resolver);
        for (index, custom) in pulled {
            if let Some(Node::Rule(rule)) = sheet.nodes.get_mut(index) {
                let kept: Vec<Declaration> = custom.into_iter().filter(|d| keep.contains(&d.property)).collect();
                rule.declarations.splice(0..0, kept);
            }
        }
        sheet.nodes.retain(|node| match node {
            Node::Rule(rule) => !(is_root_selector(&rule.selector) && rule.declarations.is_empty()),
            _ => true,
        });

        Ok(())
    }
}
