//! # CSS Pipeline
//!
//! Parses stylesheets into a small tree, rewrites the tree with an ordered
//! chain of processors and serializes it back with a source map.
//!
//! ## Processors
//!
//! | Name | Stage | Does |
//! |------|-------|------|
//! | `import` | assemble | Inlines local `@import`s, recursively |
//! | `custom-properties` | transform | Substitutes `:root` custom properties into `var()` |
//! | `color-function` | transform | Evaluates `color()` adjusters |
//! | `autoprefixer` | transform | Adds vendor prefixes for the browser target |
//! | `minify` | finalize | Compacts values and output |
//!
//! Every node keeps the location it was parsed from, so one source map
//! covers all processors at once.

mod ast;
mod chain;
mod color;
mod custom_properties;
mod error;
mod import;
mod minify;
mod parser;
mod pipeline;
mod prefixer;
mod serialize;
mod sourcemap;
mod value;

pub use ast::{AtRule, AtRuleBody, Comment, Declaration, Node, OutputStyle, Rule, Source, SourceLocation, Stylesheet};
pub use chain::{ChainBuilder, ChainError, ChainOptions, ProcessContext, Processor, ProcessorChain, Stage};
pub use color::{parse_color, Rgba};
pub use error::{CssError, Warning};
pub use pipeline::{BuildReport, CompiledFile, CssPipeline, FileFailure, FileReport, PipelineError};
pub use prefixer::BrowserTarget;
pub use sourcemap::{Mapping, SourceMap};
pub use parser::parse;
pub use serialize::{serialize, Serialized};
