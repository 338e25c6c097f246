//! Processor chain
//!
//! A processor rewrites a [`Stylesheet`] in place. The chain runs its
//! processors strictly in sequence; the order is fixed when the chain is
//! built and validated by stage: imports first, finalizers (minification)
//! last.

use std::fmt;
use std::path::Path;

use thiserror::Error;

use super::ast::{SourceLocation, Stylesheet};
use super::color::ColorFunctions;
use super::custom_properties::CustomProperties;
use super::error::{CssError, Warning};
use super::import::ImportInliner;
use super::minify::Minifier;
use super::prefixer::{BrowserTarget, Prefixer};

#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("Processor '{processor}' ({stage}) cannot run after '{previous}' ({previous_stage})")]
    OutOfOrder {
        processor: &'static str,
        stage: Stage,
        previous: &'static str,
        previous_stage: Stage,
    },

    #[error("Invalid browser query '{0}'")]
    InvalidBrowserQuery(String),
}

/// Where a processor may sit in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Assembles the full tree (import inlining)
    Assemble,
    /// Rewrites values and rules
    Transform,
    /// Must see the final tree (minification)
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Assemble => "assemble",
            Stage::Transform => "transform",
            Stage::Finalize => "finalize",
        })
    }
}

/// State shared by the processors of one compilation
#[derive(Debug, Default)]
pub struct ProcessContext {
    pub warnings: Vec<Warning>,
}

impl ProcessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, processor: &'static str, path: &Path, location: SourceLocation, message: impl Into<String>) {
        self.warnings.push(Warning {
            processor,
            path: path.to_path_buf(),
            line: location.line + 1,
            column: location.column + 1,
            message: message.into(),
        });
    }
}

/// One step of the chain
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage;

    fn process(&self, sheet: &mut Stylesheet, ctx: &mut ProcessContext) -> Result<(), CssError>;
}

/// Options for the standard chain
#[derive(Debug, Clone)]
pub struct ChainOptions {
    pub browsers: Vec<String>,
    pub minify: bool,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            browsers: vec!["last 2 versions".to_string()],
            minify: true,
        }
    }
}

/// An ordered, validated list of processors
pub struct ProcessorChain {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// imports, custom properties, color functions, prefixes, minification
    pub fn standard(options: &ChainOptions) -> Result<Self, ChainError> {
        let target = BrowserTarget::parse(&options.browsers)?;

        let mut builder = Self::builder()
            .push(ImportInliner::new())
            .push(CustomProperties::new())
            .push(ColorFunctions::new())
            .push(Prefixer::new(target));

        if options.minify {
            builder = builder.push(Minifier::new());
        }

        builder.build()
    }

    /// Processor names in run order
    pub fn names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Runs every processor in order; the first error ends the run
    pub fn run(&self, sheet: &mut Stylesheet, ctx: &mut ProcessContext) -> Result<(), CssError> {
        for processor in &self.processors {
            processor.process(sheet, ctx)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[derive(Default)]
pub struct ChainBuilder {
    processors: Vec<Box<dyn Processor>>,
}

impl ChainBuilder {
    pub fn push(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Validates stage order
    pub fn build(self) -> Result<ProcessorChain, ChainError> {
        for pair in self.processors.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            if next.stage() < previous.stage() {
                return Err(ChainError::OutOfOrder {
                    processor: next.name(),
                    stage: next.stage(),
                    previous: previous.name(),
                    previous_stage: previous.stage(),
                });
            }
        }

        Ok(ProcessorChain {
            processors: self.processors,
        })
    }
}
