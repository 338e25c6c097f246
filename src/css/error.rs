//! Errors and warnings raised while compiling a stylesheet

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A failure that ends processing of one stylesheet
///
/// Line and column are 1-based, ready for display.
#[derive(Debug, Error)]
pub enum CssError {
    #[error("{}:{line}:{column}: {message}", path.display())]
    Syntax {
        path: PathBuf,
        line: u32,
        column: u32,
        message: String,
    },

    #[error("{}:{line}:{column}: cannot resolve import '{target}'", path.display())]
    Import {
        path: PathBuf,
        line: u32,
        column: u32,
        target: String,
    },

    #[error("{}:{line}:{column}: {message}", path.display())]
    Color {
        path: PathBuf,
        line: u32,
        column: u32,
        message: String,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CssError {
    /// Path of the file the error points into
    pub fn path(&self) -> &Path {
        match self {
            CssError::Syntax { path, .. }
            | CssError::Import { path, .. }
            | CssError::Color { path, .. }
            | CssError::Io { path, .. } => path,
        }
    }

    /// Short category name used in JSON reports
    pub fn kind(&self) -> &'static str {
        match self {
            CssError::Syntax { .. } => "syntax",
            CssError::Import { .. } => "import",
            CssError::Color { .. } => "color",
            CssError::Io { .. } => "io",
        }
    }
}

/// A non-fatal problem noticed by a processor
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Warning {
    pub processor: &'static str,
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} ({})",
            self.path.display(),
            self.line,
            self.column,
            self.message,
            self.processor
        )
    }
}
