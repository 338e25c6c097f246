//! themekit - build tasks for front-end themes
//!
//! Compiles a theme's stylesheets through a chain of CSS processors with
//! source maps, tells connected browsers to reload, rebuilds on change and
//! packages the theme into a zip archive. Tasks form a small dependency graph
//! executed in order.

pub mod cli;
pub mod css;
pub mod domain;
pub mod reload;
pub mod storage;

pub use domain::{TaskGraph, TaskName, TaskOutcome};
