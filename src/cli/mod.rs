//! # Command-Line Interface
//!
//! Task commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Runs |
//! |---------|------|
//! | `css` | css |
//! | `build` | css, build |
//! | `watch` (default) | css, build, watch |
//! | `zip` | css, zip |
//! | `tasks` | Prints the task graph |
//! | `config` | Prints the effective configuration |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Timestamped progress lines
//! - `json` - One JSON object per task report
//!
//! ## Exit Status
//!
//! A stylesheet that fails to compile is reported and skipped; the command
//! still succeeds unless `--strict` is given. Any other task failure exits 1.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod runner;
mod watch;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
pub use runner::TaskRunner;
pub use watch::{next_batch, Batch, SourceWatcher};
