//! themekit - build tasks for front-end themes

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = themekit::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
