//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::runner::TaskRunner;
use crate::domain::{TaskGraph, TaskName, TaskOutcome};
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "themekit")]
#[command(author, version, about = "Build tasks for front-end themes")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (defaults to the nearest directory with a package.json
    /// or themekit.toml)
    #[arg(long, short = 'C', global = true, env = "THEMEKIT_PROJECT")]
    pub project: Option<PathBuf>,

    /// Exit with an error when any stylesheet fails to compile
    #[arg(long, global = true)]
    pub strict: bool,

    /// Task to run (defaults to watch)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
pub enum Commands {
    /// Compile stylesheets
    Css,

    /// Compile stylesheets and check that the live-reload server can start.
    /// The server stops when the command exits; use `watch` to keep it running
    Build,

    /// Build, then rebuild stylesheets on every change
    Watch,

    /// Compile stylesheets and package the theme into dist/<name>.zip
    Zip,

    /// Show the task graph
    Tasks,

    /// Print the effective project configuration
    Config,
}

impl Commands {
    fn task(self) -> Option<TaskName> {
        match self {
            Commands::Css => Some(TaskName::Css),
            Commands::Build => Some(TaskName::Build),
            Commands::Watch => Some(TaskName::Watch),
            Commands::Zip => Some(TaskName::Zip),
            Commands::Tasks | Commands::Config => None,
        }
    }
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let global = Config::load_global()?;
    let format = cli.format.unwrap_or(global.default_format);
    let command = cli.command.unwrap_or(Commands::Watch);

    if let Commands::Tasks = command {
        let output = Output::new(format, cli.verbose);
        return show_tasks(&output);
    }

    let project = Project::locate(cli.project.as_deref())?;
    let output = Output::new(format, cli.verbose).with_bell(project.config().global.beep);
    output.verbose_ctx("project", &format!("Using project at {}", project.root().display()));

    match command.task() {
        Some(task) => run_task(&project, &output, task, cli.strict),
        None => show_config(&project, &output),
    }
}

fn run_task(project: &Project, output: &Output, task: TaskName, strict: bool) -> Result<()> {
    let mut runner = TaskRunner::new(project, output)?;
    let report = runner.run(task)?;
    let soft_failures = report.soft_failures();

    let fatal = report.outcomes.into_iter().find_map(|(task, outcome)| match outcome {
        TaskOutcome::Fatal(err) => Some(err.context(format!("Task '{}' failed", task))),
        _ => None,
    });
    if let Some(err) = fatal {
        return Err(err);
    }

    if strict && soft_failures > 0 {
        anyhow::bail!("{} stylesheet(s) failed to compile", soft_failures);
    }

    output.verbose("Command completed successfully");
    Ok(())
}

fn show_tasks(output: &Output) -> Result<()> {
    let graph = TaskGraph::standard()?;

    if output.is_json() {
        let tasks = TaskName::ALL
            .iter()
            .map(|&task| -> Result<serde_json::Value> {
                Ok(serde_json::json!({
                    "task": task,
                    "depends_on": graph.dependencies(task),
                    "needed_by": graph.dependents(task),
                    "plan": graph.execution_plan(task)?,
                }))
            })
            .collect::<Result<Vec<_>>>()?;
        output.data(&tasks);
        return Ok(());
    }

    println!("{:<8} {:<12} {:<12} PLAN", "TASK", "DEPENDS ON", "NEEDED BY");
    println!("{}", "-".repeat(52));
    for task in TaskName::ALL {
        let plan: Vec<&str> = graph.execution_plan(task)?.iter().map(TaskName::as_str).collect();
        println!(
            "{:<8} {:<12} {:<12} {}",
            task,
            task_list(&graph.dependencies(task)),
            task_list(&graph.dependents(task)),
            plan.join(" -> ")
        );
    }
    println!();
    println!("Default (no task): watch");

    Ok(())
}

/// Comma-separated task names, or `-` when there are none
fn task_list(tasks: &[TaskName]) -> String {
    if tasks.is_empty() {
        "-".to_string()
    } else {
        tasks.iter().map(TaskName::as_str).collect::<Vec<_>>().join(", ")
    }
}

fn show_config(project: &Project, output: &Output) -> Result<()> {
    let theme = &project.config().theme;

    if output.is_json() {
        output.data(&serde_json::json!({
            "project": project.root().display().to_string(),
            "config": theme,
        }));
    } else {
        println!("# {}", project.root().display());
        print!("{}", theme.to_toml()?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_watch() {
        let cli = Cli::try_parse_from(["themekit"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.command.unwrap_or(Commands::Watch).task(), Some(TaskName::Watch));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["themekit", "zip", "-f", "json", "--strict", "-C", "/tmp/theme"]).unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(cli.strict);
        assert_eq!(cli.project, Some(PathBuf::from("/tmp/theme")));
        assert_eq!(cli.command.and_then(Commands::task), Some(TaskName::Zip));
    }

    #[test]
    fn build_help_says_when_the_server_stops() {
        let cli = Cli::command();
        let build = cli.find_subcommand("build").unwrap();
        let about = build.get_about().unwrap().to_string();
        assert!(about.contains("The server stops when the command exits"));
    }

    #[test]
    fn unknown_task_is_rejected() {
        assert!(Cli::try_parse_from(["themekit", "deploy"]).is_err());
    }
}
