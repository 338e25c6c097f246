//! Task names and task outcomes

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("Unknown task '{0}' (expected one of: css, build, watch, zip)")]
pub struct UnknownTask(pub String);

/// A named unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskName {
    /// Compile stylesheets
    Css,
    /// Start the live reload listener
    Build,
    /// Rebuild stylesheets on change
    Watch,
    /// Package the theme
    Zip,
}

impl TaskName {
    pub const ALL: [TaskName; 4] = [TaskName::Css, TaskName::Build, TaskName::Watch, TaskName::Zip];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::Css => "css",
            TaskName::Build => "build",
            TaskName::Watch => "watch",
            TaskName::Zip => "zip",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "css" => Ok(TaskName::Css),
            "build" => Ok(TaskName::Build),
            "watch" => Ok(TaskName::Watch),
            "zip" => Ok(TaskName::Zip),
            other => Err(UnknownTask(other.to_string())),
        }
    }
}

/// Result of running one task body
///
/// `Partial` is a soft failure: some inputs were skipped but the graph keeps
/// going. `Fatal` stops the graph.
#[derive(Debug)]
pub enum TaskOutcome {
    Success,
    Partial { failures: usize },
    Fatal(anyhow::Error),
}

impl TaskOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskOutcome::Fatal(_))
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, TaskOutcome::Partial { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Partial { .. } => "partial",
            TaskOutcome::Fatal(_) => "fatal",
        }
    }
}

impl From<anyhow::Result<TaskOutcome>> for TaskOutcome {
    fn from(result: anyhow::Result<TaskOutcome>) -> Self {
        result.unwrap_or_else(TaskOutcome::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_task_names() {
        assert_eq!("css".parse::<TaskName>().unwrap(), TaskName::Css);
        assert_eq!("BUILD".parse::<TaskName>().unwrap(), TaskName::Build);
        assert_eq!(" zip ".parse::<TaskName>().unwrap(), TaskName::Zip);
        assert_eq!(
            "deploy".parse::<TaskName>(),
            Err(UnknownTask("deploy".to_string()))
        );
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for task in TaskName::ALL {
            assert_eq!(task.to_string().parse::<TaskName>().unwrap(), task);
        }
    }

    #[test]
    fn outcome_from_error_is_fatal() {
        let outcome: TaskOutcome = Err(anyhow::anyhow!("disk full")).into();
        assert!(outcome.is_fatal());
        assert_eq!(outcome.label(), "fatal");

        let outcome: TaskOutcome = Ok(TaskOutcome::Partial { failures: 2 }).into();
        assert!(outcome.is_partial());
    }
}
