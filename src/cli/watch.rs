//! Source directory watching
//!
//! File events are debounced by `notify-debouncer-mini`, then handled one
//! batch at a time on the calling thread. Whatever piles up in the channel
//! while a run is in flight becomes a single follow-up batch.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use super::output::Output;

/// A recursive, debounced watch on one directory
pub struct SourceWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    rx: Receiver<DebounceEventResult>,
}

impl SourceWatcher {
    pub fn start(dir: &Path, debounce: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        let mut debouncer = new_debouncer(debounce, tx).context("Failed to create file watcher")?;
        debouncer
            .watcher()
            .watch(dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        Ok(Self {
            _debouncer: debouncer,
            rx,
        })
    }

    pub fn events(&self) -> &Receiver<DebounceEventResult> {
        &self.rx
    }
}

/// Relevant paths and watcher errors gathered for one run
#[derive(Debug, Default)]
pub struct Batch {
    pub paths: Vec<PathBuf>,
    pub errors: Vec<String>,
}

impl Batch {
    fn absorb(&mut self, result: DebounceEventResult, is_relevant: &impl Fn(&Path) -> bool) {
        match result {
            Ok(events) => {
                for event in events {
                    if is_relevant(&event.path) && !self.paths.contains(&event.path) {
                        self.paths.push(event.path);
                    }
                }
            }
            Err(error) => self.errors.push(format!("{:?}", error)),
        }
    }
}

/// Blocks for the next debounced result, then drains everything already
/// queued into the same batch. `None` once the channel is closed.
pub fn next_batch(rx: &Receiver<DebounceEventResult>, is_relevant: &impl Fn(&Path) -> bool) -> Option<Batch> {
    let first = rx.recv().ok()?;

    let mut batch = Batch::default();
    batch.absorb(first, is_relevant);
    while let Ok(queued) = rx.try_recv() {
        batch.absorb(queued, is_relevant);
    }

    batch.paths.sort();
    Some(batch)
}

/// Runs `on_change` once per batch with relevant paths, until the channel
/// closes or the callback breaks
pub fn run_loop<F>(
    rx: &Receiver<DebounceEventResult>,
    is_relevant: impl Fn(&Path) -> bool,
    output: &Output,
    mut on_change: F,
) -> usize
where
    F: FnMut(&[PathBuf]) -> ControlFlow<()>,
{
    let mut runs = 0;

    while let Some(batch) = next_batch(rx, &is_relevant) {
        for error in &batch.errors {
            output.warn(&format!("Watch error: {}", error));
        }

        if batch.paths.is_empty() {
            output.verbose_ctx("watch", "Ignoring irrelevant change");
            continue;
        }

        output.verbose_ctx("watch", &format!("{} file(s) changed", batch.paths.len()));
        runs += 1;
        if on_change(&batch.paths).is_break() {
            break;
        }
    }

    runs
}
