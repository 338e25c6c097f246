//! Task bodies
//!
//! [`TaskRunner`] binds each node of the task graph to its body and runs a
//! target through [`TaskGraph::execute`]. Bodies return
//! `anyhow::Result<TaskOutcome>`; an `Err` becomes a fatal outcome.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::time::Instant;

use anyhow::{Context, Result};
use notify_debouncer_mini::DebounceEventResult;

use super::output::Output;
use super::watch::{self, SourceWatcher};
use crate::css::CssPipeline;
use crate::domain::{ExecutionReport, TaskGraph, TaskName, TaskOutcome};
use crate::reload::ReloadServer;
use crate::storage::{write_archive, FileSet, Project};

pub struct TaskRunner<'a> {
    project: &'a Project,
    output: &'a Output,
    graph: TaskGraph,
    pipeline: CssPipeline,
    reload: Option<ReloadServer>,
}

impl<'a> TaskRunner<'a> {
    pub fn new(project: &'a Project, output: &'a Output) -> Result<Self> {
        let pipeline = CssPipeline::new(project.config()).context("Invalid CSS pipeline configuration")?;

        Ok(Self {
            project,
            output,
            graph: TaskGraph::standard()?,
            pipeline,
            reload: None,
        })
    }

    /// Runs `target` and everything it depends on
    pub fn run(&mut self, target: TaskName) -> Result<ExecutionReport> {
        let graph = std::mem::take(&mut self.graph);
        let report = graph.execute(target, |task| self.run_task(task));
        self.graph = graph;
        Ok(report?)
    }

    /// The live-reload server, once `build` has started it
    pub fn reload_server(&self) -> Option<&ReloadServer> {
        self.reload.as_ref()
    }

    fn run_task(&mut self, task: TaskName) -> TaskOutcome {
        self.output.task_started(task);
        let started = Instant::now();

        let outcome: TaskOutcome = match task {
            TaskName::Css => self.css(),
            TaskName::Build => self.build(),
            TaskName::Watch => self.watch(),
            TaskName::Zip => self.zip(),
        }
        .into();

        match &outcome {
            TaskOutcome::Fatal(_) => self.output.log(&format!(
                "'{}' errored after {} ms",
                task,
                started.elapsed().as_millis()
            )),
            _ => self.output.task_finished(task, started.elapsed()),
        }
        outcome
    }

    fn css(&self) -> Result<TaskOutcome> {
        let report = self.pipeline.run()?;

        for failure in &report.failures {
            self.output.diagnostic(TaskName::Css, &failure.diagnostic());
        }
        for warning in report.warnings() {
            self.output.warn(&warning.to_string());
        }
        for file in &report.files {
            self.output.verbose_ctx(
                "css",
                &format!(
                    "{} -> {}{}",
                    self.display(&file.source),
                    self.display(&file.output),
                    if file.changed { "" } else { " (unchanged)" }
                ),
            );
        }

        if let Some(server) = &self.reload {
            for path in report.changed_outputs() {
                let name = self.display(path);
                let clients = server.notify(&name);
                self.output.verbose_ctx("reload", &format!("{} -> {} client(s)", name, clients));
            }
        }

        if self.output.is_json() {
            let failures: Vec<serde_json::Value> = report
                .failures
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "source": self.display(&f.source),
                        "kind": f.error.kind(),
                        "path": self.display(f.error.path()),
                        "message": f.diagnostic(),
                    })
                })
                .collect();
            self.output.data(&serde_json::json!({
                "task": TaskName::Css,
                "files": report.files,
                "failures": failures,
            }));
        }

        Ok(if report.is_clean() {
            TaskOutcome::Success
        } else {
            TaskOutcome::Partial {
                failures: report.failures.len(),
            }
        })
    }

    fn build(&mut self) -> Result<TaskOutcome> {
        let config = &self.project.config().theme.reload;
        if !config.enabled {
            self.output.verbose_ctx("build", "Live reload disabled");
            return Ok(TaskOutcome::Success);
        }

        if self.reload.is_none() {
            let server = ReloadServer::start(config.port)?;
            self.output.log(&format!("Live reload listening on {}", server.addr()));
            if self.output.is_json() {
                self.output.data(&serde_json::json!({
                    "task": TaskName::Build,
                    "reload": { "address": server.addr().to_string(), "port": server.port() },
                }));
            }
            self.reload = Some(server);
        }

        Ok(TaskOutcome::Success)
    }

    fn watch(&self) -> Result<TaskOutcome> {
        let source_dir = self.pipeline.source_dir();
        let debounce = self.project.config().theme.watch.debounce();
        let watcher = SourceWatcher::start(source_dir, debounce)?;

        self.output.log(&format!("Watching {}", self.display(source_dir)));
        self.watch_events(watcher.events());

        Ok(TaskOutcome::Success)
    }

    /// Recompiles once per batch of relevant source events until `events`
    /// closes; writes under the output directory never count. Returns the
    /// number of runs.
    pub fn watch_events(&self, events: &Receiver<DebounceEventResult>) -> usize {
        let output_dir = self.pipeline.output_dir();
        let is_relevant = |path: &Path| self.pipeline.is_relevant(path) && !path.starts_with(output_dir);

        watch::run_loop(events, is_relevant, self.output, |paths| {
            for path in paths {
                self.output.verbose_ctx("watch", &format!("Changed: {}", self.display(path)));
            }

            self.output.task_started(TaskName::Css);
            let started = Instant::now();
            match TaskOutcome::from(self.css()) {
                TaskOutcome::Fatal(e) => self.output.error(&format!("{:#}", e)),
                _ => self.output.task_finished(TaskName::Css, started.elapsed()),
            }
            ControlFlow::Continue(())
        })
    }

    fn zip(&self) -> Result<TaskOutcome> {
        let config = self.project.config();
        let manifest = self.project.manifest()?;

        let mut exclude = config.theme.package.exclude.clone();
        if let Some(dist) = self.project.relative_path(&config.dist_dir()) {
            let pattern = glob::Pattern::escape(&to_slash(&dist));
            if !pattern.is_empty() && !exclude.contains(&pattern) {
                exclude.push(pattern);
            }
        }

        let files = FileSet::new(self.project.root(), &exclude)?;
        let dest = config.dist_dir().join(manifest.archive_name());
        let report = write_archive(&files, &dest).context("Failed to package theme")?;

        if self.output.is_json() {
            self.output.data(&serde_json::json!({
                "task": TaskName::Zip,
                "archive": report,
            }));
        } else {
            self.output.log(&format!(
                "Packaged {} file(s) into {} ({} bytes)",
                report.entries,
                self.display(&report.path),
                report.bytes
            ));
        }

        Ok(TaskOutcome::Success)
    }

    /// Project-relative path with `/` separators, or the path as given
    fn display(&self, path: &Path) -> String {
        match self.project.relative_path(path) {
            Some(relative) => to_slash(&relative),
            None => path.display().to_string(),
        }
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind};
    use std::fs;
    use std::io::Read;
    use std::net::TcpStream;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn theme_project(extra_config: &str) -> (TempDir, Project) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("package.json"), r#"{"name":"casper","version":"1.0.0"}"#).unwrap();
        fs::write(
            root.join("themekit.toml"),
            format!("[reload]\nport = 0\n{}", extra_config),
        )
        .unwrap();
        fs::create_dir_all(root.join("assets/css")).unwrap();
        fs::write(root.join("index.hbs"), "{{body}}").unwrap();
        let project = Project::open(root).unwrap();
        (dir, project)
    }

    fn quiet() -> Output {
        Output::new(OutputFormat::Json, false)
    }

    #[test]
    fn css_compiles_sources() {
        let (dir, project) = theme_project("");
        fs::write(dir.path().join("assets/css/screen.css"), ".a { margin: 0px; }").unwrap();

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        let report = runner.run(TaskName::Css).unwrap();

        assert_eq!(report.tasks(), vec![TaskName::Css]);
        assert!(matches!(report.outcomes[0].1, TaskOutcome::Success));
        let css = fs::read_to_string(dir.path().join("assets/built/screen.css")).unwrap();
        assert!(css.starts_with(".a{margin:0}"));
        assert!(dir.path().join("assets/built/screen.css.map").is_file());
    }

    #[test]
    fn broken_stylesheet_is_a_soft_failure() {
        let (dir, project) = theme_project("");
        fs::write(dir.path().join("assets/css/a.css"), ".a { color: red;").unwrap();
        fs::write(dir.path().join("assets/css/b.css"), ".b { color: blue; }").unwrap();

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        let report = runner.run(TaskName::Zip).unwrap();

        assert_eq!(report.tasks(), vec![TaskName::Css, TaskName::Zip]);
        assert!(report.outcomes[0].1.is_partial());
        assert_eq!(report.soft_failures(), 1);
        assert!(report.fatal().is_none());
        assert!(dir.path().join("assets/built/b.css").is_file());
        assert!(!dir.path().join("assets/built/a.css").exists());
    }

    #[test]
    fn missing_source_dir_is_fatal() {
        let (dir, project) = theme_project("");
        fs::remove_dir_all(dir.path().join("assets/css")).unwrap();

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        let report = runner.run(TaskName::Zip).unwrap();

        assert_eq!(report.tasks(), vec![TaskName::Css]);
        let (task, err) = report.fatal().unwrap();
        assert_eq!(task, TaskName::Css);
        assert!(err.to_string().contains("assets/css"));
        assert!(!dir.path().join("dist").exists());
    }

    #[test]
    fn zip_packages_fresh_output() {
        let (dir, project) = theme_project("");
        let root = dir.path();
        fs::write(root.join("assets/css/screen.css"), "a { color: red }").unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "x").unwrap();
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::write(root.join("dist/old.zip"), "stale").unwrap();

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        let report = runner.run(TaskName::Zip).unwrap();
        assert!(report.fatal().is_none());

        let file = fs::File::open(root.join("dist/casper.zip")).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = archive.file_names().map(String::from).collect();
        assert!(names.contains(&"assets/built/screen.css".to_string()));
        assert!(names.contains(&"index.hbs".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("node_modules/") || n.starts_with("dist/")));

        let mut compiled = String::new();
        archive
            .by_name("assets/built/screen.css")
            .unwrap()
            .read_to_string(&mut compiled)
            .unwrap();
        assert!(compiled.starts_with("a{color:red}"));
    }

    #[test]
    fn custom_dist_dir_is_excluded() {
        let (dir, project) = theme_project("[package]\ndist_dir = \"release\"\n");
        fs::create_dir_all(dir.path().join("release")).unwrap();
        fs::write(dir.path().join("release/previous.zip"), "old").unwrap();

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        runner.run(TaskName::Zip).unwrap();

        let file = fs::File::open(dir.path().join("release/casper.zip")).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        assert!(!archive.file_names().any(|n| n.starts_with("release/")));
    }

    #[test]
    fn zip_without_manifest_is_fatal() {
        let (dir, project) = theme_project("");
        fs::remove_file(dir.path().join("package.json")).unwrap();

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        let report = runner.run(TaskName::Zip).unwrap();

        assert_eq!(report.fatal().map(|(task, _)| task), Some(TaskName::Zip));
    }

    #[test]
    fn build_starts_reload_server() {
        let (dir, project) = theme_project("");
        fs::write(dir.path().join("assets/css/screen.css"), "a{}").unwrap();

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        let report = runner.run(TaskName::Build).unwrap();

        assert_eq!(report.tasks(), vec![TaskName::Css, TaskName::Build]);
        let server = runner.reload_server().unwrap();
        assert_ne!(server.port(), 0);
    }

    #[test]
    fn disabled_reload_skips_server() {
        let (_dir, project) = theme_project("enabled = false\n");

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        runner.run(TaskName::Build).unwrap();

        assert!(runner.reload_server().is_none());
    }

    #[test]
    fn port_in_use_fails_build() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"t"}"#).unwrap();
        fs::write(dir.path().join("themekit.toml"), format!("[reload]\nport = {}\n", port)).unwrap();
        fs::create_dir_all(dir.path().join("assets/css")).unwrap();
        let project = Project::open(dir.path()).unwrap();

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        let report = runner.run(TaskName::Build).unwrap();

        assert_eq!(report.fatal().map(|(task, _)| task), Some(TaskName::Build));
    }

    fn changed(path: PathBuf) -> DebounceEventResult {
        Ok(vec![DebouncedEvent {
            path,
            kind: DebouncedEventKind::Any,
        }])
    }

    fn connect_client(port: u16) -> tungstenite::WebSocket<TcpStream> {
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let (ws, _) = tungstenite::client(format!("ws://127.0.0.1:{}/livereload", port), stream).unwrap();
        ws
    }

    fn wait_for_client(server: &ReloadServer) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.client_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn next_text(ws: &mut tungstenite::WebSocket<TcpStream>) -> String {
        loop {
            if let tungstenite::Message::Text(text) = ws.read().unwrap() {
                return text.as_str().to_string();
            }
        }
    }

    #[test]
    fn watch_recompiles_and_notifies_reload_clients() {
        let (dir, project) = theme_project("");
        let root = project.root().to_path_buf();
        let source = root.join("assets/css/screen.css");
        fs::write(&source, "a { color: red }").unwrap();

        let output = quiet();
        let mut runner = TaskRunner::new(&project, &output).unwrap();
        runner.run(TaskName::Build).unwrap();
        let server = runner.reload_server().unwrap();
        let mut client = connect_client(server.port());
        wait_for_client(server);

        fs::write(&source, "a { color: blue }").unwrap();
        let (tx, rx) = mpsc::channel();
        tx.send(changed(source.clone())).unwrap();
        tx.send(changed(root.join("assets/built/screen.css"))).unwrap();
        drop(tx);

        assert_eq!(runner.watch_events(&rx), 1);
        assert_eq!(
            next_text(&mut client),
            r#"{"command":"reload","path":"assets/built/screen.css","liveCSS":true}"#
        );
        let css = fs::read_to_string(dir.path().join("assets/built/screen.css")).unwrap();
        assert!(css.starts_with("a{color:blue}"));
    }

    #[test]
    fn output_dir_events_do_not_recompile() {
        let (_dir, project) = theme_project("[css]\noutput_dir = \"assets/css/built\"\n");
        let root = project.root().to_path_buf();

        let output = quiet();
        let runner = TaskRunner::new(&project, &output).unwrap();
        let (tx, rx) = mpsc::channel();
        tx.send(changed(root.join("assets/css/built/screen.css"))).unwrap();
        tx.send(changed(root.join("assets/css/built/screen.css.map"))).unwrap();
        drop(tx);

        assert_eq!(runner.watch_events(&rx), 0);
        assert!(!root.join("assets/css/built").exists());
    }

    #[test]
    fn one_edit_is_one_run_over_a_quiet_window() {
        let (_dir, project) = theme_project("[css]\noutput_dir = \"assets/css/built\"\n");
        let root = project.root().canonicalize().unwrap();
        let source_dir = root.join("assets/css");
        let source = source_dir.join("screen.css");
        fs::write(&source, "a { color: red }").unwrap();

        // forward real watcher events until nothing arrives for a while; the
        // compile writes into the watched tree while this runs
        let (tx, rx) = mpsc::channel();
        let forwarder = thread::spawn(move || {
            let watcher = SourceWatcher::start(&source_dir, Duration::from_millis(100)).unwrap();
            thread::sleep(Duration::from_millis(200));
            fs::write(&source, "a { color: blue }").unwrap();
            let quiet_window = Duration::from_millis(1500);
            while let Ok(result) = watcher.events().recv_timeout(quiet_window) {
                if tx.send(result).is_err() {
                    break;
                }
            }
        });

        let output = quiet();
        let runner = TaskRunner::new(&project, &output).unwrap();
        let runs = runner.watch_events(&rx);
        forwarder.join().unwrap();

        assert_eq!(runs, 1);
        let css = fs::read_to_string(root.join("assets/css/built/screen.css")).unwrap();
        assert!(css.starts_with("a{color:blue}"));
    }
}
