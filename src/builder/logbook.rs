//! The logbook: an append-only record of a build.
//!
//! Every note is mirrored to `tracing` as it is appended. At the end of a
//! build the logbook is flushed to `logbook.md` (for humans) and
//! `logbook.json` (one note per line) in the workspace directory.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::builder::call::{ToolRun, SUMMARY_WIDTH};
use crate::util::fs::write_string;

/// Severity of a logbook message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

/// A logbook entry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Note {
    Caption { text: String },
    Message { level: Level, text: String },
    Run(ToolRun),
}

/// Thread-safe note collection.
#[derive(Debug)]
pub struct Logbook {
    started: Instant,
    notes: Mutex<Vec<Note>>,
}

impl Default for Logbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Logbook {
    pub fn new() -> Self {
        Logbook {
            started: Instant::now(),
            notes: Mutex::new(Vec::new()),
        }
    }

    fn append(&self, note: Note) {
        self.notes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(note);
    }

    pub fn caption(&self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        self.append(Note::Caption { text });
    }

    pub fn log(&self, level: Level, text: impl Into<String>) {
        let text = text.into();
        match level {
            Level::Trace => trace!("{}", text),
            Level::Debug => debug!("{}", text),
            Level::Info => info!("{}", text),
            Level::Warning => warn!("{}", text),
            Level::Error => error!("{}", text),
        }
        self.append(Note::Message { level, text });
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.log(Level::Debug, text);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(Level::Info, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.log(Level::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(Level::Error, text);
    }

    /// Record a tool run.
    pub fn run(&self, run: ToolRun) {
        if run.is_successful() {
            debug!("{}", run.summary(SUMMARY_WIDTH));
        } else {
            error!("{} failed with exit code {}", run.summary(SUMMARY_WIDTH), run.code);
            for line in run.output.lines().chain(run.errors.lines()) {
                error!("  {}", line);
            }
        }
        self.append(Note::Run(run));
    }

    /// Snapshot of all notes.
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn runs(&self) -> Vec<ToolRun> {
        self.notes()
            .into_iter()
            .filter_map(|note| match note {
                Note::Run(run) => Some(run),
                _ => None,
            })
            .collect()
    }

    /// Error messages and failed runs, in order of appearance.
    pub fn errors(&self) -> Vec<String> {
        self.notes()
            .into_iter()
            .filter_map(|note| match note {
                Note::Message {
                    level: Level::Error,
                    text,
                } => Some(text),
                Note::Run(run) if !run.is_successful() => Some(format!(
                    "{} failed with exit code {}",
                    run.summary(SUMMARY_WIDTH),
                    run.code
                )),
                _ => None,
            })
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Write `logbook.md` and `logbook.json` into `directory`.
    pub fn flush(&self, directory: &Path, title: &str) -> Result<PathBuf> {
        let notes = self.notes();
        let markdown = self.to_markdown(&notes, title);
        let path = directory.join("logbook.md");
        write_string(&path, &markdown)?;

        let mut json = String::new();
        for note in &notes {
            json.push_str(&serde_json::to_string(note)?);
            json.push('\n');
        }
        write_string(&directory.join("logbook.json"), &json)?;

        debug!("Logbook written to {}", path.display());
        Ok(path)
    }

    fn to_markdown(&self, notes: &[Note], title: &str) -> String {
        let runs: Vec<&ToolRun> = notes
            .iter()
            .filter_map(|note| match note {
                Note::Run(run) => Some(run),
                _ => None,
            })
            .collect();
        let errors = self.errors();

        let mut md = String::new();
        let _ = writeln!(md, "# Logbook of {}", title);
        md.push('\n');
        let _ = writeln!(md, "- Duration: {} ms", self.uptime().as_millis());
        let _ = writeln!(md, "- Tool runs: {}", runs.len());
        let _ = writeln!(md, "- Errors: {}", errors.len());
        md.push('\n');

        md.push_str("## Tool Runs\n\n");
        md.push_str("| # | Thread | Duration | Code | Call |\n");
        md.push_str("|--:|--------|---------:|-----:|------|\n");
        for (i, run) in runs.iter().enumerate() {
            let _ = writeln!(
                md,
                "| {} | {} | {} ms | {} | `{}` |",
                i + 1,
                run.thread,
                run.duration.as_millis(),
                run.code,
                run.summary(SUMMARY_WIDTH).replace('|', "\\|")
            );
        }
        md.push('\n');

        for (i, run) in runs.iter().enumerate() {
            if run.output.trim().is_empty() && run.errors.trim().is_empty() {
                continue;
            }
            let _ = writeln!(md, "### Run {}: `{}`\n", i + 1, run.name);
            let _ = writeln!(md, "```text\n{}\n```\n", run.summary(usize::MAX));
            for (label, text) in [("Output", &run.output), ("Errors", &run.errors)] {
                if text.trim().is_empty() {
                    continue;
                }
                let _ = writeln!(md, "{}:\n\n```text\n{}\n```\n", label, text.trim_end());
            }
        }

        md.push_str("## Messages\n\n");
        for note in notes {
            match note {
                Note::Caption { text } => {
                    let _ = writeln!(md, "**{}**", text);
                }
                Note::Message { level, text } => {
                    let _ = writeln!(md, "- `{:?}` {}", level, text);
                }
                Note::Run(_) => {}
            }
        }
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn run(name: &str, code: i32, output: &str) -> ToolRun {
        ToolRun {
            name: name.into(),
            args: vec!["--version".into()],
            thread: "main".into(),
            duration: Duration::from_millis(5),
            code,
            output: output.into(),
            errors: String::new(),
        }
    }

    #[test]
    fn test_errors_include_failed_runs() {
        let logbook = Logbook::new();
        logbook.caption("Build");
        logbook.warning("module org.lib not locatable");
        logbook.run(run("javac", 0, ""));
        assert!(!logbook.has_errors());

        logbook.run(run("jar", 7, "boom"));
        logbook.error("image not linked");
        let errors = logbook.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("jar --version failed with exit code 7"));
        assert_eq!(logbook.runs().len(), 2);
    }

    #[test]
    fn test_concurrent_appends() {
        let logbook = Arc::new(Logbook::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let logbook = Arc::clone(&logbook);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        logbook.debug(format!("{}-{}", i, j));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(logbook.notes().len(), 100);
    }

    #[test]
    fn test_flush() {
        let tmp = TempDir::new().unwrap();
        let logbook = Logbook::new();
        logbook.caption("Compile main space");
        logbook.run(run("javac", 0, "Note: compiled"));
        logbook.run(run("jar", 1, ""));

        let path = logbook.flush(tmp.path(), "demo 1.0").unwrap();
        assert_eq!(path, tmp.path().join("logbook.md"));
        let md = std::fs::read_to_string(&path).unwrap();
        assert!(md.starts_with("# Logbook of demo 1.0"));
        assert!(md.contains("- Tool runs: 2"));
        assert!(md.contains("- Errors: 1"));
        assert!(md.contains("Note: compiled"));
        assert!(md.contains("**Compile main space**"));

        let json = std::fs::read_to_string(tmp.path().join("logbook.json")).unwrap();
        let lines: Vec<&str> = json.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains(r#""kind":"caption""#));
        assert!(lines[1].contains(r#""duration_ms":5"#));
    }
}
