//! Tool calls and the runs they produce.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::builder::provider::ToolFinder;

/// Maximum length of a one-line call summary.
pub const SUMMARY_WIDTH: usize = 111;

/// A named tool and its arguments.
#[derive(Clone)]
pub struct ToolCall {
    name: String,
    args: Vec<String>,
    finder: Option<Arc<dyn ToolFinder>>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        ToolCall {
            name: name.into(),
            args: Vec::new(),
            finder: None,
        }
    }

    /// Append an argument.
    pub fn with(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Append an option and its value.
    pub fn with_option(self, option: &str, value: impl ToString) -> Self {
        self.with(option).with(value)
    }

    /// Append an option followed by a path value.
    pub fn with_path(self, option: &str, path: &Path) -> Self {
        self.with(option).with(path.display())
    }

    /// Append all arguments.
    pub fn with_all<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    /// Resolve this call's tool through `finder` instead of the default finder.
    pub fn with_finder(mut self, finder: Arc<dyn ToolFinder>) -> Self {
        self.finder = Some(finder);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn finder(&self) -> Option<&Arc<dyn ToolFinder>> {
        self.finder.as_ref()
    }

    /// One-line summary of the call, shortened to `width` characters.
    pub fn summary(&self, width: usize) -> String {
        summarize(&self.name, &self.args, width)
    }
}

impl fmt::Debug for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCall")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("finder", &self.finder.is_some())
            .finish()
    }
}

impl fmt::Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary(usize::MAX))
    }
}

/// The recorded result of running a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolRun {
    pub name: String,
    pub args: Vec<String>,
    pub thread: String,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub code: i32,
    pub output: String,
    pub errors: String,
}

impl ToolRun {
    pub fn is_successful(&self) -> bool {
        self.code == 0
    }

    pub fn summary(&self, width: usize) -> String {
        summarize(&self.name, &self.args, width)
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn summarize(name: &str, args: &[String], width: usize) -> String {
    let line = std::iter::once(name)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    if line.chars().count() <= width {
        return line;
    }
    let keep = width.saturating_sub(3);
    let mut short: String = line.chars().take(keep).collect();
    short.push_str("...");
    short
}

/// Name of the current thread, falling back to its id.
pub fn current_thread() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}
