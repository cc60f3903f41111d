//! Test utilities and fakes for Sonata unit tests.
//!
//! This module provides deterministic stand-ins for the collaborators that
//! reach outside the process: tool providers and the network transport.
//!
//! # Example
//!
//! ```rust,ignore
//! use sonata::test_support::FakeToolFinder;
//!
//! #[test]
//! fn test_example() {
//!     let finder = FakeToolFinder::new().with_exit("javac", 0);
//!     let calls = finder.calls();
//!     // Run an executor with the finder...
//!     assert_eq!(calls.names(), vec!["javac"]);
//! }
//! ```

pub mod fixtures;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::builder::archiver::JarTool;
use crate::builder::provider::{ToolContext, ToolFinder, ToolProvider};
use crate::sources::transport::{Transport, TransportError};

// Re-export fixtures for convenience
pub use fixtures::*;

/// Behavior of a scripted tool.
pub type Script = Arc<
    dyn Fn(&ToolContext, &[String], &mut dyn Write, &mut dyn Write) -> Result<i32> + Send + Sync,
>;

/// Shared record of the calls a [`FakeToolFinder`] served.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl CallLog {
    fn record(&self, name: &str, args: &[String]) {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), args.to_vec()));
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of the called tools, in call order.
    pub fn names(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }

    /// Arguments of every call of `tool`.
    pub fn args_of(&self, tool: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, args)| args)
            .collect()
    }
}

/// Tool finder serving scripted providers and recording every call.
#[derive(Clone, Default)]
pub struct FakeToolFinder {
    scripts: BTreeMap<String, Script>,
    log: CallLog,
}

impl FakeToolFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the calls served by this finder and its clones.
    pub fn calls(&self) -> CallLog {
        self.log.clone()
    }

    /// Serve `name` with a custom script.
    pub fn with_script<F>(mut self, name: &str, script: F) -> Self
    where
        F: Fn(&ToolContext, &[String], &mut dyn Write, &mut dyn Write) -> Result<i32>
            + Send
            + Sync
            + 'static,
    {
        self.scripts.insert(name.to_string(), Arc::new(script));
        self
    }

    /// Serve `name` with a tool that exits with `code`.
    pub fn with_exit(self, name: &str, code: i32) -> Self {
        self.with_script(name, move |_, _, _, _| Ok(code))
    }

    /// Serve `name` with a tool that prints `text` and exits with `code`.
    pub fn with_output(self, name: &str, code: i32, text: &str) -> Self {
        let text = text.to_string();
        self.with_script(name, move |_, _, out, _| {
            write!(out, "{}", text)?;
            Ok(code)
        })
    }

    /// Serve `name` with a tool that fails to run.
    pub fn with_error(self, name: &str) -> Self {
        self.with_script(name, |_, _, _, _| bail!("scripted failure"))
    }

    /// Serve `jar` with the built-in archiver.
    pub fn with_builtin_jar(self) -> Self {
        self.with_script("jar", |ctx, args, out, err| {
            JarTool.run(ctx, out, err, args)
        })
    }
}

impl ToolFinder for FakeToolFinder {
    fn find(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        let script = self.scripts.get(name)?;
        Some(Arc::new(ScriptedTool {
            name: name.to_string(),
            script: Arc::clone(script),
            log: self.log.clone(),
        }))
    }
}

struct ScriptedTool {
    name: String,
    script: Script,
    log: CallLog,
}

impl ToolProvider for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &self,
        ctx: &ToolContext,
        out: &mut dyn Write,
        err: &mut dyn Write,
        args: &[String],
    ) -> Result<i32> {
        self.log.record(&self.name, args);
        (self.script)(ctx, args, out, err)
    }
}

/// Transport serving in-memory content by URI.
#[derive(Debug, Default)]
pub struct FakeTransport {
    content: BTreeMap<String, Vec<u8>>,
    fetched: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: &str, bytes: Vec<u8>) -> Self {
        self.content.insert(uri.to_string(), bytes);
        self
    }

    /// Number of successful fetches.
    pub fn fetch_count(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    fn fetch(&self, uri: &str, destination: &Path) -> Result<PathBuf, TransportError> {
        let bytes = self.content.get(uri).ok_or_else(|| TransportError::Status {
            uri: uri.to_string(),
            status: 404,
        })?;
        let io = |source| TransportError::Io {
            path: destination.to_path_buf(),
            source,
        };
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(destination, bytes).map_err(io)?;
        self.fetched.fetch_add(1, Ordering::SeqCst);
        Ok(destination.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_finder_records_calls() {
        let finder = FakeToolFinder::new().with_exit("javac", 0);
        let calls = finder.calls();
        let tool = finder.find("javac").unwrap();
        let code = tool
            .run(
                &ToolContext::new("."),
                &mut Vec::new(),
                &mut Vec::new(),
                &["-d".into()],
            )
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(calls.args_of("javac"), vec![vec!["-d".to_string()]]);
        assert!(finder.find("jar").is_none());
    }

    #[test]
    fn test_fake_transport() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transport = FakeTransport::new().with("mem:a", b"a".to_vec());
        let dest = tmp.path().join("x/a.jar");
        transport.fetch("mem:a", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"a");
        assert!(transport.fetch("mem:b", &dest).is_err());
        assert_eq!(transport.fetch_count(), 1);
    }
}
