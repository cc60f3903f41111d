//! Tool providers and how to find them.
//!
//! A [`ToolProvider`] is anything that can be run with arguments: an
//! in-process implementation, an executable of the JDK, or a module launched
//! on the Java virtual machine. A [`ToolFinder`] maps tool names to providers.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::builder::archiver::JarTool;
use crate::util::fs::join_paths;
use crate::util::process::{find_jdk_executable, ProcessBuilder};

/// Explicit per-call execution context.
///
/// Providers read the working directory and environment from here instead of
/// process-wide state.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub directory: PathBuf,
    pub env: Vec<(String, String)>,
}

impl ToolContext {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        ToolContext {
            directory: directory.into(),
            env: Vec::new(),
        }
    }

    /// Resolve a possibly relative path against the context directory.
    pub fn resolve(&self, path: impl Into<PathBuf>) -> PathBuf {
        self.directory.join(path.into())
    }
}

/// A runnable tool.
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run the tool, writing normal and error output to `out` and `err`.
    ///
    /// Returns the exit code. An `Err` means the tool could not be run at all.
    fn run(
        &self,
        ctx: &ToolContext,
        out: &mut dyn Write,
        err: &mut dyn Write,
        args: &[String],
    ) -> Result<i32>;
}

/// Finds tool providers by name.
pub trait ToolFinder: Send + Sync {
    fn find(&self, name: &str) -> Option<Arc<dyn ToolProvider>>;
}

/// In-process tool providers keyed by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    providers: BTreeMap<String, Arc<dyn ToolProvider>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of the tools built into this crate.
    pub fn builtin() -> Self {
        Self::new().with(JarTool)
    }

    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with(mut self, provider: impl ToolProvider + 'static) -> Self {
        self.register(Arc::new(provider));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl ToolFinder for ToolRegistry {
    fn find(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers.get(name).cloned()
    }
}

/// An external program run as a child process.
pub struct ExecutableProvider {
    name: String,
    program: PathBuf,
    prefix: Vec<String>,
}

impl ExecutableProvider {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        ExecutableProvider {
            name: name.into(),
            program: program.into(),
            prefix: Vec::new(),
        }
    }

    /// Arguments passed before the call's own arguments.
    pub fn with_prefix(mut self, prefix: Vec<String>) -> Self {
        self.prefix = prefix;
        self
    }
}

impl ToolProvider for ExecutableProvider {
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
        let mut process = ProcessBuilder::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .cwd(&ctx.directory);
        for (key, value) in &ctx.env {
            process = process.env(key, value);
        }
        let output = process.exec()?;
        out.write_all(&output.stdout)?;
        err.write_all(&output.stderr)?;
        Ok(output.status.code().unwrap_or(-1))
    }
}

/// Finds executables of the JDK: `JAVA_HOME/bin` first, then `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutableFinder;

impl ToolFinder for ExecutableFinder {
    fn find(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        let program = find_jdk_executable(name)?;
        Some(Arc::new(ExecutableProvider::new(name, program)))
    }
}

/// Launches tools packaged as modules, e.g. the JUnit console launcher.
#[derive(Debug, Clone)]
pub struct ModuleLauncher {
    module_path: Vec<PathBuf>,
    aliases: BTreeMap<String, String>,
}

impl ModuleLauncher {
    pub fn new(module_path: Vec<PathBuf>) -> Self {
        ModuleLauncher {
            module_path,
            aliases: BTreeMap::from([(
                "junit".to_string(),
                "org.junit.platform.console".to_string(),
            )]),
        }
    }

    pub fn module_path(&self) -> &[PathBuf] {
        &self.module_path
    }

    fn module_of<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        match self.aliases.get(name) {
            Some(module) => Some(module.as_str()),
            None if name.contains('.') => Some(name),
            None => None,
        }
    }
}

impl ToolFinder for ModuleLauncher {
    fn find(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        let module = self.module_of(name)?;
        if !self.module_path.iter().any(|entry| entry.exists()) {
            return None;
        }
        Some(Arc::new(LaunchedModule {
            name: name.to_string(),
            module: module.to_string(),
            module_path: join_paths(&self.module_path),
        }))
    }
}

struct LaunchedModule {
    name: String,
    module: String,
    module_path: String,
}

impl ToolProvider for LaunchedModule {
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
        let java = find_jdk_executable("java").context("no `java` executable found")?;
        let prefix = vec![
            "--module-path".to_string(),
            self.module_path.clone(),
            "--add-modules".to_string(),
            "ALL-MODULE-PATH".to_string(),
            "--module".to_string(),
            self.module.clone(),
        ];
        ExecutableProvider::new(&self.name, java)
            .with_prefix(prefix)
            .run(ctx, out, err, args)
    }
}

/// Asks several finders in order; the first hit wins.
#[derive(Default, Clone)]
pub struct FinderChain {
    finders: Vec<Arc<dyn ToolFinder>>,
}

impl FinderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, finder: Arc<dyn ToolFinder>) -> Self {
        self.finders.push(finder);
        self
    }
}

impl ToolFinder for FinderChain {
    fn find(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        self.finders.iter().find_map(|finder| finder.find(name))
    }
}

/// Built-in tools first, then JDK executables.
pub fn default_finder() -> Arc<dyn ToolFinder> {
    Arc::new(
        FinderChain::new()
            .with(Arc::new(ToolRegistry::builtin()))
            .with(Arc::new(ExecutableFinder)),
    )
}
