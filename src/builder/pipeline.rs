//! The build pipeline.
//!
//! Stages run in a fixed order: resolve external modules, compile and package
//! the main space, document and link it on two workers, then compile, package
//! and run the test space. Every stage writes to the shared logbook, which is
//! flushed to the workspace whether the build succeeds or not.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::builder::call::ToolCall;
use crate::builder::executor::ToolExecutor;
use crate::builder::logbook::Logbook;
use crate::builder::plan::CallPlanner;
use crate::core::descriptor::{ArchiveDescriptorReader, DescriptorReader};
use crate::core::project::{Project, ARCHIVE_EXTENSION};
use crate::core::space::Space;
use crate::resolver::{ModuleResolver, ResolveError};
use crate::sources::transport::Transport;
use crate::util::config::DEFAULT_FAN_OUT_TIMEOUT;
use crate::util::fs::{list_files_with_extension, remove_dir_all_if_exists};

/// Outcome of a build.
#[derive(Debug)]
pub struct BuildReport {
    /// True if the build completed and the logbook holds no errors
    pub success: bool,
    pub duration: Duration,
    /// Path of the flushed `logbook.md`, if it could be written
    pub logbook: Option<PathBuf>,
    /// The error that aborted the build
    pub error: Option<anyhow::Error>,
    /// Error messages and failed runs recorded in the logbook
    pub errors: Vec<String>,
}

/// Runs all build stages of a project.
pub struct BuildPipeline<'a> {
    project: &'a Project,
    executor: ToolExecutor,
    transport: Arc<dyn Transport>,
    reader: Arc<dyn DescriptorReader>,
    fan_out_timeout: Duration,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(project: &'a Project, executor: ToolExecutor, transport: Arc<dyn Transport>) -> Self {
        BuildPipeline {
            project,
            executor,
            transport,
            reader: Arc::new(ArchiveDescriptorReader),
            fan_out_timeout: DEFAULT_FAN_OUT_TIMEOUT,
        }
    }

    pub fn with_fan_out_timeout(mut self, timeout: Duration) -> Self {
        self.fan_out_timeout = timeout;
        self
    }

    pub fn logbook(&self) -> &Arc<Logbook> {
        self.executor.logbook()
    }

    /// Run the build and flush the logbook.
    pub fn run(&self) -> BuildReport {
        let logbook = self.logbook();
        let title = format!("{} {}", self.project.name, self.project.version);
        logbook.caption(format!("Build {}", title));

        let result = self.build();
        if let Err(e) = &result {
            logbook.error(format!("Build aborted: {:#}", e));
        }

        let path = match logbook.flush(self.project.folders.workspace(), &title) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("failed to write logbook: {:#}", e);
                None
            }
        };
        let errors = logbook.errors();
        info!(
            "Build {} in {} ms",
            if errors.is_empty() { "succeeded" } else { "failed" },
            logbook.uptime().as_millis()
        );
        BuildReport {
            success: errors.is_empty(),
            duration: logbook.uptime(),
            logbook: path,
            error: result.err(),
            errors,
        }
    }

    fn build(&self) -> Result<()> {
        self.resolve()?;
        let planner = CallPlanner::new(self.project);
        if let Some(main) = self.project.main().filter(|space| !space.is_empty()) {
            self.compile(&planner, main)?;
            self.package(&planner, main)?;
            self.fan_out(&planner, main);
        }
        if let Some(test) = self.project.test().filter(|space| !space.is_empty()) {
            self.compile(&planner, test)?;
            self.package(&planner, test)?;
            self.test(&planner, test)?;
        }
        Ok(())
    }

    /// Fetch explicitly required modules, then everything the declared
    /// modules require.
    pub fn resolve(&self) -> Result<(), ResolveError> {
        let logbook = self.logbook();
        logbook.caption("Resolve external modules");
        let resolver = ModuleResolver::new(
            &self.project.library.locators,
            self.transport.as_ref(),
            self.reader.as_ref(),
            self.project.folders.external_modules(),
            logbook,
        );
        let declared = self.project.declared_names();
        let explicit = resolver.resolve(&self.project.library.requires, &declared)?;
        let implicit = resolver.resolve(&self.project.declared_requires(), &declared)?;
        logbook.info(format!(
            "Resolved external modules, {} fetched",
            explicit.fetched.len() + implicit.fetched.len()
        ));
        Ok(())
    }

    /// Compile a space. A failed compilation aborts the build in any mode.
    fn compile(&self, planner: &CallPlanner<'_>, space: &Space) -> Result<()> {
        self.logbook()
            .caption(format!("Compile {} space", space.name));
        let calls = planner
            .compile(space)
            .into_iter()
            .chain(planner.compile_overlays(space)?);
        for call in calls {
            match self.executor.run(&call)? {
                Some(run) if !run.is_successful() => bail!(
                    "compilation of {} space failed, {} exited with code {}",
                    space.name,
                    run.name,
                    run.code
                ),
                Some(_) => {}
                // Lenient mode returns nothing for a missing tool
                None if self.executor.is_enabled(call.name()) => bail!(
                    "compilation of {} space failed, tool {} not found",
                    space.name,
                    call.name()
                ),
                None => {}
            }
        }
        Ok(())
    }

    fn package(&self, planner: &CallPlanner<'_>, space: &Space) -> Result<()> {
        self.logbook()
            .caption(format!("Package {} space", space.name));
        for module in space.modules.values() {
            self.executor.run(&planner.package(space, module)?)?;
            if space.is_main() {
                if let Some(call) = planner.package_sources(module) {
                    self.executor.run(&call)?;
                }
            }
        }
        Ok(())
    }

    /// Document and link the main space on two workers.
    ///
    /// Failures of either task are recorded, never raised. A worker still busy
    /// when the join gives up is abandoned. The tool it runs is left to finish
    /// and its run may miss the flushed logbook, but its follow-up step is
    /// skipped.
    fn fan_out(&self, planner: &CallPlanner<'_>, space: &Space) {
        let logbook = Arc::clone(self.logbook());
        logbook.caption("Document and link main space");

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .thread_name(|i| format!("sonata-worker-{}", i))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                logbook.error(format!("Failed to start workers: {}", e));
                return;
            }
        };
        let (sender, receiver) = mpsc::channel::<(&'static str, Result<()>)>();
        let abandoned = Arc::new(AtomicBool::new(false));

        let documentation = {
            let executor = self.executor.clone();
            let javadoc = planner.document(space);
            let archive = planner.document_archive();
            let sender = sender.clone();
            let abandoned = Arc::clone(&abandoned);
            move || {
                let result = document(&executor, javadoc, &archive, &abandoned);
                let _ = sender.send(("documentation", result));
            }
        };
        let image = {
            let executor = self.executor.clone();
            let reader = Arc::clone(&self.reader);
            let checked = planner.module_path(space);
            let output = self.project.folders.image();
            let jlink = planner.link(space);
            let abandoned = Arc::clone(&abandoned);
            move || {
                let result = link(
                    &executor,
                    reader.as_ref(),
                    &checked,
                    &output,
                    jlink,
                    &abandoned,
                );
                let _ = sender.send(("image", result));
            }
        };
        pool.spawn(documentation);
        pool.spawn(image);

        let deadline = Instant::now() + self.fan_out_timeout;
        for _ in 0..2 {
            match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok((_, Ok(()))) => {}
                Ok((task, Err(e))) => logbook.error(format!("Task {} failed: {:#}", task, e)),
                Err(RecvTimeoutError::Timeout) => {
                    abandoned.store(true, Ordering::Release);
                    logbook.error(format!(
                        "Documentation and linking did not complete within {} s",
                        self.fan_out_timeout.as_secs_f64()
                    ));
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    abandoned.store(true, Ordering::Release);
                    logbook.error("A worker terminated without reporting its result");
                    break;
                }
            }
        }
    }

    fn test(&self, planner: &CallPlanner<'_>, space: &Space) -> Result<()> {
        self.logbook().caption(format!("Test {} space", space.name));
        for module in space.modules.values() {
            let call = planner.test(space, module, Arc::clone(self.executor.finder()));
            self.executor.run(&call)?;
        }
        Ok(())
    }
}

fn document(
    executor: &ToolExecutor,
    javadoc: Option<ToolCall>,
    archive: &ToolCall,
    abandoned: &AtomicBool,
) -> Result<()> {
    let Some(javadoc) = javadoc else {
        return Ok(());
    };
    match executor.run(&javadoc)? {
        Some(run) if !run.is_successful() => bail!("javadoc exited with code {}", run.code),
        Some(_) if abandoned.load(Ordering::Acquire) => Ok(()),
        Some(_) => {
            executor.run(archive)?;
            Ok(())
        }
        None => Ok(()),
    }
}

fn link(
    executor: &ToolExecutor,
    reader: &dyn DescriptorReader,
    checked: &[PathBuf],
    output: &Path,
    jlink: Option<ToolCall>,
    abandoned: &AtomicBool,
) -> Result<()> {
    let Some(jlink) = jlink else {
        return Ok(());
    };
    if !executor.is_enabled(jlink.name()) {
        return Ok(());
    }
    for dir in checked {
        for archive in list_files_with_extension(dir, ARCHIVE_EXTENSION)? {
            let descriptor = reader.describe(&archive)?;
            if descriptor.automatic {
                executor.logbook().warning(format!(
                    "Automatic module {} found in {}, image not linked",
                    descriptor.name,
                    archive.display()
                ));
                return Ok(());
            }
        }
    }
    if abandoned.load(Ordering::Acquire) {
        return Ok(());
    }
    remove_dir_all_if_exists(output)?;
    executor.run(&jlink)?;
    Ok(())
}
