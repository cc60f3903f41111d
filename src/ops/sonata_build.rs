//! Implementation of `sonata build`.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::builder::executor::{FailureMode, ToolExecutor};
use crate::builder::logbook::Logbook;
use crate::builder::pipeline::{BuildPipeline, BuildReport};
use crate::builder::provider::{default_finder, ToolContext, ToolFinder};
use crate::core::project::Folders;
use crate::core::project_builder::{describe_spaces, ProjectBuilder};
use crate::sources::transport::{HttpTransport, Transport};
use crate::util::config::Config;
use crate::util::context::GlobalContext;

/// Build the project rooted at `ctx` with the JDK tools found on this machine.
pub fn build(ctx: &GlobalContext, config: &Config) -> Result<BuildReport> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.build.offline)?);
    build_with(ctx, config, default_finder(), transport)
}

/// Build the project with explicit tool finder and transport.
///
/// A project that cannot be scanned yields a failed report; the logbook is
/// flushed in either case.
pub fn build_with(
    ctx: &GlobalContext,
    config: &Config,
    finder: Arc<dyn ToolFinder>,
    transport: Arc<dyn Transport>,
) -> Result<BuildReport> {
    let logbook = Arc::new(Logbook::new());

    let project = match ProjectBuilder::new(ctx, config, Arc::clone(&transport)).build() {
        Ok(project) => project,
        Err(e) => {
            logbook.error(format!("Failed to scan project: {}", e));
            let folders = Folders::new(ctx.root());
            let path = logbook.flush(folders.workspace(), "project scan")?;
            return Ok(BuildReport {
                success: false,
                duration: logbook.uptime(),
                logbook: Some(path),
                errors: logbook.errors(),
                error: Some(e.into()),
            });
        }
    };

    for (space, modules) in describe_spaces(&project.spaces) {
        debug!("{} space: {}", space, modules.join(", "));
    }
    info!(
        "Building {} {} in {}",
        project.name,
        project.version,
        ctx.root().display()
    );

    let mode = if config.build.lenient {
        FailureMode::Lenient
    } else {
        FailureMode::FailFast
    };
    let executor = ToolExecutor::new(
        finder,
        logbook,
        project.tools.clone(),
        ToolContext::new(ctx.root()),
    )
    .with_mode(mode);

    let report = BuildPipeline::new(&project, executor, transport)
        .with_fan_out_timeout(config.build.fan_out_timeout())
        .run();
    Ok(report)
}
