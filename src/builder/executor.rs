//! Tool execution with fail-fast or lenient failure handling.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::builder::call::{current_thread, ToolCall, ToolRun};
use crate::builder::logbook::Logbook;
use crate::builder::provider::{ToolContext, ToolFinder};
use crate::core::project::Tools;

/// Exit code recorded when a provider fails to run at all.
pub const PROVIDER_FAILURE: i32 = -1;

/// What to do when a tool run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Abort the current stage
    #[default]
    FailFast,
    /// Record the failure and carry on
    Lenient,
}

/// Error running a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: `{0}`")]
    NotFound(String),

    #[error("`{}` failed with exit code {}", .0.name, .0.code)]
    Failed(Box<ToolRun>),
}

/// Runs tool calls and records every run in the logbook.
#[derive(Clone)]
pub struct ToolExecutor {
    finder: Arc<dyn ToolFinder>,
    logbook: Arc<Logbook>,
    tools: Tools,
    mode: FailureMode,
    context: ToolContext,
}

impl ToolExecutor {
    pub fn new(
        finder: Arc<dyn ToolFinder>,
        logbook: Arc<Logbook>,
        tools: Tools,
        context: ToolContext,
    ) -> Self {
        ToolExecutor {
            finder,
            logbook,
            tools,
            mode: FailureMode::FailFast,
            context,
        }
    }

    pub fn with_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> FailureMode {
        self.mode
    }

    pub fn logbook(&self) -> &Arc<Logbook> {
        &self.logbook
    }

    pub fn finder(&self) -> &Arc<dyn ToolFinder> {
        &self.finder
    }

    /// Check whether `tool` may run under the configured tool selection.
    pub fn is_enabled(&self, tool: &str) -> bool {
        self.tools.is_enabled(tool)
    }

    /// Run a tool call.
    ///
    /// Returns `Ok(None)` if the tool is not enabled, or if it is not found in
    /// lenient mode. A failed run is returned in lenient mode and raised as
    /// [`ToolError::Failed`] in fail-fast mode; either way it is recorded.
    pub fn run(&self, call: &ToolCall) -> Result<Option<ToolRun>, ToolError> {
        let name = call.name();
        if !self.is_enabled(name) {
            self.logbook.debug(format!("Skip {} - tool not enabled", name));
            return Ok(None);
        }

        let finder = call.finder().unwrap_or(&self.finder);
        let Some(provider) = finder.find(name) else {
            return match self.mode {
                FailureMode::FailFast => Err(ToolError::NotFound(name.to_string())),
                FailureMode::Lenient => {
                    self.logbook.error(format!("Tool not found: {}", name));
                    Ok(None)
                }
            };
        };

        let mut args = call.args().to_vec();
        args.extend(self.tools.tweaks(name).iter().cloned());

        let mut out = Vec::new();
        let mut err = Vec::new();
        let start = Instant::now();
        let code = match provider.run(&self.context, &mut out, &mut err, &args) {
            Ok(code) => code,
            Err(e) => {
                let _ = writeln!(err, "{:#}", e);
                PROVIDER_FAILURE
            }
        };

        let run = ToolRun {
            name: name.to_string(),
            args,
            thread: current_thread(),
            duration: start.elapsed(),
            code,
            output: String::from_utf8_lossy(&out).into_owned(),
            errors: String::from_utf8_lossy(&err).into_owned(),
        };
        self.logbook.run(run.clone());

        if run.is_successful() || self.mode == FailureMode::Lenient {
            Ok(Some(run))
        } else {
            Err(ToolError::Failed(Box::new(run)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeToolFinder;
    use std::collections::BTreeMap;

    fn executor(finder: FakeToolFinder, tools: Tools) -> ToolExecutor {
        ToolExecutor::new(
            Arc::new(finder),
            Arc::new(Logbook::new()),
            tools,
            ToolContext::new("."),
        )
    }

    #[test]
    fn test_successful_run_applies_tweaks() {
        let finder = FakeToolFinder::new().with_output("javac", 0, "compiled");
        let calls = finder.calls();
        let tools = Tools {
            tweaks: BTreeMap::from([("javac".into(), vec!["-g".into()])]),
            ..Tools::default()
        };
        let executor = executor(finder, tools);

        let run = executor
            .run(&ToolCall::new("javac").with("-d"))
            .unwrap()
            .unwrap();
        assert!(run.is_successful());
        assert_eq!(run.args, vec!["-d", "-g"]);
        assert_eq!(run.output, "compiled");
        assert_eq!(calls.names(), vec!["javac"]);
        assert!(!executor.logbook().has_errors());
    }

    #[test]
    fn test_fail_fast_raises() {
        let executor = executor(FakeToolFinder::new().with_exit("jar", 7), Tools::default());
        let err = executor.run(&ToolCall::new("jar")).unwrap_err();
        match err {
            ToolError::Failed(run) => assert_eq!(run.code, 7),
            other => panic!("unexpected error: {}", other),
        }
        assert!(executor.logbook().has_errors());
    }

    #[test]
    fn test_lenient_returns_failed_run() {
        let executor = executor(FakeToolFinder::new().with_exit("jar", 7), Tools::default())
            .with_mode(FailureMode::Lenient);
        let run = executor.run(&ToolCall::new("jar")).unwrap().unwrap();
        assert_eq!(run.code, 7);
        assert_eq!(executor.logbook().errors().len(), 1);
    }

    #[test]
    fn test_provider_error_counts_as_failure() {
        let executor = executor(FakeToolFinder::new().with_error("javadoc"), Tools::default())
            .with_mode(FailureMode::Lenient);
        let run = executor.run(&ToolCall::new("javadoc")).unwrap().unwrap();
        assert_eq!(run.code, PROVIDER_FAILURE);
        assert!(run.errors.contains("scripted failure"));
    }

    #[test]
    fn test_tool_not_found() {
        let fail_fast = executor(FakeToolFinder::new(), Tools::default());
        assert!(matches!(
            fail_fast.run(&ToolCall::new("jlink")),
            Err(ToolError::NotFound(name)) if name == "jlink"
        ));

        let lenient = executor(FakeToolFinder::new(), Tools::default())
            .with_mode(FailureMode::Lenient);
        assert!(lenient.run(&ToolCall::new("jlink")).unwrap().is_none());
        assert!(lenient.logbook().has_errors());
    }

    #[test]
    fn test_skipped_tool_is_not_run() {
        let finder = FakeToolFinder::new().with_exit("jlink", 0);
        let calls = finder.calls();
        let tools = Tools {
            skip: vec!["jlink".into()],
            ..Tools::default()
        };
        let executor = executor(finder, tools);
        assert!(executor.run(&ToolCall::new("jlink")).unwrap().is_none());
        assert!(calls.names().is_empty());
        assert!(!executor.logbook().has_errors());
    }

    #[test]
    fn test_override_finder() {
        let fallback = FakeToolFinder::new().with_exit("junit", 0);
        let calls = fallback.calls();
        let executor = executor(FakeToolFinder::new(), Tools::default());
        let call = ToolCall::new("junit").with_finder(Arc::new(fallback));
        assert!(executor.run(&call).unwrap().is_some());
        assert_eq!(calls.names(), vec!["junit"]);
    }
}
