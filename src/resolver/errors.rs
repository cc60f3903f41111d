//! Resolution error types and diagnostics.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::descriptor::DescriptorError;
use crate::core::locator::LocatorError;
use crate::sources::transport::TransportError;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error while resolving external modules.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{} module(s) could not be resolved: {}", missing.len(), missing.join(", "))]
    UnresolvedClosure { missing: Vec<String> },

    #[error("resolution did not settle within {limit} iterations")]
    IterationLimit { limit: usize, missing: Vec<String> },

    #[error("failed to locate module `{module}`: {source}")]
    Locator {
        module: String,
        #[source]
        source: LocatorError,
    },

    #[error("failed to fetch module `{module}`: {source}")]
    Fetch {
        module: String,
        #[source]
        source: TransportError,
    },

    #[error("fetched module `{module}` failed verification: {message}")]
    Verify { module: String, message: String },

    #[error("failed to describe {}: {source}", path.display())]
    Describe {
        path: PathBuf,
        #[source]
        source: DescriptorError,
    },

    #[error("failed to list {}: {message}", path.display())]
    Scan { path: PathBuf, message: String },
}

impl ResolveError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::UnresolvedClosure { missing } => Diagnostic::error(format!(
                "{} external module(s) could not be resolved",
                missing.len()
            ))
            .with_context(format!("missing: {}", missing.join(", ")))
            .with_suggestion(suggestions::LOCATE_MODULE)
            .with_suggestion(suggestions::LIBRARY_VERSION),

            ResolveError::IterationLimit { limit, missing } => Diagnostic::error(format!(
                "module resolution did not settle within {} iterations",
                limit
            ))
            .with_context(format!("still missing: {}", missing.join(", ")))
            .with_suggestion("check the configured locators for modules mapped to each other's archives"),

            ResolveError::Fetch { module, source } => {
                Diagnostic::error(format!("could not fetch module `{}`", module))
                    .with_context(source.to_string())
                    .with_suggestion(suggestions::FETCH_FAILED)
            }

            ResolveError::Verify { module, message } => {
                Diagnostic::error(format!("module `{}` failed verification", module))
                    .with_context(message.clone())
                    .with_suggestion("update the `sha256` or `size` attribute of its location")
            }

            other => Diagnostic::error(other.to_string()),
        }
    }
}
