//! Global context for Sonata operations.
//!
//! Provides centralized access to the project root and the paths derived
//! from it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Name of the project-local metadata directory.
pub const METADATA_DIR: &str = ".sonata";

/// Global context containing the project root and output settings.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Project root directory
    root: PathBuf,

    /// Whether to use verbose output
    verbose: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext rooted at the current working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(GlobalContext {
            root: cwd,
            verbose: false,
        })
    }

    /// Create a GlobalContext rooted at a specific directory.
    ///
    /// Relative directories are resolved against the current working directory.
    pub fn with_root(root: impl AsRef<Path>) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.root = ctx.root.join(root);
        Ok(ctx)
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Get the project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the project-local metadata directory.
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// Get the project configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.metadata_dir().join("config.toml")
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_paths() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_root(tmp.path()).unwrap();
        assert_eq!(ctx.root(), tmp.path());
        assert_eq!(ctx.metadata_dir(), tmp.path().join(".sonata"));
        assert_eq!(
            ctx.config_path(),
            tmp.path().join(".sonata").join("config.toml")
        );
        assert!(!ctx.is_verbose());
    }
}
