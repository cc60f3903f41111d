//! Configuration file support for Sonata.
//!
//! A project may carry an optional `.sonata/config.toml`. Every value has a
//! default, so the file only needs to list what differs. Command-line flags
//! are applied on top of the loaded configuration by the binary.
//!
//! ```toml
//! [project]
//! name = "greetings"
//! version = "1.0"
//! requires = ["org.junit.jupiter"]
//!
//! [main]
//! release = 17
//!
//! [tools]
//! skip = ["jlink"]
//! tweaks = { javac = ["-encoding", "UTF-8"] }
//!
//! [externals]
//! locations = { "org.example.lib" = "https://example.org/lib-1.0.jar" }
//! libraries = { junit = "5.7.1" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default compile release of the main code space.
pub const DEFAULT_RELEASE: u32 = 17;

/// Default upper bound for waiting on documentation and image linking.
pub const DEFAULT_FAN_OUT_TIMEOUT: Duration = Duration::from_secs(600);

/// Sonata configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project identity and explicit requirements
    pub project: ProjectConfig,

    /// Main code space settings
    pub main: SpaceConfig,

    /// Test code space settings
    pub test: SpaceConfig,

    /// Tool selection and argument tweaks
    pub tools: ToolsConfig,

    /// Where to find external modules
    pub externals: ExternalsConfig,

    /// Build settings
    pub build: BuildConfig,
}

/// Project identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name (defaults to the root directory name)
    pub name: Option<String>,

    /// Project version, inherited by every module (defaults to "0")
    pub version: Option<String>,

    /// External modules required explicitly, e.g. test engines
    pub requires: Vec<String>,
}

/// Code space settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SpaceConfig {
    /// Glob patterns classifying module declarations into this space
    pub patterns: Vec<String>,

    /// Additional module path entries, relative to the project root
    pub module_paths: Vec<String>,

    /// Compile release (main space only; the test space inherits it)
    pub release: Option<u32>,
}

/// Tool selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// If non-empty, only these tools are run
    pub limit: Vec<String>,

    /// Tools that are never run
    pub skip: Vec<String>,

    /// Extra arguments appended to every call of a tool
    pub tweaks: BTreeMap<String, Vec<String>>,
}

/// External module locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalsConfig {
    /// Explicit module to URI mappings
    pub locations: BTreeMap<String, String>,

    /// Pinned library families, e.g. `junit = "5.7.1"`
    pub libraries: BTreeMap<String, String>,

    /// Optional `module=uri` properties index
    pub index: Option<IndexConfig>,
}

/// A module index location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// URI of the properties file
    pub uri: String,

    /// Whether the index content is pinned (stable) or floating (dynamic)
    #[serde(default)]
    pub pinned: bool,
}

/// Build settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Record failing tool runs instead of aborting the current stage
    pub lenient: bool,

    /// Copy source files into each module archive
    pub jar_with_sources: bool,

    /// Seconds to wait for documentation and image linking
    pub fan_out_timeout: Option<u64>,

    /// Never access the network
    pub offline: bool,
}

impl BuildConfig {
    /// Get the fan-out join timeout.
    pub fn fan_out_timeout(&self) -> Duration {
        self.fan_out_timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FAN_OUT_TIMEOUT)
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration, falling back to defaults if the file doesn't exist.
    ///
    /// A file that exists but cannot be parsed is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Get the main space release.
    pub fn main_release(&self) -> u32 {
        self.main.release.unwrap_or(DEFAULT_RELEASE)
    }
}
