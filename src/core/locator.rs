//! Locating external modules.
//!
//! A [`Locator`] maps a module name to a fetchable URI. Locators are ranked by
//! [`Stability`]; the [`LocatorChain`] asks them in rank order and the first
//! answer wins.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

use crate::sources::transport::Transport;

/// How reliably a locator answers over time. Variants are ordered by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
    /// Configured by the user, always wins
    Explicit,
    /// Pinned to fixed versions
    Stable,
    /// May answer differently tomorrow
    Dynamic,
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stability::Explicit => write!(f, "explicit"),
            Stability::Stable => write!(f, "stable"),
            Stability::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Error raised while locating a module.
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("failed to load module index {uri}: {message}")]
    Index { uri: String, message: String },
}

/// A module name mapped to the URI of its archive.
///
/// The URI fragment may carry `&`-separated attributes, e.g.
/// `https://host/lib.jar#sha256=...&size=1234`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalModuleLocation {
    pub module: String,
    pub uri: String,
}

impl ExternalModuleLocation {
    pub fn new(module: impl Into<String>, uri: impl Into<String>) -> Self {
        ExternalModuleLocation {
            module: module.into(),
            uri: uri.into(),
        }
    }

    /// The URI without its fragment.
    pub fn fetch_uri(&self) -> &str {
        self.uri.split_once('#').map_or(self.uri.as_str(), |(uri, _)| uri)
    }

    /// Attributes encoded in the URI fragment.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let Some((_, fragment)) = self.uri.split_once('#') else {
            return BTreeMap::new();
        };
        fragment
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn sha256(&self) -> Option<String> {
        self.attributes().remove("sha256")
    }

    pub fn size(&self) -> Option<u64> {
        self.attributes().get("size").and_then(|s| s.parse().ok())
    }
}

/// Maps module names to locations.
pub trait Locator: Send + Sync {
    /// Human-readable description.
    fn title(&self) -> String;

    fn stability(&self) -> Stability;

    /// Locate a module, returning `None` if this locator doesn't know it.
    fn locate(&self, module: &str) -> Result<Option<ExternalModuleLocation>, LocatorError>;

    /// Number of modules this locator can answer for, if finite and known.
    fn candidates(&self) -> Option<usize> {
        None
    }
}

/// Explicit module-to-URI mappings.
#[derive(Debug, Clone, Default)]
pub struct ModuleLocations {
    locations: BTreeMap<String, String>,
}

impl ModuleLocations {
    pub fn new(locations: BTreeMap<String, String>) -> Self {
        ModuleLocations { locations }
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

impl Locator for ModuleLocations {
    fn title(&self) -> String {
        format!("explicit locations ({} modules)", self.locations.len())
    }

    fn stability(&self) -> Stability {
        Stability::Explicit
    }

    fn locate(&self, module: &str) -> Result<Option<ExternalModuleLocation>, LocatorError> {
        Ok(self
            .locations
            .get(module)
            .map(|uri| ExternalModuleLocation::new(module, uri.clone())))
    }

    fn candidates(&self) -> Option<usize> {
        Some(self.locations.len())
    }
}

/// Maven Central coordinates.
pub struct MavenCentral;

impl MavenCentral {
    pub const REPOSITORY: &'static str = "https://repo.maven.apache.org/maven2";

    /// URI of the `group:artifact:version` archive.
    pub fn uri(group: &str, artifact: &str, version: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}-{}.jar",
            Self::REPOSITORY,
            group.replace('.', "/"),
            artifact,
            version,
            artifact,
            version
        )
    }
}

const OPENTEST4J_VERSION: &str = "1.2.0";
const APIGUARDIAN_VERSION: &str = "1.1.1";

/// Locates the modules of a JUnit 5 release on Maven Central.
#[derive(Debug, Clone)]
pub struct JUnitLocator {
    uris: BTreeMap<String, String>,
    version: String,
}

impl JUnitLocator {
    /// Create a locator for Jupiter version `5.x.y`; the platform is `1.x.y`.
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        let platform = version
            .strip_prefix("5.")
            .map(|rest| format!("1.{}", rest))
            .unwrap_or_else(|| version.clone());

        let mut uris = BTreeMap::new();
        let mut add = |module: &str, group: &str, artifact: &str, version: &str| {
            uris.insert(module.to_string(), MavenCentral::uri(group, artifact, version));
        };

        for (suffix, artifact) in [
            ("", "junit-jupiter"),
            (".api", "junit-jupiter-api"),
            (".engine", "junit-jupiter-engine"),
            (".params", "junit-jupiter-params"),
        ] {
            add(
                &format!("org.junit.jupiter{}", suffix),
                "org.junit.jupiter",
                artifact,
                &version,
            );
        }
        for name in ["commons", "console", "engine", "launcher", "reporting", "testkit"] {
            add(
                &format!("org.junit.platform.{}", name),
                "org.junit.platform",
                &format!("junit-platform-{}", name),
                &platform,
            );
        }
        add("org.opentest4j", "org.opentest4j", "opentest4j", OPENTEST4J_VERSION);
        add(
            "org.apiguardian.api",
            "org.apiguardian",
            "apiguardian-api",
            APIGUARDIAN_VERSION,
        );

        JUnitLocator { uris, version }
    }
}

impl Locator for JUnitLocator {
    fn title(&self) -> String {
        format!("JUnit {}", self.version)
    }

    fn stability(&self) -> Stability {
        Stability::Stable
    }

    fn locate(&self, module: &str) -> Result<Option<ExternalModuleLocation>, LocatorError> {
        Ok(self
            .uris
            .get(module)
            .map(|uri| ExternalModuleLocation::new(module, uri.clone())))
    }

    fn candidates(&self) -> Option<usize> {
        Some(self.uris.len())
    }
}

/// Locates modules through a `module=uri` properties index.
///
/// The index is fetched on first use and memoized. Concurrent callers block on
/// the same mutex, so the index is loaded at most once.
pub struct ModulesIndexLocator {
    uri: String,
    pinned: bool,
    cache: PathBuf,
    transport: Arc<dyn Transport>,
    index: Mutex<Option<Arc<BTreeMap<String, String>>>>,
}

impl ModulesIndexLocator {
    /// Create a locator for the index at `uri`, cached at `cache`.
    pub fn new(
        uri: impl Into<String>,
        pinned: bool,
        cache: impl Into<PathBuf>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        ModulesIndexLocator {
            uri: uri.into(),
            pinned,
            cache: cache.into(),
            transport,
            index: Mutex::new(None),
        }
    }

    fn index(&self) -> Result<Arc<BTreeMap<String, String>>, LocatorError> {
        let mut guard = self.index.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = guard.as_ref() {
            return Ok(Arc::clone(index));
        }

        let error = |message: String| LocatorError::Index {
            uri: self.uri.clone(),
            message,
        };
        let path = self
            .transport
            .fetch(&self.uri, &self.cache)
            .map_err(|e| error(e.to_string()))?;
        let text = std::fs::read_to_string(&path).map_err(|e| error(e.to_string()))?;
        let index = Arc::new(parse_properties(&text));
        debug!("Loaded {} module locations from {}", index.len(), self.uri);

        *guard = Some(Arc::clone(&index));
        Ok(index)
    }
}

impl Locator for ModulesIndexLocator {
    fn title(&self) -> String {
        let loaded = self
            .index
            .lock()
            .map(|guard| guard.as_ref().map(|index| index.len()))
            .unwrap_or(None);
        match loaded {
            Some(count) => format!("index {} ({} modules)", self.uri, count),
            None => format!("index {} (not loaded)", self.uri),
        }
    }

    fn stability(&self) -> Stability {
        if self.pinned {
            Stability::Stable
        } else {
            Stability::Dynamic
        }
    }

    fn locate(&self, module: &str) -> Result<Option<ExternalModuleLocation>, LocatorError> {
        Ok(self
            .index()?
            .get(module)
            .map(|uri| ExternalModuleLocation::new(module, uri.clone())))
    }
}

/// Parse a `key=value` properties text, skipping blank and comment lines.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Locators ordered by stability; insertion order is kept within a rank.
#[derive(Default)]
pub struct LocatorChain {
    locators: Vec<Arc<dyn Locator>>,
}

impl LocatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, locator: Arc<dyn Locator>) {
        let rank = locator.stability();
        let at = self
            .locators
            .iter()
            .position(|existing| existing.stability() > rank)
            .unwrap_or(self.locators.len());
        self.locators.insert(at, locator);
    }

    pub fn with(mut self, locator: impl Locator + 'static) -> Self {
        self.push(Arc::new(locator));
        self
    }

    pub fn locators(&self) -> &[Arc<dyn Locator>] {
        &self.locators
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    /// Ask every locator in rank order; the first answer wins.
    pub fn locate(&self, module: &str) -> Result<Option<ExternalModuleLocation>, LocatorError> {
        for locator in &self.locators {
            if let Some(location) = locator.locate(module)? {
                debug!(
                    "Located {} via {} [{}]",
                    module,
                    locator.title(),
                    locator.stability()
                );
                return Ok(Some(location));
            }
        }
        Ok(None)
    }

    /// Sum of all candidate counts, or `None` if any locator is unbounded.
    pub fn candidates(&self) -> Option<usize> {
        self.locators
            .iter()
            .map(|locator| locator.candidates())
            .sum()
    }
}
