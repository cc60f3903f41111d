//! The project model: identity, folders, code spaces, tools and externals.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::core::locator::LocatorChain;
use crate::core::space::{suffix, Space, MAIN, TEST};
use crate::util::context::METADATA_DIR;

/// Extension of module archives.
pub const ARCHIVE_EXTENSION: &str = "jar";

/// A fully derived project, immutable once built.
pub struct Project {
    pub name: String,
    pub version: String,
    pub folders: Folders,
    /// Code spaces in build order: main, then test
    pub spaces: Vec<Space>,
    pub tools: Tools,
    pub library: Library,
}

impl Project {
    pub fn main(&self) -> Option<&Space> {
        self.spaces.iter().find(|s| s.name == MAIN)
    }

    pub fn test(&self) -> Option<&Space> {
        self.spaces.iter().find(|s| s.name == TEST)
    }

    /// Names of all modules declared in any code space.
    pub fn declared_names(&self) -> BTreeSet<String> {
        self.spaces
            .iter()
            .flat_map(|space| space.modules.keys().cloned())
            .collect()
    }

    /// Modules required by declared modules, including `requires static`.
    pub fn declared_requires(&self) -> BTreeSet<String> {
        self.spaces
            .iter()
            .flat_map(|space| space.modules.values())
            .flat_map(|module| module.required_names())
            .map(str::to_string)
            .collect()
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("folders", &self.folders)
            .field("spaces", &self.spaces)
            .field("tools", &self.tools)
            .field("requires", &self.library.requires)
            .finish_non_exhaustive()
    }
}

/// Explicitly required external modules and where to find them.
pub struct Library {
    pub requires: BTreeSet<String>,
    pub locators: LocatorChain,
}

/// Tool selection and argument tweaks.
#[derive(Debug, Clone, Default)]
pub struct Tools {
    pub limit: Vec<String>,
    pub skip: Vec<String>,
    pub tweaks: BTreeMap<String, Vec<String>>,
}

impl Tools {
    /// Check whether a tool may run.
    pub fn is_enabled(&self, tool: &str) -> bool {
        if self.skip.iter().any(|name| name == tool) {
            return false;
        }
        self.limit.is_empty() || self.limit.iter().any(|name| name == tool)
    }

    /// Extra arguments appended to every call of `tool`.
    pub fn tweaks(&self, tool: &str) -> &[String] {
        self.tweaks.get(tool).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Well-known directories of a project.
#[derive(Debug, Clone)]
pub struct Folders {
    root: PathBuf,
    workspace: PathBuf,
    external_modules: PathBuf,
}

impl Folders {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let metadata = root.join(METADATA_DIR);
        Folders {
            workspace: metadata.join("workspace"),
            external_modules: metadata.join("external-modules"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn external_modules(&self) -> &Path {
        &self.external_modules
    }

    pub fn external_module(&self, module: &str) -> PathBuf {
        self.external_modules
            .join(format!("{}.{}", module, ARCHIVE_EXTENSION))
    }

    /// `classes[-space]/<release>`
    pub fn classes(&self, space: &str, release: u32) -> PathBuf {
        self.workspace
            .join(format!("classes{}", suffix(space)))
            .join(release.to_string())
    }

    /// `classes[-space]/<release>/<module>`
    pub fn module_classes(&self, space: &str, release: u32, module: &str) -> PathBuf {
        self.classes(space, release).join(module)
    }

    /// `modules[-space]`
    pub fn modules(&self, space: &str) -> PathBuf {
        self.workspace.join(format!("modules{}", suffix(space)))
    }

    /// `modules[-space]/<module>@<version>[-space].jar`
    pub fn module_archive(&self, space: &str, module: &str, version: &str) -> PathBuf {
        self.modules(space).join(format!(
            "{}@{}{}.{}",
            module,
            version,
            suffix(space),
            ARCHIVE_EXTENSION
        ))
    }

    /// `sources/<module>@<version>-sources.jar`
    pub fn sources_archive(&self, module: &str, version: &str) -> PathBuf {
        self.workspace
            .join("sources")
            .join(format!("{}@{}-sources.{}", module, version, ARCHIVE_EXTENSION))
    }

    pub fn documentation(&self) -> PathBuf {
        self.workspace.join("documentation")
    }

    pub fn image(&self) -> PathBuf {
        self.workspace.join("image")
    }

    /// `reports/<kind>[-space]/<module>`
    pub fn reports(&self, kind: &str, space: &str, module: &str) -> PathBuf {
        self.workspace
            .join("reports")
            .join(format!("{}{}", kind, suffix(space)))
            .join(module)
    }
}
