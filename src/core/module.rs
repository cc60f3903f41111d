//! Declared modules and their release-targeted source folders.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::descriptor::ModuleDescriptor;

/// A source or resource directory targeting a specific release.
///
/// Release 0 means "not targeted": the folder is compiled for the release of
/// its code space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFolder {
    pub path: PathBuf,
    pub release: u32,
}

impl SourceFolder {
    pub fn new(path: impl Into<PathBuf>, release: u32) -> Self {
        SourceFolder {
            path: path.into(),
            release,
        }
    }

    /// Create a source folder, parsing the release from the directory name.
    ///
    /// Returns `None` if the release suffix is out of range.
    pub fn of(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let release = release_of(&crate::util::fs::file_name(&path))?;
        Some(SourceFolder { path, release })
    }
}

/// Parse the trailing release number of a directory name, e.g. `java-11` is 11.
///
/// A name without trailing digits is release 0. Digits that overflow a `u32`
/// yield `None`.
pub fn release_of(name: &str) -> Option<u32> {
    let digits = &name[name.trim_end_matches(|c: char| c.is_ascii_digit()).len()..];
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

/// A module declared in the project's source tree.
#[derive(Debug, Clone, Serialize)]
pub struct DeclaredModule {
    /// Path of the `module-info.java` declaration
    pub info: PathBuf,

    /// Descriptor parsed from the declaration
    pub descriptor: ModuleDescriptor,

    /// Source folders, sorted ascending by release
    pub sources: Vec<SourceFolder>,

    /// Resource folders, sorted ascending by release
    pub resources: Vec<SourceFolder>,
}

impl DeclaredModule {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn main_class(&self) -> Option<&str> {
        self.descriptor.main_class.as_deref()
    }

    /// The lowest source folder, compiled for the code space release.
    pub fn base(&self) -> Option<&SourceFolder> {
        self.sources.first()
    }

    /// Source folders layered over the base folder.
    pub fn overlays(&self) -> &[SourceFolder] {
        self.sources.get(1..).unwrap_or(&[])
    }

    /// Check whether this module is packaged as a multi-release archive.
    pub fn is_multi_release(&self) -> bool {
        self.sources.len() > 1
    }

    /// Directory that holds the module declaration; used as module source path.
    pub fn declaration_dir(&self) -> &Path {
        self.info.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Names of all modules this module requires, `requires static` included.
    pub fn required_names(&self) -> Vec<&str> {
        self.descriptor.required_names(true)
    }

    /// Check whether a path lies inside one of this module's source folders.
    pub fn owns(&self, path: &Path) -> bool {
        self.sources.iter().any(|folder| path.starts_with(&folder.path))
    }
}
