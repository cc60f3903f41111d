//! Code spaces.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::module::DeclaredModule;

/// Name of the main code space.
pub const MAIN: &str = "main";

/// Name of the test code space.
pub const TEST: &str = "test";

/// A group of declared modules sharing compilation settings.
#[derive(Debug, Clone)]
pub struct Space {
    /// Space name, e.g. "main" or "test"
    pub name: String,

    /// Declared modules, keyed and ordered by module name
    pub modules: BTreeMap<String, DeclaredModule>,

    /// Module path entries searched during compilation, in order
    pub module_paths: Vec<PathBuf>,

    /// Release targeted by non-targeted source folders
    pub release: u32,
}

impl Space {
    pub fn new(name: impl Into<String>, release: u32) -> Self {
        Space {
            name: name.into(),
            modules: BTreeMap::new(),
            module_paths: Vec::new(),
            release,
        }
    }

    pub fn is_main(&self) -> bool {
        self.name == MAIN
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn find(&self, name: &str) -> Option<&DeclaredModule> {
        self.modules.get(name)
    }

    /// Suffix appended to per-space directory and archive names.
    pub fn suffix(&self) -> String {
        suffix(&self.name)
    }
}

/// Suffix of a space name: empty for the main space, `-<name>` otherwise.
pub fn suffix(space: &str) -> String {
    if space == MAIN {
        String::new()
    } else {
        format!("-{}", space)
    }
}
