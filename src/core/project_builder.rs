//! Derive a [`Project`] from a source tree and configuration.
//!
//! Module declarations are found by scanning the project root. Each one is
//! classified into a code space by glob patterns (test patterns first) and its
//! source folders are derived from the directory layout:
//!
//! ```text
//! module-info.java                  no folders
//! foo/module-info.java              "foo" is the only source folder
//! foo/main/java/module-info.java    "main" is the space directory; its
//! foo/main/java-11/...              "java*" children are release-targeted
//! foo/main/resources/...            source folders, "resource*" children
//!                                   are resource folders
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::core::descriptor::{DescriptorError, ModuleDescriptor};
use crate::core::locator::{JUnitLocator, LocatorChain, ModuleLocations, ModulesIndexLocator};
use crate::core::module::{DeclaredModule, SourceFolder};
use crate::core::project::{Folders, Library, Project, Tools};
use crate::core::space::{Space, MAIN, TEST};
use crate::sources::transport::Transport;
use crate::util::context::METADATA_DIR;
use crate::util::fs::{self as sfs, MODULE_INFO_JAVA};
use crate::util::{Config, GlobalContext};

/// Maximum directory depth scanned for module declarations.
pub const MAX_SCAN_DEPTH: usize = 9;

/// Patterns classifying declarations into the main space.
pub const DEFAULT_MAIN_PATTERNS: &[&str] = &["module-info.java", "**/module-info.java"];

/// Patterns classifying declarations into the test space.
pub const DEFAULT_TEST_PATTERNS: &[&str] = &[
    "**/test/java/module-info.java",
    "**/test/java-module/module-info.java",
];

/// Error deriving the project model.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("expected a directory or a module declaration: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("cannot derive the layout of {}: its directory is neither named after the module nor nested in a space directory", .0.display())]
    AmbiguousDeclaration(PathBuf),

    #[error("module `{name}` is declared twice: {} and {}", first.display(), second.display())]
    DuplicateModule {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("failed to read module declaration {}: {source}", path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: DescriptorError,
    },

    #[error("invalid module pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("release suffix of source folder {} is out of range", .0.display())]
    InvalidRelease(PathBuf),

    #[error("failed to scan project: {0:#}")]
    Scan(anyhow::Error),
}

/// Builds the project model once per invocation.
pub struct ProjectBuilder<'a> {
    ctx: &'a GlobalContext,
    config: &'a Config,
    transport: Arc<dyn Transport>,
}

impl<'a> ProjectBuilder<'a> {
    pub fn new(ctx: &'a GlobalContext, config: &'a Config, transport: Arc<dyn Transport>) -> Self {
        ProjectBuilder {
            ctx,
            config,
            transport,
        }
    }

    /// Build the project.
    pub fn build(&self) -> Result<Project, ProjectError> {
        let root = self.ctx.root();
        let name = self
            .config
            .project
            .name
            .clone()
            .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unnamed".to_string());
        let version = self
            .config
            .project
            .version
            .clone()
            .unwrap_or_else(|| "0".to_string());

        let folders = Folders::new(root);
        let spaces = self.build_spaces(&folders)?;
        let tools = Tools {
            limit: self.config.tools.limit.clone(),
            skip: self.config.tools.skip.clone(),
            tweaks: self.config.tools.tweaks.clone(),
        };
        let library = self.build_library();

        debug!("Project {} {} in {}", name, version, root.display());
        Ok(Project {
            name,
            version,
            folders,
            spaces,
            tools,
            library,
        })
    }

    /// Scan the root and classify declarations into the main and test spaces.
    pub fn build_spaces(&self, folders: &Folders) -> Result<Vec<Space>, ProjectError> {
        let root = folders.root();
        let paths =
            sfs::find_module_declarations(root, MAX_SCAN_DEPTH).map_err(ProjectError::Scan)?;
        debug!("Build spaces from {} module declaration(s)", paths.len());

        let main_patterns = compile_patterns(&self.config.main.patterns, DEFAULT_MAIN_PATTERNS)?;
        let test_patterns = compile_patterns(&self.config.test.patterns, DEFAULT_TEST_PATTERNS)?;

        let release = self.config.main_release();
        let mut main = Space::new(MAIN, release);
        let mut test = Space::new(TEST, release);

        for path in paths {
            let relative = sfs::relative_path(root, &path);
            if relative.components().any(|c| c.as_os_str() == METADATA_DIR) {
                trace!("Skip {} - inside metadata directory", relative.display());
                continue;
            }
            let entry = sfs::to_entry_name(&relative);
            let space = if test_patterns.iter().any(|p| p.matches(&entry)) {
                &mut test
            } else if main_patterns.iter().any(|p| p.matches(&entry)) {
                &mut main
            } else {
                trace!("Skip {} - matches no code space", entry);
                continue;
            };

            if let Some(owner) = space.modules.values().find(|m| m.owns(&path)) {
                trace!("Skip {} - part of module {}", entry, owner.name());
                continue;
            }

            let module = self.declared_module(root, &path)?;
            if let Some(existing) = space.modules.get(module.name()) {
                return Err(ProjectError::DuplicateModule {
                    name: module.name().to_string(),
                    first: existing.info.clone(),
                    second: module.info.clone(),
                });
            }
            debug!("{} module {} declared in {}", space.name, module.name(), entry);
            space.modules.insert(module.name().to_string(), module);
        }

        main.module_paths = std::iter::once(folders.external_modules().to_path_buf())
            .chain(self.config.main.module_paths.iter().map(|p| root.join(p)))
            .collect();
        test.module_paths = [
            folders.modules(MAIN),
            folders.external_modules().to_path_buf(),
        ]
        .into_iter()
        .chain(self.config.test.module_paths.iter().map(|p| root.join(p)))
        .collect();

        debug!("Main space modules: {}", main.names().join(", "));
        debug!("Test space modules: {}", test.names().join(", "));
        Ok(vec![main, test])
    }

    /// Derive a declared module from a `module-info.java` file or its directory.
    pub fn declared_module(&self, root: &Path, path: &Path) -> Result<DeclaredModule, ProjectError> {
        let info = if path.is_dir() {
            path.join(MODULE_INFO_JAVA)
        } else if path.file_name().is_some_and(|n| n == MODULE_INFO_JAVA) {
            path.to_path_buf()
        } else {
            return Err(ProjectError::NotADirectory(path.to_path_buf()));
        };
        let descriptor = read_declaration(&info)?;
        let with_sources = self.config.build.jar_with_sources;

        let relative = sfs::relative_path(root, &info);
        let parent = info.parent().unwrap_or(root);
        if relative.components().count() == 1 {
            return Ok(DeclaredModule {
                info,
                descriptor,
                sources: Vec::new(),
                resources: Vec::new(),
            });
        }

        if sfs::file_name(parent) == descriptor.name {
            let folder = SourceFolder::new(parent, 0);
            let resources = if with_sources {
                vec![folder.clone()]
            } else {
                Vec::new()
            };
            let mut module = DeclaredModule {
                info,
                descriptor,
                sources: vec![folder],
                resources,
            };
            detect_main_class(&mut module);
            return Ok(module);
        }

        if relative.components().count() == 2 {
            return Err(ProjectError::AmbiguousDeclaration(info));
        }
        let space_dir = parent
            .parent()
            .ok_or_else(|| ProjectError::AmbiguousDeclaration(info.clone()))?;
        let sources = source_folders(space_dir, "java")?;
        let resources = source_folders(space_dir, if with_sources { "" } else { "resource" })?;

        // Prefer the lowest folder that carries a declaration
        let info = sources
            .iter()
            .map(|folder| folder.path.join(MODULE_INFO_JAVA))
            .find(|candidate| candidate.is_file())
            .unwrap_or(info);
        let descriptor = read_declaration(&info)?;

        let mut module = DeclaredModule {
            info,
            descriptor,
            sources,
            resources,
        };
        detect_main_class(&mut module);
        Ok(module)
    }

    fn build_library(&self) -> Library {
        let externals = &self.config.externals;
        let mut locators = LocatorChain::new();

        if !externals.locations.is_empty() {
            locators.push(Arc::new(ModuleLocations::new(externals.locations.clone())));
        }
        for (library, version) in &externals.libraries {
            match library.as_str() {
                "junit" => locators.push(Arc::new(JUnitLocator::new(version.clone()))),
                other => warn!("Unknown library `{}` ignored", other),
            }
        }
        if let Some(index) = &externals.index {
            let cache = self.ctx.metadata_dir().join("modules-index.properties");
            locators.push(Arc::new(ModulesIndexLocator::new(
                index.uri.clone(),
                index.pinned,
                cache,
                Arc::clone(&self.transport),
            )));
        }

        Library {
            requires: self.config.project.requires.iter().cloned().collect(),
            locators,
        }
    }
}

fn compile_patterns(
    configured: &[String],
    defaults: &[&str],
) -> Result<Vec<Pattern>, ProjectError> {
    let patterns: Vec<String> = if configured.is_empty() {
        defaults.iter().map(|p| p.to_string()).collect()
    } else {
        configured.to_vec()
    };
    patterns
        .into_iter()
        .map(|pattern| {
            Pattern::new(&pattern).map_err(|source| ProjectError::Pattern { pattern, source })
        })
        .collect()
}

fn read_declaration(info: &Path) -> Result<ModuleDescriptor, ProjectError> {
    let descriptor_error = |source| ProjectError::Descriptor {
        path: info.to_path_buf(),
        source,
    };
    let text = std::fs::read_to_string(info)
        .map_err(|e| descriptor_error(DescriptorError::Io(e)))?;
    ModuleDescriptor::parse_source(&text).map_err(descriptor_error)
}

/// Collect the child directories of `dir` whose names start with `prefix`.
fn source_folders(dir: &Path, prefix: &str) -> Result<Vec<SourceFolder>, ProjectError> {
    if !dir.is_dir() {
        return Err(ProjectError::NotADirectory(dir.to_path_buf()));
    }
    let mut folders = sfs::list_dirs(dir)
        .map_err(ProjectError::Scan)?
        .into_iter()
        .filter(|path| sfs::file_name(path).starts_with(prefix))
        .map(|path| SourceFolder::of(&path).ok_or(ProjectError::InvalidRelease(path)))
        .collect::<Result<Vec<_>, _>>()?;
    folders.sort_by_key(|folder| folder.release);
    Ok(folders)
}

fn detect_main_class(module: &mut DeclaredModule) {
    if module.descriptor.main_class.is_some() {
        return;
    }
    let Some(base) = module.base() else {
        return;
    };
    let package: PathBuf = module.name().split('.').collect();
    if base.path.join(package).join("Main.java").is_file() {
        module.descriptor.main_class = Some(format!("{}.Main", module.name()));
    }
}

/// Render the module table of a project, used by verbose output.
pub fn describe_spaces(spaces: &[Space]) -> BTreeMap<String, Vec<String>> {
    spaces
        .iter()
        .map(|space| {
            let modules = space
                .modules
                .values()
                .map(|module| {
                    let releases: Vec<String> = module
                        .sources
                        .iter()
                        .map(|folder| folder.release.to_string())
                        .collect();
                    format!("{} [{}]", module.name(), releases.join(", "))
                })
                .collect();
            (space.name.clone(), modules)
        })
        .collect()
}
