//! Tool call planning.
//!
//! The planner turns the project model into concrete tool calls. It never
//! runs anything; the pipeline decides the order and what a failure means.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::builder::call::ToolCall;
use crate::builder::provider::{FinderChain, ModuleLauncher, ToolFinder};
use crate::core::module::{DeclaredModule, SourceFolder};
use crate::core::project::Project;
use crate::core::space::{Space, MAIN};
use crate::util::fs::{join_paths, relative_files, MODULE_INFO_CLASS, MODULE_INFO_JAVA};

/// Plans the tool calls of a project build.
pub struct CallPlanner<'a> {
    project: &'a Project,
}

impl<'a> CallPlanner<'a> {
    pub fn new(project: &'a Project) -> Self {
        CallPlanner { project }
    }

    /// Existing module path entries of a space.
    pub fn module_path(&self, space: &Space) -> Vec<PathBuf> {
        space
            .module_paths
            .iter()
            .filter(|path| path.exists())
            .cloned()
            .collect()
    }

    /// Compile all modules of a space for the space release.
    pub fn compile(&self, space: &Space) -> Option<ToolCall> {
        if space.is_empty() {
            return None;
        }
        let folders = &self.project.folders;

        let mut call = ToolCall::new("javac").with_option("--module", space.names().join(","));
        for module in space.modules.values() {
            call = call.with_option(
                "--module-source-path",
                format!("{}={}", module.name(), module.declaration_dir().display()),
            );
        }
        let module_path = self.module_path(space);
        if !module_path.is_empty() {
            call = call.with_option("--module-path", join_paths(&module_path));
        }
        if !space.is_main() {
            for (name, base) in self.main_bases(space) {
                call = call.with_option(
                    "--patch-module",
                    format!("{}={}", name, base.path.display()),
                );
            }
        }
        Some(
            call.with_option("--release", space.release)
                .with_option("--module-version", &self.project.version)
                .with_path("-d", &folders.classes(&space.name, space.release)),
        )
    }

    /// Main space base folders of the modules a test space patches.
    fn main_bases(&self, space: &Space) -> Vec<(&'a str, &'a SourceFolder)> {
        let Some(main) = self.project.main() else {
            return Vec::new();
        };
        space
            .modules
            .keys()
            .filter_map(|name| main.find(name))
            .filter_map(|module| Some((module.name(), module.base()?)))
            .collect()
    }

    /// Compile the release-targeted folders of every module in a space.
    ///
    /// Each overlay is compiled against the base classes of its module.
    /// Module declarations in overlays are not recompiled.
    pub fn compile_overlays(&self, space: &Space) -> Result<Vec<ToolCall>> {
        let folders = &self.project.folders;
        let base_classes = folders.classes(&space.name, space.release);
        let mut module_path = vec![base_classes];
        module_path.extend(self.module_path(space));

        let mut calls = Vec::new();
        for module in space.modules.values() {
            for overlay in module.overlays() {
                if overlay.release == space.release {
                    bail!(
                        "module {}: folder {} targets release {}, which is the base release of the {} space",
                        module.name(),
                        overlay.path.display(),
                        overlay.release,
                        space.name
                    );
                }
                let files: Vec<String> = relative_files(&overlay.path)?
                    .into_iter()
                    .filter(|name| name.ends_with(".java") && name != MODULE_INFO_JAVA)
                    .collect();
                if files.is_empty() {
                    continue;
                }
                let classes =
                    folders.module_classes(&space.name, overlay.release, module.name());
                calls.push(
                    ToolCall::new("javac")
                        .with_option("--release", overlay.release)
                        .with_option("--module-path", join_paths(&module_path))
                        .with_option(
                            "--patch-module",
                            format!("{}={}", module.name(), overlay.path.display()),
                        )
                        .with("-implicit:none")
                        .with_path("-d", &classes)
                        .with_all(files.iter().map(|name| overlay.path.join(name).display().to_string())),
                );
            }
        }
        Ok(calls)
    }

    /// Package one module into its archive.
    ///
    /// Base classes and untargeted resources go to the archive root; every
    /// other release goes to its own `--release` section. Only the first
    /// `module-info.class` encountered is packaged.
    pub fn package(&self, space: &Space, module: &DeclaredModule) -> Result<ToolCall> {
        let folders = &self.project.folders;
        let version = &self.project.version;
        let file = folders.module_archive(&space.name, module.name(), version);

        let mut call = ToolCall::new("jar")
            .with("--create")
            .with_path("--file", &file)
            .with_option("--module-version", version);
        if let Some(main_class) = module.main_class() {
            call = call.with_option("--main-class", main_class);
        }

        let mut layers: BTreeMap<u32, Vec<(PathBuf, Vec<String>)>> = BTreeMap::new();
        layers.entry(0).or_default().push((
            folders.module_classes(&space.name, space.release, module.name()),
            Vec::new(),
        ));
        for overlay in module.overlays() {
            layers.entry(overlay.release).or_default().push((
                folders.module_classes(&space.name, overlay.release, module.name()),
                Vec::new(),
            ));
        }
        // Folders up to the base release belong to the archive root
        let base_release = module.base().map_or(0, |base| base.release);
        for resource in &module.resources {
            let layer = if resource.release <= base_release {
                0
            } else {
                resource.release
            };
            layers
                .entry(layer)
                .or_default()
                .push((resource.path.clone(), Vec::new()));
        }

        let mut descriptors = Descriptors::default();
        for inputs in layers.values_mut() {
            for (dir, names) in inputs.iter_mut() {
                if !dir.is_dir() {
                    continue;
                }
                *names = relative_files(dir)?
                    .into_iter()
                    .filter(|name| descriptors.admit(name))
                    .collect();
            }
        }

        for (release, inputs) in layers {
            if inputs.iter().all(|(_, names)| names.is_empty()) {
                continue;
            }
            if release != 0 {
                call = call.with_option("--release", release);
            }
            for (dir, names) in inputs {
                if names.is_empty() {
                    continue;
                }
                call = call.with_path("-C", &dir).with_all(names);
            }
        }
        Ok(call)
    }

    /// Archive the sources of a main module, if it has source folders.
    pub fn package_sources(&self, module: &DeclaredModule) -> Option<ToolCall> {
        let base = module.base()?;
        let file = self
            .project
            .folders
            .sources_archive(module.name(), &self.project.version);
        let mut call = ToolCall::new("jar")
            .with("--create")
            .with_path("--file", &file)
            .with("--no-manifest")
            .with_path("-C", &base.path)
            .with(".");
        for overlay in module.overlays() {
            call = call
                .with_option("--release", overlay.release)
                .with_path("-C", &overlay.path)
                .with(".");
        }
        Some(call)
    }

    /// Generate API documentation for the main space.
    pub fn document(&self, space: &Space) -> Option<ToolCall> {
        if space.is_empty() {
            return None;
        }
        let mut call = ToolCall::new("javadoc").with_option("--module", space.names().join(","));
        for module in space.modules.values() {
            call = call.with_option(
                "--module-source-path",
                format!("{}={}", module.name(), module.declaration_dir().display()),
            );
        }
        let module_path = self.module_path(space);
        if !module_path.is_empty() {
            call = call.with_option("--module-path", join_paths(&module_path));
        }
        Some(
            call.with("-quiet")
                .with_option("-encoding", "UTF-8")
                .with_path("-d", &self.api_dir()),
        )
    }

    /// Archive the generated API documentation.
    pub fn document_archive(&self) -> ToolCall {
        let file = self.project.folders.documentation().join(format!(
            "{}@{}-api.zip",
            self.project.name, self.project.version
        ));
        ToolCall::new("jar")
            .with("--create")
            .with_path("--file", &file)
            .with("--no-manifest")
            .with_path("-C", &self.api_dir())
            .with(".")
    }

    fn api_dir(&self) -> PathBuf {
        self.project.folders.documentation().join("api")
    }

    /// Module path used to link the main space image.
    pub fn link_module_path(&self, space: &Space) -> Vec<PathBuf> {
        let mut path = vec![self.project.folders.modules(&space.name)];
        path.extend(self.module_path(space));
        path
    }

    /// Link a custom runtime image of the main space.
    pub fn link(&self, space: &Space) -> Option<ToolCall> {
        if space.is_empty() {
            return None;
        }
        let mut call = ToolCall::new("jlink")
            .with_option("--add-modules", space.names().join(","))
            .with_option("--module-path", join_paths(&self.link_module_path(space)))
            .with_path("--output", &self.project.folders.image());

        let launcher = space
            .modules
            .values()
            .find_map(|m| m.main_class().map(|main| (m.name(), main)));
        if let Some((module, main_class)) = launcher {
            call = call.with_option(
                "--launcher",
                format!("{}={}/{}", self.project.name, module, main_class),
            );
        }
        Some(call)
    }

    /// Module path of a test run: the module under test first, then the
    /// main modules, the other test archives and the external modules.
    pub fn test_module_path(&self, space: &Space, module: &DeclaredModule) -> Vec<PathBuf> {
        let folders = &self.project.folders;
        let version = &self.project.version;
        let mut path = vec![folders.module_archive(&space.name, module.name(), version)];
        for name in self.project.main().map(|main| main.names()).unwrap_or_default() {
            path.push(folders.module_archive(MAIN, name, version));
        }
        for other in space.names().into_iter().filter(|n| *n != module.name()) {
            path.push(folders.module_archive(&space.name, other, version));
        }
        path.push(folders.external_modules().to_path_buf());
        path
    }

    /// Run the tests of one module with the JUnit console launcher.
    pub fn test(
        &self,
        space: &Space,
        module: &DeclaredModule,
        finder: Arc<dyn ToolFinder>,
    ) -> ToolCall {
        let launcher = ModuleLauncher::new(self.test_module_path(space, module));
        let finder = FinderChain::new().with(finder).with(Arc::new(launcher));
        let reports = self
            .project
            .folders
            .reports("junit", &space.name, module.name());
        ToolCall::new("junit")
            .with_option("--select-module", module.name())
            .with_path("--reports-dir", &reports)
            .with("--disable-banner")
            .with_finder(Arc::new(finder))
    }
}

/// Tracks which module descriptors were already packaged.
#[derive(Debug, Default)]
struct Descriptors {
    class: bool,
    source: bool,
}

impl Descriptors {
    fn admit(&mut self, name: &str) -> bool {
        match name {
            MODULE_INFO_CLASS => !std::mem::replace(&mut self.class, true),
            MODULE_INFO_JAVA => !std::mem::replace(&mut self.source, true),
            _ => true,
        }
    }
}
