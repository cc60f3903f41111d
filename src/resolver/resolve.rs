//! Fixed-point resolution of missing external modules.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::builder::logbook::Logbook;
use crate::core::descriptor::{is_system_module, DescriptorReader};
use crate::core::locator::{ExternalModuleLocation, LocatorChain};
use crate::core::project::ARCHIVE_EXTENSION;
use crate::resolver::errors::ResolveError;
use crate::sources::transport::Transport;
use crate::util::fs::list_files_with_extension;
use crate::util::hash::sha256_file;

/// Iteration cap used when some locator can answer for unboundedly many modules.
pub const UNBOUNDED_ITERATION_LIMIT: usize = 64;

/// Outcome of a resolution pass.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Archives fetched during this pass
    pub fetched: Vec<PathBuf>,
    /// Number of iterations that tried to fetch something
    pub iterations: usize,
    /// Modules no locator could answer for
    pub not_locatable: BTreeSet<String>,
}

/// Modules present in the external module directory.
#[derive(Debug, Default)]
struct Present {
    names: BTreeSet<String>,
    requires: BTreeSet<String>,
}

/// Fetches required modules into a destination directory until closure.
pub struct ModuleResolver<'a> {
    locators: &'a LocatorChain,
    transport: &'a dyn Transport,
    reader: &'a dyn DescriptorReader,
    destination: &'a Path,
    logbook: &'a Logbook,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(
        locators: &'a LocatorChain,
        transport: &'a dyn Transport,
        reader: &'a dyn DescriptorReader,
        destination: &'a Path,
        logbook: &'a Logbook,
    ) -> Self {
        ModuleResolver {
            locators,
            transport,
            reader,
            destination,
            logbook,
        }
    }

    /// Maximum number of fetching iterations of one pass.
    pub fn iteration_limit(&self) -> usize {
        self.locators
            .candidates()
            .map(|n| n + 1)
            .unwrap_or(UNBOUNDED_ITERATION_LIMIT)
    }

    /// Resolve `required` against `declared` and the destination directory.
    ///
    /// Each iteration locates and fetches every missing module, then rereads
    /// the requirements of all fetched archives. The pass ends when nothing is
    /// missing; an iteration that fetches nothing new fails with
    /// [`ResolveError::UnresolvedClosure`].
    pub fn resolve(
        &self,
        required: &BTreeSet<String>,
        declared: &BTreeSet<String>,
    ) -> Result<Resolution, ResolveError> {
        let limit = self.iteration_limit();
        let mut resolution = Resolution::default();
        let mut attempted = BTreeSet::new();
        let mut present = self.present()?;

        loop {
            let wanted: BTreeSet<String> = required.union(&present.requires).cloned().collect();
            let missing = missing(&wanted, declared, &present.names);
            if missing.is_empty() {
                break;
            }
            if resolution.iterations >= limit {
                return Err(ResolveError::IterationLimit {
                    limit,
                    missing: missing.into_iter().collect(),
                });
            }
            resolution.iterations += 1;
            debug!(
                "Resolution iteration {}: missing {}",
                resolution.iterations,
                missing.iter().cloned().collect::<Vec<_>>().join(", ")
            );

            let mut fetched_any = false;
            for module in &missing {
                if !attempted.insert(module.clone()) {
                    continue;
                }
                let located = self
                    .locators
                    .locate(module)
                    .map_err(|source| ResolveError::Locator {
                        module: module.clone(),
                        source,
                    })?;
                match located {
                    Some(location) => {
                        resolution.fetched.push(self.fetch(&location)?);
                        fetched_any = true;
                    }
                    None => {
                        self.logbook
                            .warning(format!("Module {} not locatable", module));
                        resolution.not_locatable.insert(module.clone());
                    }
                }
            }

            if !fetched_any {
                return Err(ResolveError::UnresolvedClosure {
                    missing: missing.into_iter().collect(),
                });
            }
            present = self.present()?;
        }

        Ok(resolution)
    }

    fn fetch(&self, location: &ExternalModuleLocation) -> Result<PathBuf, ResolveError> {
        let module = &location.module;
        let target = self
            .destination
            .join(format!("{}.{}", module, ARCHIVE_EXTENSION));
        let path = self
            .transport
            .fetch(location.fetch_uri(), &target)
            .map_err(|source| ResolveError::Fetch {
                module: module.clone(),
                source,
            })?;

        let verify = |message: String| ResolveError::Verify {
            module: module.clone(),
            message,
        };
        if let Some(expected) = location.size() {
            let actual = std::fs::metadata(&path)
                .map_err(|e| verify(e.to_string()))?
                .len();
            if actual != expected {
                let _ = std::fs::remove_file(&path);
                return Err(verify(format!("expected {} bytes, got {}", expected, actual)));
            }
        }
        if let Some(expected) = location.sha256() {
            let actual = sha256_file(&path).map_err(|e| verify(format!("{:#}", e)))?;
            if !actual.eq_ignore_ascii_case(&expected) {
                let _ = std::fs::remove_file(&path);
                return Err(verify(format!(
                    "expected sha256 {}, got {}",
                    expected, actual
                )));
            }
        }

        self.logbook
            .debug(format!("Fetched {} from {}", module, location.fetch_uri()));
        Ok(path)
    }

    /// Names and run-time requirements of archives in the destination directory.
    fn present(&self) -> Result<Present, ResolveError> {
        let archives = list_files_with_extension(self.destination, ARCHIVE_EXTENSION).map_err(
            |e| ResolveError::Scan {
                path: self.destination.to_path_buf(),
                message: format!("{:#}", e),
            },
        )?;

        let mut present = Present::default();
        for archive in archives {
            let descriptor =
                self.reader
                    .describe(&archive)
                    .map_err(|source| ResolveError::Describe {
                        path: archive.clone(),
                        source,
                    })?;
            // archives are stored under the name they were located by
            if let Some(stem) = archive.file_stem() {
                present.names.insert(stem.to_string_lossy().into_owned());
            }
            present.names.insert(descriptor.name.clone());
            present.requires.extend(
                descriptor
                    .required_names(false)
                    .into_iter()
                    .map(str::to_string),
            );
        }
        Ok(present)
    }
}

/// `required - declared - present`, ignoring platform modules.
pub fn missing(
    required: &BTreeSet<String>,
    declared: &BTreeSet<String>,
    present: &BTreeSet<String>,
) -> BTreeSet<String> {
    required
        .iter()
        .filter(|name| !is_system_module(name))
        .filter(|name| !declared.contains(*name) && !present.contains(*name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{ArchiveDescriptorReader, ModuleDescriptor};
    use crate::core::locator::{Locator, LocatorError, ModuleLocations, Stability};
    use crate::test_support::{module_info_class, FakeTransport};
    use crate::util::hash::sha256_bytes;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn jar(descriptor: &ModuleDescriptor) -> Vec<u8> {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x.jar");
        crate::test_support::write_module_jar(&path, descriptor);
        std::fs::read(path).unwrap()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    struct Fixture {
        dir: TempDir,
        logbook: Logbook,
        reader: ArchiveDescriptorReader,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                dir: TempDir::new().unwrap(),
                logbook: Logbook::new(),
                reader: ArchiveDescriptorReader,
            }
        }

        fn resolver<'a>(
            &'a self,
            locators: &'a LocatorChain,
            transport: &'a FakeTransport,
        ) -> ModuleResolver<'a> {
            ModuleResolver::new(locators, transport, &self.reader, self.dir.path(), &self.logbook)
        }
    }

    #[test]
    fn test_missing_ignores_declared_present_and_system() {
        let required = set(&["java.base", "jdk.jfr", "a", "b", "c"]);
        assert_eq!(missing(&required, &set(&["a"]), &set(&["b"])), set(&["c"]));
    }

    #[test]
    fn test_transitive_closure() {
        let fixture = Fixture::new();
        let transport = FakeTransport::new()
            .with("mem:a", jar(&ModuleDescriptor::new("a").with_requires("b")))
            .with(
                "mem:b",
                jar(&ModuleDescriptor::new("b").with_requires("java.sql")),
            );
        let locators = LocatorChain::new().with(ModuleLocations::new(BTreeMap::from([
            ("a".into(), "mem:a".into()),
            ("b".into(), "mem:b".into()),
        ])));

        let resolution = fixture
            .resolver(&locators, &transport)
            .resolve(&set(&["a"]), &BTreeSet::new())
            .unwrap();
        assert_eq!(resolution.iterations, 2);
        assert_eq!(resolution.fetched.len(), 2);
        assert!(fixture.dir.path().join("a.jar").is_file());
        assert!(fixture.dir.path().join("b.jar").is_file());

        // everything present now: nothing to do
        let again = fixture
            .resolver(&locators, &transport)
            .resolve(&set(&["a"]), &BTreeSet::new())
            .unwrap();
        assert_eq!(again.iterations, 0);
        assert_eq!(transport.fetch_count(), 2);
    }

    #[test]
    fn test_static_requires_of_archives_are_not_followed() {
        let fixture = Fixture::new();
        let mut descriptor = ModuleDescriptor::new("a");
        descriptor.requires.push(crate::core::descriptor::Requires {
            name: "optional".into(),
            is_static: true,
            is_transitive: false,
        });
        let transport = FakeTransport::new().with("mem:a", jar(&descriptor));
        let locators = LocatorChain::new().with(ModuleLocations::new(BTreeMap::from([(
            "a".into(),
            "mem:a".into(),
        )])));

        let resolution = fixture
            .resolver(&locators, &transport)
            .resolve(&set(&["a"]), &BTreeSet::new())
            .unwrap();
        assert_eq!(resolution.fetched.len(), 1);
    }

    #[test]
    fn test_unresolved_closure() {
        let fixture = Fixture::new();
        let transport = FakeTransport::new().with(
            "mem:a",
            jar(&ModuleDescriptor::new("a").with_requires("ghost")),
        );
        let locators = LocatorChain::new().with(ModuleLocations::new(BTreeMap::from([(
            "a".into(),
            "mem:a".into(),
        )])));

        let err = fixture
            .resolver(&locators, &transport)
            .resolve(&set(&["a", "declared"]), &set(&["declared"]))
            .unwrap_err();
        match err {
            ResolveError::UnresolvedClosure { missing } => assert_eq!(missing, vec!["ghost"]),
            other => panic!("unexpected error: {}", other),
        }
        assert!(fixture
            .logbook
            .notes()
            .iter()
            .any(|note| matches!(note, crate::builder::logbook::Note::Message { text, .. } if text.contains("ghost"))));
    }

    /// Answers for every module `mN` with an archive requiring `mN+1`.
    struct Endless;

    impl Locator for Endless {
        fn title(&self) -> String {
            "endless".into()
        }
        fn stability(&self) -> Stability {
            Stability::Dynamic
        }
        fn locate(&self, module: &str) -> Result<Option<ExternalModuleLocation>, LocatorError> {
            Ok(Some(ExternalModuleLocation::new(module, format!("mem:{}", module))))
        }
    }

    #[test]
    fn test_endless_chain_hits_iteration_limit() {
        let fixture = Fixture::new();
        let transport = (0..80).fold(FakeTransport::new(), |transport, i| {
            transport.with(
                &format!("mem:m{}", i),
                jar(&ModuleDescriptor::new(format!("m{}", i)).with_requires(format!("m{}", i + 1))),
            )
        });
        let locators = LocatorChain::new().with(Endless);
        let resolver = fixture.resolver(&locators, &transport);
        assert_eq!(resolver.iteration_limit(), UNBOUNDED_ITERATION_LIMIT);

        let err = resolver.resolve(&set(&["m0"]), &BTreeSet::new()).unwrap_err();
        match err {
            ResolveError::IterationLimit { limit, missing } => {
                assert_eq!(limit, UNBOUNDED_ITERATION_LIMIT);
                assert_eq!(missing, vec![format!("m{}", UNBOUNDED_ITERATION_LIMIT)]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(transport.fetch_count(), UNBOUNDED_ITERATION_LIMIT);
    }

    #[test]
    fn test_limit_follows_candidates() {
        let fixture = Fixture::new();
        // a -> b -> c chain, but locators only know 1 candidate: limit is 2
        let transport = FakeTransport::new()
            .with("mem:a", jar(&ModuleDescriptor::new("a").with_requires("b")))
            .with("mem:b", jar(&ModuleDescriptor::new("b").with_requires("c")))
            .with("mem:c", jar(&ModuleDescriptor::new("c")));
        let locators = LocatorChain::new().with(ModuleLocations::new(BTreeMap::from([(
            "a".into(),
            "mem:a".into(),
        )])));
        let resolver = fixture.resolver(&locators, &transport);
        assert_eq!(resolver.iteration_limit(), 2);

        // "b" is not locatable: the second iteration fetches nothing
        let err = resolver.resolve(&set(&["a"]), &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, ResolveError::UnresolvedClosure { .. }));
    }

    #[test]
    fn test_checksum_verification() {
        let fixture = Fixture::new();
        let bytes = jar(&ModuleDescriptor::new("a"));
        let good = format!("mem:a#sha256={}&size={}", sha256_bytes(&bytes), bytes.len());
        let transport = FakeTransport::new().with("mem:a", bytes);

        let locators =
            LocatorChain::new().with(ModuleLocations::new(BTreeMap::from([("a".into(), good)])));
        assert!(fixture
            .resolver(&locators, &transport)
            .resolve(&set(&["a"]), &BTreeSet::new())
            .is_ok());

        let fixture = Fixture::new();
        let locators = LocatorChain::new().with(ModuleLocations::new(BTreeMap::from([(
            "a".into(),
            "mem:a#sha256=00".into(),
        )])));
        let err = fixture
            .resolver(&locators, &transport)
            .resolve(&set(&["a"]), &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, ResolveError::Verify { .. }));
        assert!(!fixture.dir.path().join("a.jar").exists());
    }

    #[test]
    fn test_explicit_location_is_fetched() {
        let fixture = Fixture::new();
        let transport = FakeTransport::new()
            .with("mem:explicit", module_info_jar("e"))
            .with("mem:dynamic", module_info_jar("e"));
        struct Everything;
        impl Locator for Everything {
            fn title(&self) -> String {
                "everything".into()
            }
            fn stability(&self) -> Stability {
                Stability::Dynamic
            }
            fn locate(
                &self,
                module: &str,
            ) -> Result<Option<ExternalModuleLocation>, LocatorError> {
                Ok(Some(ExternalModuleLocation::new(module, "mem:dynamic")))
            }
        }
        let locators = LocatorChain::new()
            .with(Everything)
            .with(ModuleLocations::new(BTreeMap::from([(
                "e".into(),
                "mem:explicit".into(),
            )])));

        fixture
            .resolver(&locators, &transport)
            .resolve(&set(&["e"]), &BTreeSet::new())
            .unwrap();
        assert_eq!(transport.fetch_count(), 1);
        assert!(fixture
            .logbook
            .notes()
            .iter()
            .any(|note| matches!(note, crate::builder::logbook::Note::Message { text, .. } if text.contains("mem:explicit"))));
    }

    fn module_info_jar(name: &str) -> Vec<u8> {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.jar");
        crate::test_support::write_jar(
            &path,
            &[("module-info.class", module_info_class(&ModuleDescriptor::new(name)))],
        );
        std::fs::read(path).unwrap()
    }
}
