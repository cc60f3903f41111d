//! Module descriptors - WHAT a module is named and WHICH modules it requires.
//!
//! Descriptors are read from three kinds of input:
//! - `module-info.java` compilation units of declared modules
//! - compiled `module-info.class` files
//! - modular archives, including automatic modules without a descriptor

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::util::fs::MODULE_INFO_CLASS;

const CLASS_MAGIC: u32 = 0xCAFE_BABE;
const ACC_TRANSITIVE: u16 = 0x0020;
const ACC_STATIC_PHASE: u16 = 0x0040;

static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").unwrap());

static MODULE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:open\s+)?module\s+([A-Za-z_$][\w$]*(?:\s*\.\s*[A-Za-z_$][\w$]*)*)\s*\{")
        .unwrap()
});

static REQUIRES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\brequires\s+((?:(?:transitive|static)\s+)*)([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*;")
        .unwrap()
});

static VERSION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-(\d+(\.|$))").unwrap());

/// Error reading a module descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("no module declaration found")]
    MissingDeclaration,

    #[error("malformed class file: {0}")]
    MalformedClass(String),

    #[error("class file has no `Module` attribute")]
    NotAModule,

    #[error("failed to read archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("cannot describe {0}: unsupported file type")]
    Unsupported(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A `requires` edge of a module descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Requires {
    pub name: String,
    /// `requires static`: needed at compile time only
    pub is_static: bool,
    /// `requires transitive`
    pub is_transitive: bool,
}

impl Requires {
    pub fn new(name: impl Into<String>) -> Self {
        Requires {
            name: name.into(),
            is_static: false,
            is_transitive: false,
        }
    }
}

/// The name, version and requirements of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: Option<String>,
    pub requires: Vec<Requires>,
    pub main_class: Option<String>,
    /// True for archives without an explicit `module-info.class`
    pub automatic: bool,
}

impl ModuleDescriptor {
    /// Create an explicit descriptor without requirements.
    pub fn new(name: impl Into<String>) -> Self {
        ModuleDescriptor {
            name: name.into(),
            version: None,
            requires: Vec::new(),
            main_class: None,
            automatic: false,
        }
    }

    /// Add a plain `requires` edge.
    pub fn with_requires(mut self, name: impl Into<String>) -> Self {
        self.requires.push(Requires::new(name));
        self
    }

    /// Set the module version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the entry point.
    pub fn with_main_class(mut self, main_class: impl Into<String>) -> Self {
        self.main_class = Some(main_class.into());
        self
    }

    /// Names of required modules, optionally including `requires static` edges.
    pub fn required_names(&self, include_static: bool) -> Vec<&str> {
        self.requires
            .iter()
            .filter(|r| include_static || !r.is_static)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Parse a `module-info.java` compilation unit.
    pub fn parse_source(text: &str) -> Result<Self, DescriptorError> {
        let text = COMMENTS.replace_all(text, " ");
        let header = MODULE_HEADER
            .captures(&text)
            .ok_or(DescriptorError::MissingDeclaration)?;
        let name: String = header[1].chars().filter(|c| !c.is_whitespace()).collect();

        let mut descriptor = ModuleDescriptor::new(name);
        for caps in REQUIRES.captures_iter(&text) {
            let modifiers = &caps[1];
            descriptor.requires.push(Requires {
                name: caps[2].to_string(),
                is_static: modifiers.split_whitespace().any(|m| m == "static"),
                is_transitive: modifiers.split_whitespace().any(|m| m == "transitive"),
            });
        }
        Ok(descriptor)
    }

    /// Decode a compiled `module-info.class`.
    pub fn parse_class(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let mut reader = ClassReader::new(bytes);
        if reader.u4()? != CLASS_MAGIC {
            return Err(DescriptorError::MalformedClass("bad magic number".into()));
        }
        reader.skip(4)?; // minor, major
        let pool = ConstantPool::read(&mut reader)?;

        reader.skip(6)?; // access flags, this class, super class
        let interfaces = reader.u2()? as usize;
        reader.skip(interfaces * 2)?;
        for _ in 0..2 {
            // fields, then methods
            let members = reader.u2()?;
            for _ in 0..members {
                reader.skip(6)?;
                skip_attributes(&mut reader)?;
            }
        }

        let mut descriptor = None;
        let mut main_class = None;
        let attributes = reader.u2()?;
        for _ in 0..attributes {
            let name = pool.utf8(reader.u2()?)?;
            let length = reader.u4()? as usize;
            let body = reader.bytes(length)?;
            match name {
                "Module" => descriptor = Some(read_module_attribute(&pool, body)?),
                "ModuleMainClass" => {
                    let index = ClassReader::new(body).u2()?;
                    main_class = Some(pool.class_name(index)?.replace('/', "."));
                }
                _ => {}
            }
        }

        let mut descriptor = descriptor.ok_or(DescriptorError::NotAModule)?;
        descriptor.main_class = main_class;
        Ok(descriptor)
    }
}

/// Check whether a module is provided by the platform itself.
pub fn is_system_module(name: &str) -> bool {
    name.starts_with("java.") || name.starts_with("jdk.")
}

/// Derive the name of an automatic module from its archive file name.
pub fn automatic_module_name(file_name: &str) -> String {
    let stem = file_name.strip_suffix(".jar").unwrap_or(file_name);
    let stem = match VERSION_SUFFIX.find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    };
    let dotted: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '.' })
        .collect();
    dotted
        .split('.')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Describe a modular archive.
///
/// A root `module-info.class` wins; otherwise the lowest versioned descriptor
/// below `META-INF/versions/` is used. Archives without any descriptor are
/// automatic modules.
pub fn describe_archive(path: &Path) -> Result<ModuleDescriptor, DescriptorError> {
    let archive_error = |e: zip::result::ZipError| DescriptorError::Archive {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(archive_error)?;

    let mut versioned: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let rest = name.strip_prefix("META-INF/versions/")?;
            let (release, tail) = rest.split_once('/')?;
            (tail == MODULE_INFO_CLASS)
                .then(|| release.parse().ok().map(|r| (r, name.to_string())))
                .flatten()
        })
        .collect();
    versioned.sort();

    let entry_name = if archive.index_for_name(MODULE_INFO_CLASS).is_some() {
        Some(MODULE_INFO_CLASS.to_string())
    } else {
        versioned.into_iter().next().map(|(_, name)| name)
    };

    if let Some(entry_name) = entry_name {
        let mut bytes = Vec::new();
        archive
            .by_name(&entry_name)
            .map_err(archive_error)?
            .read_to_end(&mut bytes)?;
        return ModuleDescriptor::parse_class(&bytes);
    }

    let manifest = match archive.by_name("META-INF/MANIFEST.MF") {
        Ok(mut entry) => {
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            text
        }
        Err(_) => String::new(),
    };

    let file_name = crate::util::fs::file_name(path);
    let name = manifest_attribute(&manifest, "Automatic-Module-Name")
        .unwrap_or_else(|| automatic_module_name(&file_name));
    let version = file_name
        .strip_suffix(".jar")
        .and_then(|stem| VERSION_SUFFIX.find(stem).map(|m| stem[m.start() + 1..].to_string()));

    Ok(ModuleDescriptor {
        name,
        version,
        requires: Vec::new(),
        main_class: manifest_attribute(&manifest, "Main-Class"),
        automatic: true,
    })
}

/// Read a main attribute from a JAR manifest, honoring continuation lines.
pub fn manifest_attribute(manifest: &str, key: &str) -> Option<String> {
    let mut current: Option<String> = None;
    let mut lines = Vec::new();
    for line in manifest.lines() {
        if let Some(continued) = line.strip_prefix(' ') {
            if let Some(ref mut value) = current {
                value.push_str(continued);
            }
            continue;
        }
        if let Some(done) = current.take() {
            lines.push(done);
        }
        if line.is_empty() {
            break; // end of main section
        }
        current = Some(line.to_string());
    }
    lines.extend(current);

    lines.iter().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim().to_string())
    })
}

/// Reads module descriptors from files.
pub trait DescriptorReader: Send + Sync {
    /// Describe the module stored at the given path.
    fn describe(&self, path: &Path) -> Result<ModuleDescriptor, DescriptorError>;
}

/// Default descriptor reader dispatching on the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveDescriptorReader;

impl DescriptorReader for ArchiveDescriptorReader {
    fn describe(&self, path: &Path) -> Result<ModuleDescriptor, DescriptorError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jar") | Some("zip") => describe_archive(path),
            Some("class") => ModuleDescriptor::parse_class(&std::fs::read(path)?),
            Some("java") => ModuleDescriptor::parse_source(&std::fs::read_to_string(path)?),
            _ => Err(DescriptorError::Unsupported(path.to_path_buf())),
        }
    }
}

fn read_module_attribute(
    pool: &ConstantPool,
    body: &[u8],
) -> Result<ModuleDescriptor, DescriptorError> {
    let mut reader = ClassReader::new(body);
    let name = pool.module_name(reader.u2()?)?;
    reader.skip(2)?; // module flags
    let version_index = reader.u2()?;

    let mut descriptor = ModuleDescriptor::new(name);
    if version_index != 0 {
        descriptor.version = Some(pool.utf8(version_index)?.to_string());
    }

    let count = reader.u2()?;
    for _ in 0..count {
        let name = pool.module_name(reader.u2()?)?;
        let flags = reader.u2()?;
        reader.skip(2)?; // requires version
        descriptor.requires.push(Requires {
            name: name.to_string(),
            is_static: flags & ACC_STATIC_PHASE != 0,
            is_transitive: flags & ACC_TRANSITIVE != 0,
        });
    }
    Ok(descriptor)
}

fn skip_attributes(reader: &mut ClassReader<'_>) -> Result<(), DescriptorError> {
    let count = reader.u2()?;
    for _ in 0..count {
        reader.skip(2)?;
        let length = reader.u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

/// Big-endian cursor over class file bytes.
struct ClassReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ClassReader { bytes, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], DescriptorError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                DescriptorError::MalformedClass(format!("truncated at offset {}", self.pos))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), DescriptorError> {
        self.bytes(n).map(|_| ())
    }

    fn u1(&mut self) -> Result<u8, DescriptorError> {
        Ok(self.bytes(1)?[0])
    }

    fn u2(&mut self) -> Result<u16, DescriptorError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Result<u32, DescriptorError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

enum Constant {
    Utf8(String),
    Class(u16),
    Module(u16),
    Other,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn read(reader: &mut ClassReader<'_>) -> Result<Self, DescriptorError> {
        let count = reader.u2()? as usize;
        // index 0 is unused
        let mut entries = vec![Constant::Other];
        while entries.len() < count {
            let tag = reader.u1()?;
            let constant = match tag {
                1 => {
                    let length = reader.u2()? as usize;
                    Constant::Utf8(String::from_utf8_lossy(reader.bytes(length)?).into_owned())
                }
                3 | 4 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    // long and double take two slots
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    Constant::Other
                }
                7 => Constant::Class(reader.u2()?),
                8 | 16 | 20 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                9..=12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                19 => Constant::Module(reader.u2()?),
                other => {
                    return Err(DescriptorError::MalformedClass(format!(
                        "unknown constant pool tag {}",
                        other
                    )))
                }
            };
            entries.push(constant);
        }
        Ok(ConstantPool { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, DescriptorError> {
        self.entries.get(index as usize).ok_or_else(|| {
            DescriptorError::MalformedClass(format!("constant pool index {} out of range", index))
        })
    }

    fn utf8(&self, index: u16) -> Result<&str, DescriptorError> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(DescriptorError::MalformedClass(format!(
                "constant {} is not UTF-8",
                index
            ))),
        }
    }

    fn module_name(&self, index: u16) -> Result<&str, DescriptorError> {
        match self.get(index)? {
            Constant::Module(name) => self.utf8(*name),
            _ => Err(DescriptorError::MalformedClass(format!(
                "constant {} is not a module",
                index
            ))),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, DescriptorError> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(DescriptorError::MalformedClass(format!(
                "constant {} is not a class",
                index
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{module_info_class, write_jar};
    use tempfile::TempDir;

    #[test]
    fn test_parse_source() {
        let source = r#"
/** Greetings module. */
@Deprecated
open module com.greetings {
  requires transitive org.astro;
  requires static com.acme.annotations; // compile-time only
  // requires commented.out;
  /* requires also.commented.out; */
  requires java.logging;
  exports com.greetings;
}
"#;
        let descriptor = ModuleDescriptor::parse_source(source).unwrap();
        assert_eq!(descriptor.name, "com.greetings");
        assert!(!descriptor.automatic);
        assert_eq!(
            descriptor.required_names(true),
            vec!["org.astro", "com.acme.annotations", "java.logging"]
        );
        assert_eq!(
            descriptor.required_names(false),
            vec!["org.astro", "java.logging"]
        );
        assert!(descriptor.requires[0].is_transitive);
        assert!(descriptor.requires[1].is_static);
    }

    #[test]
    fn test_parse_source_without_declaration() {
        let err = ModuleDescriptor::parse_source("class Foo {}").unwrap_err();
        assert!(matches!(err, DescriptorError::MissingDeclaration));
    }

    #[test]
    fn test_parse_class() {
        let expected = ModuleDescriptor::new("org.astro")
            .with_version("1.2")
            .with_requires("java.base")
            .with_main_class("org.astro.Main");
        let mut expected = expected;
        expected.requires.push(Requires {
            name: "com.acme.annotations".into(),
            is_static: true,
            is_transitive: false,
        });

        let bytes = module_info_class(&expected);
        let actual = ModuleDescriptor::parse_class(&bytes).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_parse_class_rejects_garbage() {
        assert!(matches!(
            ModuleDescriptor::parse_class(b"not a class").unwrap_err(),
            DescriptorError::MalformedClass(_)
        ));

        let bytes = module_info_class(&ModuleDescriptor::new("foo"));
        assert!(matches!(
            ModuleDescriptor::parse_class(&bytes[..bytes.len() - 3]).unwrap_err(),
            DescriptorError::MalformedClass(_)
        ));
    }

    #[test]
    fn test_automatic_module_name() {
        assert_eq!(automatic_module_name("foo-bar-1.2.3.jar"), "foo.bar");
        assert_eq!(automatic_module_name("commons_io.jar"), "commons.io");
        assert_eq!(automatic_module_name("..weird--name...jar"), "weird.name");
        assert_eq!(automatic_module_name("asm-9.jar"), "asm");
    }

    #[test]
    fn test_manifest_attribute_with_continuation() {
        let manifest = "Manifest-Version: 1.0\r\nAutomatic-Module-Name: org.exam\r\n ple.lib\r\n\r\nName: x\r\nMain-Class: ignored\r\n";
        assert_eq!(
            manifest_attribute(manifest, "Automatic-Module-Name").as_deref(),
            Some("org.example.lib")
        );
        assert_eq!(manifest_attribute(manifest, "Main-Class"), None);
    }

    #[test]
    fn test_describe_explicit_archive() {
        let tmp = TempDir::new().unwrap();
        let jar = tmp.path().join("org.astro.jar");
        let descriptor = ModuleDescriptor::new("org.astro").with_requires("org.lib");
        write_jar(&jar, &[(MODULE_INFO_CLASS, module_info_class(&descriptor))]);

        let described = ArchiveDescriptorReader.describe(&jar).unwrap();
        assert_eq!(described.name, "org.astro");
        assert_eq!(described.required_names(false), vec!["org.lib"]);
        assert!(!described.automatic);
    }

    #[test]
    fn test_describe_versioned_only_archive() {
        let tmp = TempDir::new().unwrap();
        let jar = tmp.path().join("mr.jar");
        write_jar(
            &jar,
            &[
                (
                    "META-INF/versions/11/module-info.class",
                    module_info_class(&ModuleDescriptor::new("mr.eleven")),
                ),
                (
                    "META-INF/versions/9/module-info.class",
                    module_info_class(&ModuleDescriptor::new("mr.nine")),
                ),
            ],
        );

        assert_eq!(describe_archive(&jar).unwrap().name, "mr.nine");
    }

    #[test]
    fn test_describe_automatic_archive() {
        let tmp = TempDir::new().unwrap();
        let plain = tmp.path().join("commons-lang-3.12.jar");
        write_jar(&plain, &[("org/apache/Foo.class", b"".to_vec())]);

        let described = describe_archive(&plain).unwrap();
        assert!(described.automatic);
        assert_eq!(described.name, "commons.lang");
        assert_eq!(described.version.as_deref(), Some("3.12"));

        let named = tmp.path().join("named.jar");
        write_jar(
            &named,
            &[(
                "META-INF/MANIFEST.MF",
                b"Manifest-Version: 1.0\r\nAutomatic-Module-Name: org.named\r\n".to_vec(),
            )],
        );
        assert_eq!(describe_archive(&named).unwrap().name, "org.named");
    }

    #[test]
    fn test_is_system_module() {
        assert!(is_system_module("java.base"));
        assert!(is_system_module("jdk.jfr"));
        assert!(!is_system_module("javax.inject"));
        assert!(!is_system_module("org.junit.jupiter"));
    }
}
