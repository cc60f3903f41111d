//! Test fixtures: files, archives and compiled module descriptors.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::core::descriptor::ModuleDescriptor;

/// Write a file, creating parent directories.
pub fn write_file(path: &Path, content: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Write a zip archive with the given entries.
pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Write an explicit module archive for `descriptor`.
pub fn write_module_jar(path: &Path, descriptor: &ModuleDescriptor) {
    write_jar(path, &[("module-info.class", module_info_class(descriptor))]);
}

/// Entry names of an archive, in archive order.
pub fn jar_entries(path: &Path) -> Vec<String> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(path).unwrap())).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Encode a minimal `module-info.class` for `descriptor`.
pub fn module_info_class(descriptor: &ModuleDescriptor) -> Vec<u8> {
    let mut pool = ConstantPoolWriter::default();
    let this_class = pool.class("module-info");
    let module_attribute = pool.utf8("Module");
    let module_name = pool.module(&descriptor.name);
    let version = descriptor
        .version
        .as_deref()
        .map(|v| pool.utf8(v))
        .unwrap_or(0);
    let requires: Vec<(u16, u16)> = descriptor
        .requires
        .iter()
        .map(|r| {
            let mut flags = 0u16;
            if r.is_transitive {
                flags |= 0x0020;
            }
            if r.is_static {
                flags |= 0x0040;
            }
            (pool.module(&r.name), flags)
        })
        .collect();
    let main_class = descriptor.main_class.as_deref().map(|main| {
        (
            pool.utf8("ModuleMainClass"),
            pool.class(&main.replace('.', "/")),
        )
    });

    let mut body = Vec::new();
    put_u2(&mut body, module_name);
    put_u2(&mut body, 0); // flags
    put_u2(&mut body, version);
    put_u2(&mut body, requires.len() as u16);
    for (index, flags) in requires {
        put_u2(&mut body, index);
        put_u2(&mut body, flags);
        put_u2(&mut body, 0);
    }
    for _ in 0..4 {
        put_u2(&mut body, 0); // exports, opens, uses, provides
    }

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    put_u2(&mut out, 0);
    put_u2(&mut out, 53);
    put_u2(&mut out, pool.count + 1);
    out.extend_from_slice(&pool.bytes);
    put_u2(&mut out, 0x8000); // ACC_MODULE
    put_u2(&mut out, this_class);
    put_u2(&mut out, 0); // super class
    put_u2(&mut out, 0); // interfaces
    put_u2(&mut out, 0); // fields
    put_u2(&mut out, 0); // methods
    put_u2(&mut out, if main_class.is_some() { 2 } else { 1 });
    put_u2(&mut out, module_attribute);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    if let Some((name, class)) = main_class {
        put_u2(&mut out, name);
        out.extend_from_slice(&2u32.to_be_bytes());
        put_u2(&mut out, class);
    }
    out
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[derive(Default)]
struct ConstantPoolWriter {
    bytes: Vec<u8>,
    count: u16,
}

impl ConstantPoolWriter {
    fn push(&mut self, tag: u8, payload: &[u8]) -> u16 {
        self.bytes.push(tag);
        self.bytes.extend_from_slice(payload);
        self.count += 1;
        self.count
    }

    fn utf8(&mut self, text: &str) -> u16 {
        let mut payload = (text.len() as u16).to_be_bytes().to_vec();
        payload.extend_from_slice(text.as_bytes());
        self.push(1, &payload)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.push(7, &name.to_be_bytes())
    }

    fn module(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.push(19, &name.to_be_bytes())
    }
}
