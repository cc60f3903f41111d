//! Built-in `jar` tool writing modular, optionally multi-release, archives.
//!
//! Supported options:
//!
//! ```text
//! --create | -c                  create an archive
//! --list | -t                    list the entries of an archive
//! --describe-module | -d         print the module descriptor of an archive
//! --file | -f <path>             archive file
//! --main-class | -e <class>      entry point recorded in the manifest
//! --module-version <version>     version recorded in the manifest
//! --no-manifest | -M             do not write a manifest
//! --release <n>                  following inputs go to META-INF/versions/<n>/
//! -C <dir> <names>...            following names are relative to <dir>
//! ```

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::builder::provider::{ToolContext, ToolProvider};
use crate::core::descriptor::describe_archive;
use crate::util::fs::{relative_files, relative_path, to_entry_name};

const MANIFEST: &str = "META-INF/MANIFEST.MF";

/// The built-in archiver.
#[derive(Debug, Default, Clone, Copy)]
pub struct JarTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Create,
    List,
    Describe,
}

#[derive(Debug, Default)]
struct JarOptions {
    mode: Option<Mode>,
    file: Option<PathBuf>,
    main_class: Option<String>,
    module_version: Option<String>,
    no_manifest: bool,
    inputs: Vec<Input>,
}

#[derive(Debug)]
struct Input {
    release: Option<u32>,
    base: PathBuf,
    name: String,
}

impl ToolProvider for JarTool {
    fn name(&self) -> &str {
        "jar"
    }

    fn run(
        &self,
        ctx: &ToolContext,
        out: &mut dyn Write,
        err: &mut dyn Write,
        args: &[String],
    ) -> Result<i32> {
        let result = parse_options(ctx, args).and_then(|options| {
            let file = options
                .file
                .clone()
                .ok_or_else(|| anyhow!("missing --file option"))?;
            match options.mode {
                Some(Mode::Create) => create(&file, &options),
                Some(Mode::List) => list(&file, out),
                Some(Mode::Describe) => describe(&file, out),
                None => bail!("one of --create, --list or --describe-module is required"),
            }
        });
        match result {
            Ok(()) => Ok(0),
            Err(e) => {
                writeln!(err, "jar: {:#}", e)?;
                Ok(1)
            }
        }
    }
}

/// Split `--option=value` into two arguments.
fn normalize(args: &[String]) -> Vec<String> {
    args.iter()
        .flat_map(|arg| match arg.split_once('=') {
            Some((option, value)) if arg.starts_with("--") => {
                vec![option.to_string(), value.to_string()]
            }
            _ => vec![arg.clone()],
        })
        .collect()
}

fn parse_options(ctx: &ToolContext, args: &[String]) -> Result<JarOptions> {
    let args = normalize(args);
    let mut options = JarOptions::default();
    let mut release = None;
    let mut base = ctx.directory.clone();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        let mut value = |option: &str| {
            iter.next()
                .ok_or_else(|| anyhow!("option {} requires a value", option))
        };
        match arg.as_str() {
            "--create" | "-c" => options.mode = Some(Mode::Create),
            "--list" | "-t" => options.mode = Some(Mode::List),
            "--describe-module" | "-d" => options.mode = Some(Mode::Describe),
            "--no-manifest" | "-M" => options.no_manifest = true,
            "--file" | "-f" => options.file = Some(ctx.resolve(value(&arg)?)),
            "--main-class" | "-e" => options.main_class = Some(value(&arg)?),
            "--module-version" => options.module_version = Some(value(&arg)?),
            "--release" => {
                let n = value(&arg)?;
                release = Some(n.parse().with_context(|| format!("invalid release: {}", n))?);
                base = ctx.directory.clone();
            }
            "-C" => base = ctx.resolve(value(&arg)?),
            option if option.starts_with('-') => bail!("unknown option: {}", option),
            name => options.inputs.push(Input {
                release,
                base: base.clone(),
                name: name.to_string(),
            }),
        }
    }
    Ok(options)
}

/// Expand inputs into `(entry name, source file)` pairs.
fn collect_entries(inputs: &[Input]) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    let mut seen = BTreeSet::new();
    for input in inputs {
        let prefix = input
            .release
            .map(|n| format!("META-INF/versions/{}/", n))
            .unwrap_or_default();
        let path = if input.name == "." {
            input.base.clone()
        } else {
            input.base.join(&input.name)
        };

        let names = if path.is_dir() {
            let below = to_entry_name(&relative_path(&input.base, &path));
            relative_files(&path)?
                .into_iter()
                .map(|name| {
                    if below.is_empty() {
                        name
                    } else {
                        format!("{}/{}", below, name)
                    }
                })
                .collect()
        } else if path.is_file() {
            vec![to_entry_name(&relative_path(&input.base, &path))]
        } else {
            bail!("{}: no such file or directory", path.display());
        };

        for name in names {
            let entry = format!("{}{}", prefix, name);
            if !seen.insert(entry.clone()) {
                bail!("duplicate entry: {}", entry);
            }
            entries.push((entry, input.base.join(&name)));
        }
    }
    Ok(entries)
}

fn manifest(options: &JarOptions) -> String {
    let mut text = String::from("Manifest-Version: 1.0\r\n");
    text.push_str(&format!(
        "Created-By: sonata {}\r\n",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(main_class) = &options.main_class {
        text.push_str(&format!("Main-Class: {}\r\n", main_class));
    }
    if let Some(version) = &options.module_version {
        text.push_str(&format!("Implementation-Version: {}\r\n", version));
    }
    if options.inputs.iter().any(|input| input.release.is_some()) {
        text.push_str("Multi-Release: true\r\n");
    }
    text.push_str("\r\n");
    text
}

fn create(file: &Path, options: &JarOptions) -> Result<()> {
    let entries = collect_entries(&options.inputs)?;
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let target =
        File::create(file).with_context(|| format!("failed to create {}", file.display()))?;
    let mut zip = ZipWriter::new(target);
    let file_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut directories = BTreeSet::new();

    let mut add_parents = |zip: &mut ZipWriter<File>, entry: &str| -> Result<()> {
        let mut end = 0;
        while let Some(slash) = entry[end..].find('/') {
            end += slash + 1;
            let directory = &entry[..end];
            if directories.insert(directory.to_string()) {
                zip.add_directory(directory, file_options)?;
            }
        }
        Ok(())
    };

    if !options.no_manifest {
        add_parents(&mut zip, MANIFEST)?;
        zip.start_file(MANIFEST, file_options)?;
        zip.write_all(manifest(options).as_bytes())?;
    }

    for (entry, source) in &entries {
        add_parents(&mut zip, entry)?;
        zip.start_file(entry.as_str(), file_options)?;
        let mut reader = BufReader::new(
            File::open(source).with_context(|| format!("failed to read {}", source.display()))?,
        );
        io::copy(&mut reader, &mut zip)?;
    }

    zip.finish()
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(())
}

fn list(file: &Path, out: &mut dyn Write) -> Result<()> {
    let mut archive = ZipArchive::new(BufReader::new(
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?,
    ))?;
    for i in 0..archive.len() {
        writeln!(out, "{}", archive.by_index(i)?.name())?;
    }
    Ok(())
}

fn describe(file: &Path, out: &mut dyn Write) -> Result<()> {
    let descriptor = describe_archive(file)?;
    match &descriptor.version {
        Some(version) => write!(out, "{}@{}", descriptor.name, version)?,
        None => write!(out, "{}", descriptor.name)?,
    }
    if descriptor.automatic {
        write!(out, " automatic")?;
    }
    writeln!(out)?;
    for requires in &descriptor.requires {
        let mut line = String::from("requires");
        if requires.is_transitive {
            line.push_str(" transitive");
        }
        if requires.is_static {
            line.push_str(" static");
        }
        writeln!(out, "{} {}", line, requires.name)?;
    }
    if let Some(main_class) = &descriptor.main_class {
        writeln!(out, "main-class {}", main_class)?;
    }
    Ok(())
}
