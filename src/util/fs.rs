//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Name of a module declaration compilation unit.
pub const MODULE_INFO_JAVA: &str = "module-info.java";

/// Name of a compiled module declaration.
pub const MODULE_INFO_CLASS: &str = "module-info.class";

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Find all `module-info.java` files below `root`, up to `max_depth` levels deep.
///
/// The result is sorted to keep project scans deterministic.
pub fn find_module_declarations(root: &Path, max_depth: usize) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    for entry in WalkDir::new(root).max_depth(max_depth).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if entry.file_type().is_file() && entry.file_name() == MODULE_INFO_JAVA {
            results.push(entry.into_path());
        }
    }
    results.sort();
    Ok(results)
}

/// List the immediate subdirectories of `dir`, sorted by name.
pub fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// List files in `dir` (non-recursive) with the given extension, sorted by name.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Recursively collect the files below `dir` as `/`-separated relative names.
pub fn relative_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        names.push(to_entry_name(&relative_path(dir, entry.path())));
    }
    Ok(names)
}

/// Convert a relative path into a `/`-separated archive entry name.
pub fn to_entry_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// File name of a path as a string, or an empty string.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Join paths with the platform's path list separator.
pub fn join_paths(paths: &[PathBuf]) -> String {
    let separator = if cfg!(windows) { ";" } else { ":" };
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_module_declarations_respects_depth() {
        let tmp = TempDir::new().unwrap();
        let shallow = tmp.path().join("foo");
        let deep = tmp.path().join("a/b/c/d/bar");
        fs::create_dir_all(&shallow).unwrap();
        fs::create_dir_all(&deep).unwrap();
        fs::write(shallow.join(MODULE_INFO_JAVA), "module foo {}").unwrap();
        fs::write(deep.join(MODULE_INFO_JAVA), "module bar {}").unwrap();

        let all = find_module_declarations(tmp.path(), 9).unwrap();
        assert_eq!(all.len(), 2);

        let shallow_only = find_module_declarations(tmp.path(), 2).unwrap();
        assert_eq!(shallow_only, vec![shallow.join(MODULE_INFO_JAVA)]);
    }

    #[test]
    fn test_relative_files_uses_forward_slashes() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("foo/bar")).unwrap();
        fs::write(tmp.path().join("foo/bar/Baz.class"), "").unwrap();
        fs::write(tmp.path().join(MODULE_INFO_CLASS), "").unwrap();

        let names = relative_files(tmp.path()).unwrap();
        assert_eq!(names, vec!["foo/bar/Baz.class", MODULE_INFO_CLASS]);
    }

    #[test]
    fn test_list_files_with_extension() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.jar"), "").unwrap();
        fs::write(tmp.path().join("a.jar"), "").unwrap();
        fs::write(tmp.path().join("a.jar.validator"), "").unwrap();

        let jars = list_files_with_extension(tmp.path(), "jar").unwrap();
        let names: Vec<_> = jars.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.jar", "b.jar"]);

        let missing = list_files_with_extension(&tmp.path().join("missing"), "jar").unwrap();
        assert!(missing.is_empty());
    }
}
