//! Implementation of `sonata clean`.

use std::path::PathBuf;

use anyhow::Result;

use crate::core::project::Folders;
use crate::util::context::GlobalContext;
use crate::util::fs::remove_dir_all_if_exists;

/// Options for the clean command.
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Also remove fetched external modules
    pub all: bool,
}

/// Remove build output. Returns the directories that existed and were removed.
pub fn clean(ctx: &GlobalContext, options: &CleanOptions) -> Result<Vec<PathBuf>> {
    let folders = Folders::new(ctx.root());
    let mut targets = vec![folders.workspace().to_path_buf()];
    if options.all {
        targets.push(folders.external_modules().to_path_buf());
    }

    let mut removed = Vec::new();
    for target in targets {
        if target.exists() {
            remove_dir_all_if_exists(&target)?;
            removed.push(target);
        }
    }
    Ok(removed)
}
