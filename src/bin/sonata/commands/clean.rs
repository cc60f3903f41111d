//! `sonata clean` action

use anyhow::Result;

use sonata::ops::{clean, CleanOptions};
use sonata::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, all: bool) -> Result<()> {
    let removed = clean(ctx, &CleanOptions { all })?;
    if removed.is_empty() {
        eprintln!("     Nothing to clean");
    }
    for path in removed {
        eprintln!("     Removed {}", path.display());
    }
    Ok(())
}
