//! Clean command - remove build outputs and the artifact cache

use crate::project::Project;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Run the clean command
pub fn run(project: &Project) -> Result<()> {
    let target_dir = project.config.target_dir();
    let cache_dir = project.config.cache_dir();

    let mut removed = remove_dir(&target_dir)?;
    // The default cache lives inside the target directory
    if !cache_dir.starts_with(&target_dir) {
        removed |= remove_dir(&cache_dir)?;
    }

    if !removed {
        println!("Nothing to clean");
    }
    Ok(())
}

fn remove_dir(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
    println!("Removed {}", dir.display());
    Ok(true)
}
