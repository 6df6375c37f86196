//! Lock command - resolve from scratch and rewrite mule.lock

use crate::project::Project;
use anyhow::Result;
use mule_package::BuildOrderComputer;

/// Run the lock command
pub fn run(project: &Project) -> Result<()> {
    let resolved = project.resolve_fresh()?;
    project.write_lockfile(&resolved)?;

    // Dependencies first, the way they will be built
    let order = BuildOrderComputer::new(&resolved).compute_build_order()?;
    for name in order.iter().filter(|name| name.as_str() != resolved.root()) {
        if let Some(version) = resolved.version(name) {
            println!("    {} {}", name, version);
        }
    }
    println!(
        "Locked {} dependencies in {}",
        resolved.len().saturating_sub(1),
        project.lockfile_path().display()
    );
    Ok(())
}
