//! Graph command - print the planned tasks without running them

use crate::project::Project;
use anyhow::{Context, Result};
use mule_build::{index_sources, index_tests, GraphBuilder, Profile};
use std::str::FromStr;

/// Run the graph command
pub fn run(project: &Project, locked: bool, tests: bool, json: bool) -> Result<()> {
    let profile = Profile::from_str(project.config.profile())?;
    let resolved = project.resolve(locked)?;
    let sources = index_sources(&resolved).context("Failed to scan sources")?;
    let mut builder = GraphBuilder::new().with_profile(profile.default_config());
    if tests {
        builder = builder.with_tests(index_tests(&resolved).context("Failed to scan tests")?);
    }
    let graph = builder.build(&resolved, &sources)?;

    if json {
        let tasks: Vec<serde_json::Value> = graph
            .tasks()
            .iter()
            .map(|task| {
                serde_json::json!({
                    "id": task.id.index(),
                    "key": task.key,
                    "package": task.package,
                    "kind": task.kind.tag(),
                    "test": task.is_test(),
                    "fingerprint": task.fingerprint.to_hex(),
                    "predecessors": task.predecessors.iter().map(|id| id.index()).collect::<Vec<_>>(),
                    "flags": task.flags,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    for task in graph.tasks() {
        let after: Vec<&str> = task
            .predecessors
            .iter()
            .map(|id| graph[*id].key.as_str())
            .collect();
        if after.is_empty() {
            println!("{} {} [{}]", task.id, task.key, task.fingerprint.short());
        } else {
            println!(
                "{} {} [{}] <- {}",
                task.id,
                task.key,
                task.fingerprint.short(),
                after.join(", ")
            );
        }
    }
    println!("{} task(s)", graph.len());
    Ok(())
}
