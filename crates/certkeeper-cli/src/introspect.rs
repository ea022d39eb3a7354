//! Container runtime introspection
//!
//! Resolves the host directory backing a container's certificate mount by
//! asking the runtime for the container's mount table.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Mount {
    #[serde(rename = "Destination")]
    destination: String,
    #[serde(rename = "Source")]
    source: String,
}

/// Host path backing `destination` inside the named container.
pub fn container_mount_source(
    runtime: &str,
    container: &str,
    destination: &str,
) -> Result<PathBuf> {
    let output = Command::new(runtime)
        .args(["inspect", "-f", "{{json .Mounts}}", container])
        .output()
        .with_context(|| format!("failed to run {}", runtime))?;

    if !output.status.success() {
        anyhow::bail!(
            "container {:?} was not found; is the container console installed and running?",
            container
        );
    }

    let json = String::from_utf8_lossy(&output.stdout);
    let source = mount_source_from_json(&json, destination)?;
    debug!(container, destination, source = %source.display(), "resolved certificate mount");
    Ok(source)
}

fn mount_source_from_json(json: &str, destination: &str) -> Result<PathBuf> {
    let mounts: Vec<Mount> =
        serde_json::from_str(json.trim()).context("could not parse container mount table")?;

    mounts
        .into_iter()
        .find(|m| m.destination == destination)
        .map(|m| PathBuf::from(m.source))
        .ok_or_else(|| anyhow!("container has no mount at {}", destination))
}
