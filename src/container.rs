//! Container control.
//!
//! snap needs very little from a container runtime: list running
//! containers, stop, start, and copy tar archives in and out. That surface is
//! the [`ContainerControl`] trait; [`DockerCli`] implements it on top of the
//! `docker` command line client. Running commands inside a container is a
//! separate, optional capability ([`ContainerExec`]).

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::command::{CommandOutput, run_command};
use crate::error::{Result, SnapError};

/// Grace period given to a container to stop before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// A running container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
}

impl ContainerSummary {
    /// Whether `fragment` identifies this container: a substring of its id,
    /// or a case-insensitive suffix of one of its names.
    pub fn matches(&self, fragment: &str) -> bool {
        let needle = fragment.to_lowercase();
        self.id.contains(fragment)
            || self
                .names
                .iter()
                .any(|n| n.to_lowercase().ends_with(&needle))
    }
}

/// Minimal container runtime surface used by the storage bridge.
pub trait ContainerControl {
    /// Running containers.
    fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// Stop a container, killing it once `grace` has elapsed.
    fn stop(&self, id: &str, grace: Duration) -> Result<()>;

    fn start(&self, id: &str) -> Result<()>;

    /// Retrieve `path` from the container as a tar archive.
    fn copy_out(&self, id: &str, path: &Path) -> Result<Vec<u8>>;

    /// Extract a tar archive into directory `path` inside the container,
    /// overwriting existing files.
    fn copy_in(&self, id: &str, path: &Path, archive: &[u8]) -> Result<()>;
}

/// Optional capability: run a command inside a container.
pub trait ContainerExec {
    fn exec(&self, id: &str, command: &[&str]) -> Result<CommandOutput>;
}

/// Find the single running container matching `fragment`.
///
/// Zero matches and several matches are both errors; an ambiguous reference
/// is never resolved by picking one.
pub fn resolve_container<'a>(
    containers: &'a [ContainerSummary],
    fragment: &str,
) -> Result<&'a ContainerSummary> {
    if fragment.trim().is_empty() {
        return Err(SnapError::config("Container reference must not be blank"));
    }

    let matches: Vec<&ContainerSummary> =
        containers.iter().filter(|c| c.matches(fragment)).collect();

    match matches.as_slice() {
        [] => Err(SnapError::ContainerNotFound(fragment.to_string())),
        [single] => Ok(single),
        many => Err(SnapError::AmbiguousContainer {
            fragment: fragment.to_string(),
            matches: many.iter().map(|c| c.id.clone()).collect(),
        }),
    }
}

/// `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Use another docker-compatible client, e.g. `podman`.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn docker(&self) -> Command {
        Command::new(&self.binary)
    }
}

/// Parse `docker ps --format '{{.ID}}\t{{.Names}}'` output.
fn parse_ps_output(output: &str) -> Vec<ContainerSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (id, names) = line.split_once('\t').unwrap_or((line, ""));
            ContainerSummary {
                id: id.trim().to_string(),
                names: names
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect(),
            }
        })
        .collect()
}

fn container_path(id: &str, path: &Path) -> String {
    format!("{}:{}", id, path.to_string_lossy())
}

impl ContainerControl for DockerCli {
    fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let output = run_command(
            self.docker()
                .args(["ps", "--no-trunc", "--format", "{{.ID}}\t{{.Names}}"]),
            None,
        )?
        .ensure_success("docker ps")
        .map_err(|e| SnapError::container(e.to_string()))?;

        Ok(parse_ps_output(&output.stdout_text()))
    }

    fn stop(&self, id: &str, grace: Duration) -> Result<()> {
        debug!("Stopping container {} (grace {:?})", id, grace);
        run_command(
            self.docker()
                .args(["stop", "--time", &grace.as_secs().to_string(), id]),
            None,
        )?
        .ensure_success("docker stop")
        .map_err(|e| SnapError::container(e.to_string()))?;
        Ok(())
    }

    fn start(&self, id: &str) -> Result<()> {
        debug!("Starting container {}", id);
        run_command(self.docker().args(["start", id]), None)?
            .ensure_success("docker start")
            .map_err(|e| SnapError::container(e.to_string()))?;
        Ok(())
    }

    fn copy_out(&self, id: &str, path: &Path) -> Result<Vec<u8>> {
        let output = run_command(
            self.docker()
                .args(["cp", &container_path(id, path), "-"]),
            None,
        )?
        .ensure_success("docker cp (out)")
        .map_err(|e| SnapError::container(e.to_string()))?;
        Ok(output.stdout)
    }

    fn copy_in(&self, id: &str, path: &Path, archive: &[u8]) -> Result<()> {
        run_command(
            self.docker().args(["cp", "-", &container_path(id, path)]),
            Some(archive),
        )?
        .ensure_success("docker cp (in)")
        .map_err(|e| SnapError::container(e.to_string()))?;
        Ok(())
    }
}

impl ContainerExec for DockerCli {
    fn exec(&self, id: &str, command: &[&str]) -> Result<CommandOutput> {
        run_command(self.docker().arg("exec").arg(id).args(command), None)
    }
}
