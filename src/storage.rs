//! Storage bridge: moving artifacts between the host and containers.
//!
//! An artifact lives either in the [`StorageDomain::Local`] filesystem or in
//! the writable layer of a container ([`StorageDomain::Container`]). Moving
//! across domains follows a fixed choreography so the container never has a
//! file written or read while its process is running:
//!
//! ```text
//! pull (Container -> Local)          push (Local -> Container)
//!   resolve container                  resolve container
//!   stop (grace period)                tar source -> <from>.tar
//!   copy path out as tar               stop (grace period)
//!   write <to>.tar                     copy tar into parent of <to>
//!   start                              start
//!   extract matching entry -> <to>     remove <from>.tar
//!   remove <to>.tar
//! ```
//!
//! There is no rollback. A failed extraction leaves `<to>.tar` behind.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use strum::Display;
use tracing::{debug, info, warn};

use crate::archive::{self, ArchiveEntry};
use crate::container::{ContainerControl, DEFAULT_STOP_GRACE, resolve_container};
use crate::error::{Result, SnapError};

/// Extension of staging archives written next to the source or destination.
pub const STAGING_EXTENSION: &str = ".tar";

/// Where an artifact lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StorageDomain {
    Local,
    Container,
}

/// The operator's per-user artifact directory (one flat namespace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Pick the store root from environment-style lookups:
    /// `SNAP_HOME`, then `$XDG_DATA_HOME/snap`, then `$HOME/.local/share/snap`.
    pub fn resolve_root<F>(lookup: F) -> Result<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(home) = non_blank("SNAP_HOME") {
            return Ok(PathBuf::from(home));
        }
        if let Some(data) = non_blank("XDG_DATA_HOME") {
            return Ok(PathBuf::from(data).join("snap"));
        }
        if let Some(home) = non_blank("HOME") {
            return Ok(PathBuf::from(home).join(".local").join("share").join("snap"));
        }
        Err(SnapError::config(
            "Cannot locate the artifact store: set SNAP_HOME or HOME",
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the store directory if needed.
    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Path of an artifact file inside the store.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

/// `path` with `.tar` appended to its full file name.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(STAGING_EXTENSION);
    PathBuf::from(raw)
}

/// Move a local file, overwriting the destination.
///
/// Returns `Ok(false)` when there is nothing to move.
pub fn move_local(from: &Path, to: &Path) -> Result<bool> {
    if !from.is_file() {
        debug!("Nothing to move at {:?}", from);
        return Ok(false);
    }
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(from, to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
        }
        Err(e) => return Err(e.into()),
    }
    debug!("Moved {:?} -> {:?}", from, to);
    Ok(true)
}

/// Delete a local file. Returns `Ok(false)` if it did not exist.
pub fn remove_local(path: &Path) -> Result<bool> {
    if path.is_file() {
        fs::remove_file(path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SnapError::config(format!("{:?} has no file name", path)))
}

/// Directory holding `path` inside a container; bare names live in `/`.
fn container_parent_of(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("/"),
    }
}

/// Directory holding `path` on the host; bare names are relative to the working directory.
fn local_parent_of(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Moves artifacts between storage domains.
pub struct StorageBridge<'a> {
    containers: &'a dyn ContainerControl,
    stop_grace: Duration,
}

impl<'a> StorageBridge<'a> {
    pub fn new(containers: &'a dyn ContainerControl) -> Self {
        Self {
            containers,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Move `from` in `from_domain` to `to` in `to_domain`.
    ///
    /// `container_id` is an id fragment or a name suffix that must match
    /// exactly one running container; it is ignored for Local -> Local.
    /// `extract_archive` only affects pulls: when false the staging tar is
    /// kept at `<to>.tar` and nothing is extracted.
    ///
    /// Returns `Ok(false)` only for a Local -> Local move with no source.
    pub fn move_virtual(
        &self,
        from: &Path,
        from_domain: StorageDomain,
        to: &Path,
        to_domain: StorageDomain,
        container_id: &str,
        extract_archive: bool,
    ) -> Result<bool> {
        match (from_domain, to_domain) {
            (StorageDomain::Local, StorageDomain::Local) => move_local(from, to),
            (StorageDomain::Container, StorageDomain::Container) => Err(
                SnapError::not_implemented("Moving files between containers is not supported"),
            ),
            (StorageDomain::Container, StorageDomain::Local) => {
                self.pull(from, to, container_id, extract_archive)?;
                Ok(true)
            }
            (StorageDomain::Local, StorageDomain::Container) => {
                self.push(from, to, container_id)?;
                Ok(true)
            }
        }
    }

    fn resolve(&self, container_id: &str) -> Result<String> {
        let containers = self.containers.list_containers()?;
        let container = resolve_container(&containers, container_id)?;
        debug!(
            "Resolved container '{}' to {} {:?}",
            container_id, container.id, container.names
        );
        Ok(container.id.clone())
    }

    /// Run `work` while the container is stopped, always attempting a restart.
    fn while_stopped<T>(&self, id: &str, work: impl FnOnce() -> Result<T>) -> Result<T> {
        self.containers.stop(id, self.stop_grace)?;
        let outcome = work();
        let restarted = self.containers.start(id);
        match (outcome, restarted) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), restarted) => {
                if let Err(start_err) = restarted {
                    warn!("Container {} did not restart: {}", id, start_err);
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
        }
    }

    fn pull(&self, from: &Path, to: &Path, container_id: &str, extract: bool) -> Result<()> {
        info!("Pulling {:?} from container '{}' to {:?}", from, container_id, to);
        let id = self.resolve(container_id)?;
        let staging = staging_path(to);
        let dest_dir = local_parent_of(to);

        self.while_stopped(&id, || {
            let archive = self.containers.copy_out(&id, from)?;
            remove_local(to)?;
            fs::create_dir_all(dest_dir)?;
            fs::write(&staging, archive)?;
            debug!("Wrote staging archive {:?}", staging);
            Ok(())
        })?;

        if extract {
            let wanted = file_name_of(to)?;
            let entries = archive::list_entries(fs::File::open(&staging)?)?;
            // docker names the entry after the source file.
            let name = if entries.iter().any(|e| e.eq_ignore_ascii_case(&wanted)) {
                wanted.clone()
            } else {
                file_name_of(from)?
            };

            let extracted = archive::extract_entry(&staging, &name, dest_dir)?;
            if name != wanted {
                move_local(&extracted, to)?;
            }
            fs::remove_file(&staging)?;
        }
        Ok(())
    }

    fn push(&self, from: &Path, to: &Path, container_id: &str) -> Result<()> {
        info!("Pushing {:?} to {:?} in container '{}'", from, to, container_id);
        let id = self.resolve(container_id)?;
        let staging = staging_path(from);

        let entries = [ArchiveEntry::new(file_name_of(to)?, from)];
        if let Err(e) = archive::create_tar_file(&entries, &staging) {
            remove_local(&staging)?;
            return Err(e);
        }
        let archive = fs::read(&staging)?;

        self.while_stopped(&id, || {
            self.containers.copy_in(&id, container_parent_of(to), &archive)
        })?;

        fs::remove_file(&staging)?;
        Ok(())
    }
}
