//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use snap::container::{ContainerControl, ContainerSummary};
use snap::error::{Result, SnapError};
use snap::source_control::SourceControl;

/// A single fake container whose filesystem lives in memory.
///
/// Archives crossing the boundary are real tar streams, so everything the
/// bridge builds or extracts goes through the `tar` crate.
pub struct MemoryContainer {
    pub summary: ContainerSummary,
    pub others: Vec<ContainerSummary>,
    pub files: RefCell<BTreeMap<PathBuf, Vec<u8>>>,
    pub running: RefCell<bool>,
    pub calls: RefCell<Vec<String>>,
}

impl MemoryContainer {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            summary: ContainerSummary {
                id: id.to_string(),
                names: vec![name.to_string()],
            },
            others: Vec::new(),
            files: RefCell::new(BTreeMap::new()),
            running: RefCell::new(true),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn put(&self, path: impl Into<PathBuf>, data: &[u8]) {
        self.files.borrow_mut().insert(path.into(), data.to_vec());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn check_id(&self, id: &str) -> Result<()> {
        if id == self.summary.id {
            Ok(())
        } else {
            Err(SnapError::container(format!("No such container: {}", id)))
        }
    }
}

impl ContainerControl for MemoryContainer {
    fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        self.calls.borrow_mut().push("list".into());
        let mut all = vec![self.summary.clone()];
        all.extend(self.others.iter().cloned());
        Ok(all)
    }

    fn stop(&self, id: &str, _grace: Duration) -> Result<()> {
        self.check_id(id)?;
        self.calls.borrow_mut().push("stop".into());
        *self.running.borrow_mut() = false;
        Ok(())
    }

    fn start(&self, id: &str) -> Result<()> {
        self.check_id(id)?;
        self.calls.borrow_mut().push("start".into());
        *self.running.borrow_mut() = true;
        Ok(())
    }

    fn copy_out(&self, id: &str, path: &Path) -> Result<Vec<u8>> {
        self.check_id(id)?;
        self.calls.borrow_mut().push(format!("copy_out {}", path.display()));
        let data = self
            .get(path)
            .ok_or_else(|| SnapError::container(format!("No such file: {}", path.display())))?;

        let name = path
            .file_name()
            .ok_or_else(|| SnapError::container("copy_out of a directory"))?;
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();

        let mut builder = tar::Builder::new(Vec::new());
        builder.append_data(&mut header, name, data.as_slice())?;
        Ok(builder.into_inner()?)
    }

    fn copy_in(&self, id: &str, path: &Path, archive: &[u8]) -> Result<()> {
        self.check_id(id)?;
        self.calls.borrow_mut().push(format!("copy_in {}", path.display()));

        let mut archive = tar::Archive::new(archive);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            self.put(path.join(name), &data);
        }
        Ok(())
    }
}

/// Source control answering a fixed branch, or failing when there is none.
#[derive(Default)]
pub struct FixedBranch(pub Option<String>);

impl SourceControl for FixedBranch {
    fn current_branch(&self, repo_path: &Path) -> Result<String> {
        self.0
            .clone()
            .ok_or_else(|| SnapError::command(format!("{:?} is not a repository", repo_path)))
    }
}
