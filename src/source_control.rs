//! Source-control queries used to derive artifact names.

use std::path::Path;
use std::process::Command;

use crate::command::run_command;
use crate::error::Result;

/// Answers which branch a repository currently has checked out.
pub trait SourceControl {
    fn current_branch(&self, repo_path: &Path) -> Result<String>;
}

/// `git` command line client.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl SourceControl for GitCli {
    fn current_branch(&self, repo_path: &Path) -> Result<String> {
        let output = run_command(
            Command::new("git")
                .arg("-C")
                .arg(repo_path)
                .args(["rev-parse", "--abbrev-ref", "HEAD"]),
            None,
        )?
        .ensure_success("git rev-parse")?;

        let branch = output.stdout_text();
        if branch != "HEAD" {
            return Ok(branch);
        }

        // Detached head: fall back to the abbreviated commit.
        let output = run_command(
            Command::new("git")
                .arg("-C")
                .arg(repo_path)
                .args(["rev-parse", "--short", "HEAD"]),
            None,
        )?
        .ensure_success("git rev-parse --short")?;
        Ok(output.stdout_text())
    }
}
