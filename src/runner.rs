//! Target runners and the registry that dispatches to them.
//!
//! A [`TargetRunner`] implements pack, restore and clean for one kind of
//! backend. Runners are registered under their type key once at startup
//! (directly or through a [`RunnerLoader`]) and looked up per target.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::{Configuration, Target, Task, keys};
use crate::error::{Result, SnapError};
use crate::naming::NamingEngine;
use crate::storage::{ArtifactStore, StorageBridge, StorageDomain};

/// Everything a runner needs besides the target itself.
pub struct RunContext<'a> {
    pub config: &'a Configuration,
    pub store: &'a ArtifactStore,
    pub bridge: &'a StorageBridge<'a>,
    pub naming: &'a NamingEngine<'a>,
}

impl RunContext<'_> {
    /// Unique artifact file name of a target, e.g. `mssql_db1-Orders.bkp`.
    pub fn artifact_file_name(&self, target: &Target, extension: &str) -> String {
        format!(
            "{}{}",
            self.naming.generate_unique_name(self.config, target),
            extension
        )
    }

    pub fn property<'t>(&'t self, target: &'t Target, key: &str) -> Option<&'t str> {
        self.config.property(target, key)
    }

    pub fn required_property<'t>(&'t self, target: &'t Target, key: &str) -> Result<&'t str> {
        self.config.required_property(target, key)
    }

    /// Move a freshly captured artifact from the backend's native location
    /// into the artifact store.
    pub fn collect_artifact(&self, target: &Target, native_path: &Path, file_name: &str) -> Result<()> {
        let stored = self.store.path_for(file_name);
        self.store.ensure_exists()?;

        if target.is_running_in_docker {
            let container = self.required_property(target, keys::CONTAINER_ID)?;
            self.bridge.move_virtual(
                native_path,
                StorageDomain::Container,
                &stored,
                StorageDomain::Local,
                container,
                true,
            )?;
        } else if !self.bridge.move_virtual(
            native_path,
            StorageDomain::Local,
            &stored,
            StorageDomain::Local,
            "",
            true,
        )? {
            return Err(SnapError::backend(
                target.label(),
                file_name,
                format!("backend produced no file at {:?}", native_path),
            ));
        }
        debug!("Artifact {} stored at {:?}", file_name, stored);
        Ok(())
    }

    /// Place a stored artifact at the backend's native location.
    pub fn stage_artifact(&self, target: &Target, file_name: &str, native_path: &Path) -> Result<()> {
        let stored = self.store.path_for(file_name);
        if !stored.is_file() {
            return Err(SnapError::backend(
                target.label(),
                file_name,
                format!("no artifact at {:?}", stored),
            ));
        }

        if target.is_running_in_docker {
            let container = self.required_property(target, keys::CONTAINER_ID)?;
            self.bridge.move_virtual(
                &stored,
                StorageDomain::Local,
                native_path,
                StorageDomain::Container,
                container,
                true,
            )?;
        } else {
            // Copy, not move: the store keeps its artifact.
            if let Some(parent) = native_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&stored, native_path)?;
        }
        Ok(())
    }
}

/// Pack, restore and clean for one backend kind.
///
/// Operations a backend does not support keep the default implementation,
/// which fails with [`SnapError::NotImplemented`].
pub trait TargetRunner {
    /// Registry key, e.g. "mssql".
    fn runner_type(&self) -> &str;

    /// Capture the target into its artifact.
    fn pack(&self, _ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        Err(self.unsupported(Task::Pack, target))
    }

    /// Restore the target from its artifact.
    fn restore(&self, _ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        Err(self.unsupported(Task::Unpack, target))
    }

    /// Wipe the target so it can be restored.
    fn clean(&self, _ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        Err(self.unsupported(Task::Clean, target))
    }

    /// Dispatch a task to the matching operation.
    fn run(&self, task: Task, ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        match task {
            Task::Pack => self.pack(ctx, target),
            Task::Unpack => self.restore(ctx, target),
            Task::Clean => self.clean(ctx, target),
        }
    }

    #[doc(hidden)]
    fn unsupported(&self, task: Task, target: &Target) -> SnapError {
        SnapError::not_implemented(format!(
            "'{}' runner does not support {} (target {})",
            self.runner_type(),
            task,
            target.label()
        ))
    }
}

/// Normalized registry key of a target type.
pub fn normalize_type(target_type: &str) -> String {
    target_type.trim().to_lowercase()
}

/// Target type -> runner. One runner per type; the last registration wins.
#[derive(Default)]
pub struct RunnerRegistry {
    runners: BTreeMap<String, Box<dyn TargetRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `runner` under `target_type`, returning the runner it replaced.
    pub fn register(
        &mut self,
        target_type: &str,
        runner: Box<dyn TargetRunner>,
    ) -> Option<Box<dyn TargetRunner>> {
        let key = normalize_type(target_type);
        debug!("Registering runner for '{}'", key);
        self.runners.insert(key, runner)
    }

    /// Register a runner under its own type key.
    pub fn register_runner(&mut self, runner: Box<dyn TargetRunner>) -> Option<Box<dyn TargetRunner>> {
        let key = runner.runner_type().to_string();
        self.register(&key, runner)
    }

    pub fn resolve(&self, target_type: &str) -> Option<&dyn TargetRunner> {
        self.runners
            .get(&normalize_type(target_type))
            .map(|r| &**r)
    }

    /// Like [`RunnerRegistry::resolve`], but absence is an error naming the target.
    pub fn resolve_for(&self, target: &Target) -> Result<&dyn TargetRunner> {
        self.resolve(&target.target_type)
            .ok_or_else(|| SnapError::UnknownRunner {
                target_type: target.target_type.clone(),
                target: target.label(),
            })
    }

    pub fn contains(&self, target_type: &str) -> bool {
        self.runners.contains_key(&normalize_type(target_type))
    }

    /// Registered type keys, sorted.
    pub fn types(&self) -> Vec<&str> {
        self.runners.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}

/// Source of runners for a configuration (built-ins, plugins, ...).
pub trait RunnerLoader {
    /// Register every runner the configuration needs that this loader provides.
    fn load(&self, config: &Configuration, registry: &mut RunnerRegistry) -> Result<()>;
}
