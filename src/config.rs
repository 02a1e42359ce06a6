//! Snapshot configuration loading and property lookup.
//!
//! The configuration is a JSON document (`snap.json`) with a global name, a
//! global property map and an ordered list of targets. It is loaded once and
//! never mutated during a run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::error::{Result, SnapError};

/// File name looked up when the configuration location is a directory.
pub const DEFAULT_CONFIG_FILE: &str = "snap.json";

/// Well-known property keys read by the runners and the naming engine.
pub mod keys {
    pub const CONNECTION_STRING: &str = "ConnectionString";
    pub const HOST: &str = "Host";
    pub const CONTAINER_ID: &str = "ContainerId";
    pub const GIT_REPOSITORY_ROOT: &str = "GitRepositoryRoot";
}

/// One of the three per-target tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Task {
    Pack,
    Unpack,
    Clean,
}

/// Enables or disables a task for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default)]
    pub enable: bool,
}

/// One configured backend instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Optional name, used as a literal name segment
    #[serde(default)]
    pub name: Option<String>,

    /// Runner dispatch key, e.g. "mssql"
    #[serde(rename = "type")]
    pub target_type: String,

    /// Whether the backend lives inside a container
    #[serde(default)]
    pub is_running_in_docker: bool,

    /// Target specific properties, probed before the global ones
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub pack: Option<TaskSpec>,

    #[serde(default, alias = "restore")]
    pub unpack: Option<TaskSpec>,

    #[serde(default)]
    pub clean: Option<TaskSpec>,

    /// Overrides the default unique name template
    #[serde(default)]
    pub name_parts: Option<Vec<Option<String>>>,
}

impl Target {
    /// Create a bare target of the given type.
    pub fn new(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            ..Self::default()
        }
    }

    /// Whether the task is configured and enabled for this target.
    pub fn is_enabled(&self, task: Task) -> bool {
        let spec = match task {
            Task::Pack => &self.pack,
            Task::Unpack => &self.unpack,
            Task::Clean => &self.clean,
        };
        spec.as_ref().is_some_and(|s| s.enable)
    }

    /// Human readable label used in logs and errors.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => format!("{} ({})", name, self.target_type),
            _ => self.target_type.clone(),
        }
    }
}

/// Root configuration object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Disambiguates configurations sharing infrastructure
    #[serde(default)]
    pub name: Option<String>,

    /// Global defaults
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub targets: Vec<Target>,

    /// Directory the configuration was read from
    #[serde(skip)]
    pub configuration_directory: PathBuf,

    /// File name the configuration was read from, usually `snap.json`
    #[serde(skip)]
    pub configuration_file: String,
}

impl Configuration {
    /// Resolve the configuration location.
    ///
    /// `None` means `snap.json` in `cwd`. An existing file is used as is; a
    /// directory must contain `snap.json`. Relative paths are resolved
    /// against `cwd`.
    pub fn resolve_location(location: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
        let requested = match location {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => cwd.join(path),
            None => cwd.join(DEFAULT_CONFIG_FILE),
        };

        if requested.is_file() {
            return Ok(requested);
        }

        let nested = requested.join(DEFAULT_CONFIG_FILE);
        if requested.is_dir() && nested.is_file() {
            return Ok(nested);
        }

        Err(SnapError::ConfigNotFound(requested))
    }

    /// Resolve, read, parse and validate the configuration.
    pub fn load(location: Option<&Path>, cwd: &Path) -> Result<Self> {
        let path = Self::resolve_location(location, cwd)?;
        Self::load_from_file(&path)
    }

    /// Read, parse and validate a configuration file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {:?}", path);

        let content = fs::read_to_string(path)?;
        let mut config: Self =
            serde_json::from_str(&content).map_err(|e| SnapError::InvalidConfig {
                path: path.to_path_buf(),
                errors: vec![e.to_string()],
            })?;

        let errors = config.validate();
        if !errors.is_empty() {
            return Err(SnapError::InvalidConfig {
                path: path.to_path_buf(),
                errors,
            });
        }

        config.configuration_directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.configuration_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        Ok(config)
    }

    /// Collect every structural problem in the document.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.properties.keys().any(|k| k.trim().is_empty()) {
            errors.push("properties: property names must not be blank".to_string());
        }

        for (index, target) in self.targets.iter().enumerate() {
            if target.target_type.trim().is_empty() {
                errors.push(format!("targets[{}].type: must not be blank", index));
            }
            if target.properties.keys().any(|k| k.trim().is_empty()) {
                errors.push(format!(
                    "targets[{}].properties: property names must not be blank",
                    index
                ));
            }
            if let Some(parts) = &target.name_parts {
                for (part_index, part) in parts.iter().enumerate() {
                    if part.as_deref().is_some_and(|p| p.trim().is_empty()) {
                        errors.push(format!(
                            "targets[{}].nameParts[{}]: must not be blank",
                            index, part_index
                        ));
                    }
                }
            }
        }

        errors
    }

    /// Look a property up on the target first, then in the global map.
    pub fn property<'a>(&'a self, target: &'a Target, key: &str) -> Option<&'a str> {
        target
            .properties
            .get(key)
            .or_else(|| self.properties.get(key))
            .map(String::as_str)
    }

    /// Like [`Configuration::property`], but absence is a configuration error.
    pub fn required_property<'a>(&'a self, target: &'a Target, key: &str) -> Result<&'a str> {
        self.property(target, key)
            .ok_or_else(|| SnapError::missing_property(key, &target.target_type))
    }

    /// Targets with the task enabled, in declaration order.
    pub fn enabled_targets(&self, task: Task) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(move |t| t.is_enabled(task))
    }
}
