//! Deterministic artifact naming.
//!
//! A target's artifact name is built from an ordered list of parts. Parts
//! that name a [`DerivationKey`] are replaced by values derived from the
//! matching property (server and database of a connection string, the
//! checked-out branch of a repository, ...). Everything else is a literal.
//!
//! ```text
//! [config.name, target.name, target.type, ConnectionString, Host, ContainerId, GitRepositoryRoot]
//!   -> "orders-dev_mssql_db1-Orders_sql1_main"
//! ```

use std::path::Path;

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::warn;

use crate::config::{Configuration, Target};
use crate::connection_string::ConnectionString;
use crate::source_control::SourceControl;

/// Separator between name parts.
pub const PART_SEPARATOR: &str = "_";
/// Separator between the sub-parts derived from one key.
pub const SUB_PART_SEPARATOR: &str = "-";

/// Property names whose values are expanded into name sub-parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
pub enum DerivationKey {
    ConnectionString,
    Host,
    ContainerId,
    GitRepositoryRoot,
}

/// Builds stable artifact names for targets.
pub struct NamingEngine<'a> {
    source_control: &'a dyn SourceControl,
}

impl<'a> NamingEngine<'a> {
    pub fn new(source_control: &'a dyn SourceControl) -> Self {
        Self { source_control }
    }

    /// Generate the unique, path-safe name of a target's artifact.
    ///
    /// Never fails: a derivation key without a usable value is dropped.
    pub fn generate_unique_name(&self, config: &Configuration, target: &Target) -> String {
        let parts = match &target.name_parts {
            Some(parts) if !parts.is_empty() => parts.clone(),
            _ => default_name_parts(config, target),
        };

        let joined = parts
            .iter()
            .flatten()
            .filter_map(|part| self.evaluate_part(config, target, part))
            .collect::<Vec<_>>()
            .join(PART_SEPARATOR);

        sanitize(&joined)
    }

    fn evaluate_part(&self, config: &Configuration, target: &Target, part: &str) -> Option<String> {
        let Ok(key) = part.parse::<DerivationKey>() else {
            return (!part.trim().is_empty()).then(|| part.to_string());
        };

        let value = config.property(target, key.as_ref())?;
        let sub_parts = self.derive(config, key, value);
        if sub_parts.is_empty() {
            None
        } else {
            Some(sub_parts.join(SUB_PART_SEPARATOR))
        }
    }

    /// Expand one derivation key value into its name sub-parts.
    pub fn derive(&self, config: &Configuration, key: DerivationKey, value: &str) -> Vec<String> {
        if value.trim().is_empty() {
            return Vec::new();
        }

        match key {
            DerivationKey::ConnectionString => match ConnectionString::parse(value) {
                Ok(cs) => [cs.data_source(), cs.initial_catalog()]
                    .into_iter()
                    .flatten()
                    .map(str::to_string)
                    .collect(),
                Err(e) => {
                    warn!("Ignoring unparsable connection string in name: {}", e);
                    Vec::new()
                }
            },
            DerivationKey::Host | DerivationKey::ContainerId => vec![value.trim().to_string()],
            DerivationKey::GitRepositoryRoot => {
                let repo = config.configuration_directory.join(Path::new(value.trim()));
                match self.source_control.current_branch(&repo) {
                    Ok(branch) if !branch.is_empty() => vec![branch],
                    Ok(_) => Vec::new(),
                    Err(e) => {
                        warn!("Could not read branch of {:?}: {}", repo, e);
                        Vec::new()
                    }
                }
            }
        }
    }
}

/// Default part list used when a target has no `nameParts`.
pub fn default_name_parts(config: &Configuration, target: &Target) -> Vec<Option<String>> {
    let mut parts = vec![
        config.name.clone(),
        target.name.clone(),
        Some(target.target_type.clone()),
    ];
    parts.extend(DerivationKey::iter().map(|k| Some(k.to_string())));
    parts
}

/// Replace path-unsafe characters with `_`.
pub fn sanitize(name: &str) -> String {
    name.replace(['/', '\\', '.'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SnapError};
    use std::cell::RefCell;
    use std::path::PathBuf;

    #[derive(Default)]
    struct FakeGit {
        branch: Option<String>,
        asked: RefCell<Vec<PathBuf>>,
    }

    impl SourceControl for FakeGit {
        fn current_branch(&self, repo_path: &Path) -> Result<String> {
            self.asked.borrow_mut().push(repo_path.to_path_buf());
            self.branch
                .clone()
                .ok_or_else(|| SnapError::command("not a git repository"))
        }
    }

    fn mssql_target() -> Target {
        let mut target = Target::new("mssql");
        target.properties.insert(
            "ConnectionString".into(),
            "Server=db1;Database=Orders".into(),
        );
        target
    }

    #[test]
    fn test_connection_string_parts() {
        let git = FakeGit::default();
        let engine = NamingEngine::new(&git);
        let config = Configuration::default();

        assert_eq!(
            engine.generate_unique_name(&config, &mssql_target()),
            "mssql_db1-Orders"
        );
        assert_eq!(
            engine.derive(&config, DerivationKey::ConnectionString, "Server=db1;Database=Orders"),
            vec!["db1", "Orders"]
        );
    }

    #[test]
    fn test_full_default_template() {
        let git = FakeGit {
            branch: Some("feature/x".into()),
            ..FakeGit::default()
        };
        let engine = NamingEngine::new(&git);
        let mut config = Configuration {
            name: Some("dev".into()),
            configuration_directory: PathBuf::from("/work"),
            ..Configuration::default()
        };
        config.properties.insert("GitRepositoryRoot".into(), "repo".into());
        let mut target = mssql_target();
        target.name = Some("orders".into());
        target.properties.insert("ContainerId".into(), "sql1".into());

        assert_eq!(
            engine.generate_unique_name(&config, &target),
            "dev_orders_mssql_db1-Orders_sql1_feature_x"
        );
        assert_eq!(git.asked.borrow().as_slice(), &[PathBuf::from("/work/repo")]);
    }

    #[test]
    fn test_missing_keys_are_dropped() {
        let git = FakeGit::default();
        let engine = NamingEngine::new(&git);
        let config = Configuration::default();
        let target = Target::new("elasticsearch");

        assert_eq!(engine.generate_unique_name(&config, &target), "elasticsearch");
        assert!(git.asked.borrow().is_empty());
    }

    #[test]
    fn test_blank_values_and_failed_branch_are_dropped() {
        let git = FakeGit::default();
        let engine = NamingEngine::new(&git);
        let mut config = Configuration::default();
        config.properties.insert("GitRepositoryRoot".into(), "/repo".into());
        let mut target = Target::new("elasticsearch");
        target.properties.insert("Host".into(), "   ".into());

        assert_eq!(engine.generate_unique_name(&config, &target), "elasticsearch");
    }

    #[test]
    fn test_name_parts_override_and_sanitize() {
        let git = FakeGit::default();
        let engine = NamingEngine::new(&git);
        let config = Configuration::default();
        let mut target = Target::new("elasticsearch");
        target.properties.insert("Host".into(), "http://es.local:9200".into());
        target.name_parts = Some(vec![Some("nightly".into()), None, Some("Host".into())]);

        assert_eq!(
            engine.generate_unique_name(&config, &target),
            "nightly_http:__es_local:9200"
        );
    }

    #[test]
    fn test_target_property_wins_over_global() {
        let git = FakeGit::default();
        let engine = NamingEngine::new(&git);
        let mut config = Configuration::default();
        config.properties.insert("Host".into(), "global".into());
        let mut target = Target::new("es");
        target.properties.insert("Host".into(), "local".into());
        target.name_parts = Some(vec![Some("Host".into())]);

        assert_eq!(engine.generate_unique_name(&config, &target), "local");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b\\c.d"), "a_b_c_d");
    }
}
