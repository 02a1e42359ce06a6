//! Built-in target runners.

pub mod elasticsearch;
pub mod mssql;

use tracing::debug;

use crate::config::Configuration;
use crate::error::Result;
use crate::runner::{RunnerLoader, RunnerRegistry, normalize_type};

pub use elasticsearch::{ELASTICSEARCH_TYPE, ElasticsearchRunner, ReqwestTransport};
pub use mssql::{MSSQL_TYPE, MssqlRunner, SqlCmd};

/// Registers the runners compiled into snap, but only for types the
/// configuration actually uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRunners;

impl BuiltinRunners {
    fn uses(config: &Configuration, runner_type: &str) -> bool {
        config
            .targets
            .iter()
            .any(|t| normalize_type(&t.target_type) == runner_type)
    }
}

impl RunnerLoader for BuiltinRunners {
    fn load(&self, config: &Configuration, registry: &mut RunnerRegistry) -> Result<()> {
        if Self::uses(config, MSSQL_TYPE) {
            registry.register_runner(Box::new(MssqlRunner::default()));
        }
        if Self::uses(config, ELASTICSEARCH_TYPE) {
            let transport = ReqwestTransport::new()?;
            registry.register_runner(Box::new(ElasticsearchRunner::new(Box::new(transport))));
        }
        debug!("Built-in runners loaded: {:?}", registry.types());
        Ok(())
    }
}
