use clap::Parser;
use std::path::PathBuf;

use crate::error::Result;
use crate::orchestrator::{TaskSet, Verb};

/// snap - Pack, restore and clean development environment snapshots
#[derive(Parser, Debug)]
#[command(name = "snap")]
#[command(about = "Pack, unpack and clean snapshots of the data stores a project depends on")]
#[command(version)]
pub struct Cli {
    /// What to do. `clean` and `unpack` may be combined; `pack` stands alone.
    #[arg(value_enum)]
    pub verbs: Vec<Verb>,

    /// Configuration file, or a directory containing snap.json
    #[arg(
        short = 'f',
        long = "config",
        visible_alias = "configuration",
        env = "SNAP_CONFIGURATION",
        value_name = "PATH"
    )]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Requested tasks, checked for conflicting verbs.
    pub fn tasks(&self) -> Result<TaskSet> {
        TaskSet::from_verbs(&self.verbs)
    }
}
