//! snap library
//!
//! Packs, restores and cleans snapshots of the data stores a development
//! environment depends on. Artifacts get deterministic names derived from
//! the configuration, and move between the local filesystem and running
//! containers through the storage bridge.

pub mod archive;
pub mod cli;
pub mod command;
pub mod config;
pub mod connection_string;
pub mod container;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod runner;
pub mod runners;
pub mod source_control;
pub mod storage;

// Re-export main types for convenience
pub use config::{Configuration, Target, Task, TaskSpec};
pub use connection_string::ConnectionString;
pub use container::{ContainerControl, ContainerExec, ContainerSummary, DockerCli};
pub use error::{Result, SnapError};
pub use naming::{DerivationKey, NamingEngine};
pub use orchestrator::{Orchestrator, RunOutcome, TaskSet, Verb};
pub use runner::{RunContext, RunnerLoader, RunnerRegistry, TargetRunner};
pub use runners::{BuiltinRunners, ElasticsearchRunner, MssqlRunner};
pub use source_control::{GitCli, SourceControl};
pub use storage::{ArtifactStore, StorageBridge, StorageDomain};
