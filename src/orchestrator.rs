//! Task orchestration.
//!
//! The operator's verbs are folded into a [`TaskSet`] once at startup. Each
//! requested task then runs as one pass over the configured targets:
//!
//! ```text
//! help?  -> print usage, done
//! clean  -> every target with clean.enable, in declaration order
//! unpack -> every target with unpack.enable
//! pack   -> every target with pack.enable
//! ```
//!
//! Passes and targets run strictly one after another. The first error aborts
//! the run; work already done by earlier targets is kept.

use std::fmt;

use clap::ValueEnum;
use tracing::info;

use crate::config::{Configuration, Task};
use crate::error::{Result, SnapError};
use crate::runner::{RunContext, RunnerRegistry};

/// Verbs accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Verb {
    /// Pack a snapshot of the environment
    #[value(alias = "p")]
    Pack,
    /// Unpack/restore the snapshot into the environment
    #[value(alias = "u", alias = "restore")]
    Unpack,
    /// Clean the environment so it is ready for an unpack (deletes data!)
    #[value(alias = "c")]
    Clean,
    /// Print usage
    Help,
}

/// Bitset of requested tasks.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskSet(u8);

impl TaskSet {
    pub const PACK: TaskSet = TaskSet(1);
    pub const UNPACK: TaskSet = TaskSet(1 << 1);
    pub const CLEAN: TaskSet = TaskSet(1 << 2);
    pub const HELP: TaskSet = TaskSet(1 << 3);

    /// Pass order: clean, then unpack, then pack.
    const ORDER: [(TaskSet, Task); 3] = [
        (TaskSet::CLEAN, Task::Clean),
        (TaskSet::UNPACK, Task::Unpack),
        (TaskSet::PACK, Task::Pack),
    ];

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, other: TaskSet) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TaskSet) {
        self.0 |= other.0;
    }

    pub fn is_help(self) -> bool {
        self.contains(Self::HELP)
    }

    /// Fold verbs into a set and check the combination.
    ///
    /// `help` wins over everything. Otherwise at least one of pack, unpack
    /// and clean is required, and pack combines with neither of the others.
    pub fn from_verbs(verbs: &[Verb]) -> Result<Self> {
        let mut set = Self::empty();
        for verb in verbs {
            set.insert(match verb {
                Verb::Pack => Self::PACK,
                Verb::Unpack => Self::UNPACK,
                Verb::Clean => Self::CLEAN,
                Verb::Help => Self::HELP,
            });
        }

        if set.is_help() {
            return Ok(Self::HELP);
        }
        if set == Self::empty() {
            return Err(SnapError::usage(
                "No command to run. Use one of: pack, unpack, clean (or help)",
            ));
        }
        if set.contains(Self::PACK) && (set.contains(Self::UNPACK) || set.contains(Self::CLEAN)) {
            return Err(SnapError::usage(
                "Cannot use the 'pack' command with 'clean' or 'unpack' commands.",
            ));
        }
        Ok(set)
    }

    /// Requested tasks in execution order.
    pub fn passes(self) -> Vec<Task> {
        Self::ORDER
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, task)| *task)
            .collect()
    }
}

impl fmt::Debug for TaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.passes().iter().map(Task::to_string).collect();
        if self.is_help() {
            names.push("help".to_string());
        }
        write!(f, "TaskSet({})", names.join("|"))
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Usage was requested; nothing ran.
    Help,
    /// Every pass finished. Lists (task, target label) in execution order.
    Completed(Vec<(Task, String)>),
}

/// Drives passes over the configured targets.
pub struct Orchestrator<'a> {
    context: RunContext<'a>,
    registry: &'a RunnerRegistry,
}

impl<'a> Orchestrator<'a> {
    pub fn new(context: RunContext<'a>, registry: &'a RunnerRegistry) -> Self {
        Self { context, registry }
    }

    fn config(&self) -> &Configuration {
        self.context.config
    }

    /// Every target touched by the requested passes must have a runner.
    pub fn validate(&self, tasks: TaskSet) -> Result<()> {
        for task in tasks.passes() {
            for target in self.config().enabled_targets(task) {
                self.registry.resolve_for(target)?;
            }
        }
        Ok(())
    }

    /// Run the requested passes. Nothing executes unless every runner resolves.
    pub fn run(&self, tasks: TaskSet) -> Result<RunOutcome> {
        if tasks.is_help() {
            return Ok(RunOutcome::Help);
        }

        self.validate(tasks)?;

        let mut executed = Vec::new();
        for task in tasks.passes() {
            executed.extend(
                self.run_pass(task)?
                    .into_iter()
                    .map(|label| (task, label)),
            );
        }
        Ok(RunOutcome::Completed(executed))
    }

    /// One pass: enabled targets in declaration order, stopping at the first error.
    pub fn run_pass(&self, task: Task) -> Result<Vec<String>> {
        info!("Running {} pass", task);
        let mut done = Vec::new();

        for target in self.config().enabled_targets(task) {
            let runner = self.registry.resolve_for(target)?;
            let label = target.label();
            info!("{}: {}", task, label);
            runner.run(task, &self.context, target)?;
            done.push(label);
        }

        info!("{} pass finished ({} targets)", task, done.len());
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_wins() {
        let set = TaskSet::from_verbs(&[Verb::Pack, Verb::Clean, Verb::Help]).unwrap();
        assert!(set.is_help());
        assert!(set.passes().is_empty());
    }

    #[test]
    fn test_no_verb_is_usage_error() {
        assert!(matches!(
            TaskSet::from_verbs(&[]),
            Err(SnapError::Usage(_))
        ));
    }

    #[test]
    fn test_pack_excludes_clean_and_unpack() {
        assert!(TaskSet::from_verbs(&[Verb::Pack, Verb::Clean]).is_err());
        assert!(TaskSet::from_verbs(&[Verb::Unpack, Verb::Pack]).is_err());
    }

    #[test]
    fn test_clean_runs_before_unpack() {
        let set = TaskSet::from_verbs(&[Verb::Unpack, Verb::Clean]).unwrap();
        assert_eq!(set.passes(), vec![Task::Clean, Task::Unpack]);
    }

    #[test]
    fn test_repeated_verbs_collapse() {
        let set = TaskSet::from_verbs(&[Verb::Pack, Verb::Pack]).unwrap();
        assert_eq!(set, TaskSet::PACK);
        assert_eq!(format!("{:?}", set), "TaskSet(pack)");
    }

    #[test]
    fn test_empty_set_contains_nothing() {
        assert!(!TaskSet::empty().contains(TaskSet::empty()));
        assert!(!TaskSet::PACK.contains(TaskSet::CLEAN));
    }
}
