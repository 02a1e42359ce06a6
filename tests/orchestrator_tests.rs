//! Task orchestration tests
//!
//! These verify:
//! - Verb validation happens before any target runs
//! - Pass order (clean, unpack, pack) and declaration order of targets
//! - Unknown target types abort the run before anything executes
//! - The first failing target stops the run

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{FixedBranch, MemoryContainer};
use snap::config::{Configuration, Target, Task, TaskSpec};
use snap::error::{Result, SnapError};
use snap::naming::NamingEngine;
use snap::orchestrator::{Orchestrator, RunOutcome, TaskSet, Verb};
use snap::runner::{RunContext, RunnerRegistry, TargetRunner};
use snap::storage::{ArtifactStore, StorageBridge};
use tempfile::TempDir;

type Log = Rc<RefCell<Vec<String>>>;

/// Records every call; fails for targets named `fail_on`.
struct Recording {
    kind: &'static str,
    log: Log,
    fail_on: Option<&'static str>,
}

impl Recording {
    fn record(&self, task: &str, target: &Target) -> Result<()> {
        let name = target.name.clone().unwrap_or_default();
        self.log.borrow_mut().push(format!("{} {}", task, name));
        if self.fail_on == Some(name.as_str()) {
            return Err(SnapError::backend(target.label(), "x", "boom"));
        }
        Ok(())
    }
}

impl TargetRunner for Recording {
    fn runner_type(&self) -> &str {
        self.kind
    }
    fn pack(&self, _ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        self.record("pack", target)
    }
    fn restore(&self, _ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        self.record("unpack", target)
    }
    fn clean(&self, _ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        self.record("clean", target)
    }
}

/// Only implements pack.
struct PackOnly;

impl TargetRunner for PackOnly {
    fn runner_type(&self) -> &str {
        "packonly"
    }
    fn pack(&self, _ctx: &RunContext<'_>, _target: &Target) -> Result<()> {
        Ok(())
    }
}

fn target(kind: &str, name: &str, tasks: &[Task]) -> Target {
    let mut target = Target::new(kind);
    target.name = Some(name.to_string());
    let on = Some(TaskSpec { enable: true });
    for task in tasks {
        match task {
            Task::Pack => target.pack = on.clone(),
            Task::Unpack => target.unpack = on.clone(),
            Task::Clean => target.clean = on.clone(),
        }
    }
    target
}

struct Fixture {
    store_dir: TempDir,
    container: MemoryContainer,
    git: FixedBranch,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store_dir: TempDir::new().unwrap(),
            container: MemoryContainer::new("abc", "sql"),
            git: FixedBranch::default(),
        }
    }

    fn run(&self, config: &Configuration, registry: &RunnerRegistry, verbs: &[Verb]) -> Result<RunOutcome> {
        let store = ArtifactStore::new(self.store_dir.path());
        let bridge = StorageBridge::new(&self.container);
        let naming = NamingEngine::new(&self.git);
        let context = RunContext {
            config,
            store: &store,
            bridge: &bridge,
            naming: &naming,
        };
        Orchestrator::new(context, registry).run(TaskSet::from_verbs(verbs)?)
    }
}

fn registry_with(log: &Log, fail_on: Option<&'static str>) -> RunnerRegistry {
    let mut registry = RunnerRegistry::new();
    registry.register_runner(Box::new(Recording {
        kind: "fake",
        log: log.clone(),
        fail_on,
    }));
    registry
}

#[test]
fn test_clean_then_unpack_in_declaration_order() {
    let log = Log::default();
    let registry = registry_with(&log, None);
    let config = Configuration {
        targets: vec![
            target("fake", "a", &[Task::Unpack, Task::Clean]),
            target("fake", "b", &[Task::Clean]),
            target("fake", "c", &[Task::Unpack, Task::Pack]),
        ],
        ..Configuration::default()
    };

    let outcome = Fixture::new()
        .run(&config, &registry, &[Verb::Unpack, Verb::Clean])
        .unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["clean a", "clean b", "unpack a", "unpack c"]
    );
    match outcome {
        RunOutcome::Completed(done) => assert_eq!(done.len(), 4),
        RunOutcome::Help => panic!("expected a completed run"),
    }
}

#[test]
fn test_pack_with_clean_runs_nothing() {
    let log = Log::default();
    let registry = registry_with(&log, None);
    let config = Configuration {
        targets: vec![target("fake", "a", &[Task::Pack, Task::Clean])],
        ..Configuration::default()
    };

    let err = Fixture::new()
        .run(&config, &registry, &[Verb::Pack, Verb::Clean])
        .unwrap_err();
    assert!(matches!(err, SnapError::Usage(_)));
    assert!(log.borrow().is_empty());
}

#[test]
fn test_help_runs_nothing() {
    let log = Log::default();
    let registry = registry_with(&log, None);
    let config = Configuration {
        targets: vec![target("fake", "a", &[Task::Pack])],
        ..Configuration::default()
    };

    let outcome = Fixture::new()
        .run(&config, &registry, &[Verb::Pack, Verb::Help])
        .unwrap();
    assert_eq!(outcome, RunOutcome::Help);
    assert!(log.borrow().is_empty());
}

#[test]
fn test_unknown_type_fails_before_any_target() {
    let log = Log::default();
    let registry = registry_with(&log, None);
    let config = Configuration {
        targets: vec![
            target("fake", "a", &[Task::Clean]),
            target("redis", "cache", &[Task::Unpack]),
        ],
        ..Configuration::default()
    };

    let err = Fixture::new()
        .run(&config, &registry, &[Verb::Clean, Verb::Unpack])
        .unwrap_err();
    match err {
        SnapError::UnknownRunner { target_type, target } => {
            assert_eq!(target_type, "redis");
            assert_eq!(target, "cache (redis)");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(log.borrow().is_empty());
}

#[test]
fn test_unknown_type_of_disabled_task_is_ignored() {
    let log = Log::default();
    let registry = registry_with(&log, None);
    let config = Configuration {
        targets: vec![
            target("fake", "a", &[Task::Pack]),
            target("redis", "cache", &[Task::Clean]),
        ],
        ..Configuration::default()
    };

    Fixture::new().run(&config, &registry, &[Verb::Pack]).unwrap();
    assert_eq!(*log.borrow(), vec!["pack a"]);
}

#[test]
fn test_first_failure_stops_the_run() {
    let log = Log::default();
    let registry = registry_with(&log, Some("b"));
    let config = Configuration {
        targets: vec![
            target("fake", "a", &[Task::Clean, Task::Unpack]),
            target("fake", "b", &[Task::Clean, Task::Unpack]),
            target("fake", "c", &[Task::Clean, Task::Unpack]),
        ],
        ..Configuration::default()
    };

    let err = Fixture::new()
        .run(&config, &registry, &[Verb::Clean, Verb::Unpack])
        .unwrap_err();
    assert!(matches!(err, SnapError::Backend { .. }));
    assert_eq!(*log.borrow(), vec!["clean a", "clean b"]);
}

#[test]
fn test_unsupported_operation_is_not_implemented() {
    let mut registry = RunnerRegistry::new();
    registry.register_runner(Box::new(PackOnly));
    let config = Configuration {
        targets: vec![target("PackOnly", "a", &[Task::Pack, Task::Clean])],
        ..Configuration::default()
    };
    let fixture = Fixture::new();

    fixture.run(&config, &registry, &[Verb::Pack]).unwrap();
    let err = fixture.run(&config, &registry, &[Verb::Clean]).unwrap_err();
    assert!(matches!(err, SnapError::NotImplemented(_)));
}

#[test]
fn test_type_lookup_ignores_case() {
    let log = Log::default();
    let registry = registry_with(&log, None);
    let config = Configuration {
        targets: vec![target(" FAKE ", "a", &[Task::Pack])],
        ..Configuration::default()
    };

    Fixture::new().run(&config, &registry, &[Verb::Pack]).unwrap();
    assert_eq!(*log.borrow(), vec!["pack a"]);
}
