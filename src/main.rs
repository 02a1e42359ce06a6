//! snap - Main entry point

use std::process::ExitCode;

use anyhow::Context;
use clap::CommandFactory;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snap::cli::Cli;
use snap::{
    ArtifactStore, BuiltinRunners, Configuration, DockerCli, GitCli, NamingEngine, Orchestrator,
    RunContext, RunOutcome, RunnerLoader, RunnerRegistry, SnapError, StorageBridge,
};

/// Initialize logging. `RUST_LOG` overrides the default level.
fn init_logging(verbose: bool) {
    let filter = if verbose { "snap=debug" } else { "snap=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn print_usage() {
    eprintln!("{}", Cli::command().render_help());
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let tasks = match cli.tasks() {
        Ok(tasks) => tasks,
        Err(e @ SnapError::Usage(_)) => {
            print_usage();
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    if tasks.is_help() {
        println!("{}", Cli::command().render_help());
        return Ok(());
    }
    debug!("Requested {:?}", tasks);

    let cwd = std::env::current_dir().context("Cannot determine the working directory")?;
    let config = Configuration::load(cli.config.as_deref(), &cwd)?;
    info!(
        "Loaded {} ({} targets)",
        config.configuration_directory.join(&config.configuration_file).display(),
        config.targets.len()
    );

    let store = ArtifactStore::new(ArtifactStore::resolve_root(|key| std::env::var(key).ok())?);
    debug!("Artifact store: {:?}", store.root());

    let docker = DockerCli::new();
    let git = GitCli;
    let naming = NamingEngine::new(&git);
    let bridge = StorageBridge::new(&docker);

    let mut registry = RunnerRegistry::new();
    BuiltinRunners
        .load(&config, &mut registry)
        .context("Failed to load target runners")?;

    let context = RunContext {
        config: &config,
        store: &store,
        bridge: &bridge,
        naming: &naming,
    };
    match Orchestrator::new(context, &registry).run(tasks)? {
        RunOutcome::Help => println!("{}", Cli::command().render_help()),
        RunOutcome::Completed(done) => info!("Finished: {} target operations", done.len()),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
