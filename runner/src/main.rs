mod config;
mod install;
mod plan;
mod specs;
mod versions;

#[cfg(test)]
mod install_test;
#[cfg(test)]
mod versions_test;

use crate::{
    config::{ConfigErrors, RunnerConfig, SelectionOptions},
    install::{prepare_version_directory, InstallError, PackageManagers, Preparation},
    plan::{make_server_plans, PlanError},
    specs::{specs_from_opts, ExpandError},
};
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Expand(#[from] ExpandError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error("Failed to print plans: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Parser)]
#[command(version, about = "Plan and prepare benchmark servers")]
struct Cli {
    /// YAML runner config
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Repository containing the `benchmarks` directory
    #[arg(long)]
    repo_root: Option<PathBuf>,
    /// Where dependency installs are kept
    #[arg(long)]
    install_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the server plans as JSON
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Install every dependency set the plans need, then print the plans
    Install {
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

/// Selection flags, unset flags keep the value from the config file
#[derive(Args, Debug)]
struct SelectionArgs {
    /// Benchmark names, `*` for all
    #[arg(long)]
    name: Option<String>,
    /// Implementations, `*` for all
    #[arg(long)]
    implementation: Option<String>,
    /// Variants, `*` for all including benchmarks without variants
    #[arg(long)]
    variant: Option<String>,
    /// `<impl>/default` or `<impl>/<label>=<pkg>@<version>[,<pkg>@<version>]*`
    #[arg(short = 'p', long = "package-version")]
    package_versions: Vec<String>,
}

impl SelectionArgs {
    fn apply(self, selection: &mut SelectionOptions) {
        if let Some(name) = self.name {
            selection.name = name;
        }
        if let Some(implementation) = self.implementation {
            selection.implementation = implementation;
        }
        if let Some(variant) = self.variant {
            selection.variant = variant;
        }
        if !self.package_versions.is_empty() {
            selection.package_versions = self.package_versions;
        }
    }
}

async fn run(cli: Cli) -> Result<(), RunnerError> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path).await?,
        None => RunnerConfig::default(),
    };

    if let Some(repo_root) = cli.repo_root {
        config.repo_root = repo_root;
    }
    if let Some(install_root) = cli.install_root {
        config.install_root = Some(install_root);
    }

    let (selection, install) = match cli.command {
        Command::Plan { selection } => (selection, false),
        Command::Install { selection } => (selection, true),
    };
    selection.apply(&mut config.selection);

    if config.preflight_checks(install).await {
        return Err(ConfigErrors::PreflightFailed.into());
    }

    let package_manager = PackageManagers::load(&config.package_manager)?;

    let specs = specs_from_opts(&config.repo_root, &config.selection).await?;
    info!("Expanded selection into {} specs", specs.len());

    let plans = make_server_plans(&config.benchmark_root(), &config.install_root(), &specs).await?;
    info!("Grouped specs into {} server plans", plans.len());

    if install {
        let mut installed = 0;

        for npm_install in plans.iter().flat_map(|plan| plan.npm_installs.iter()) {
            if prepare_version_directory(npm_install, &package_manager).await?
                == Preparation::Installed
            {
                installed += 1;
            }
        }

        info!("Done with installs, {installed} new");
    }

    println!("{}", serde_json::to_string_pretty(&plans)?);

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");

            ExitCode::FAILURE
        }
    }
}
