//! Command-line interface definition for hk.
//!
//! Each subcommand takes a list of selectors, builds the matching pipeline
//! from the configuration and executes it once.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{ArgAction, Parser, Subcommand};

use crate::application::Application;
use crate::path::expand_path;
use crate::pipeline::{Command, ExecutionResult};
use crate::process::{ProcessRunner, SystemRunner};
use crate::selector::Selectors;
use crate::service::Operation;
use crate::{Result, backup, deploy};

/// Command-line interface definition for hk.
#[derive(Parser, Debug)]
#[command(name = "hk", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file [default: <config dir>/hostkeeper/config.toml]
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Supported hk commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Validate, pull and (re)start the selected compose stacks.
    Up {
        /// Glob patterns matched against stack names; all stacks when omitted.
        selectors: Vec<String>,
    },
    /// Validate and stop the selected compose stacks.
    Down {
        /// Glob patterns matched against stack names; all stacks when omitted.
        selectors: Vec<String>,
    },
    /// Archive the selected backup groups and upload the archives.
    Backup {
        /// Glob patterns matched against group names; all groups when omitted.
        selectors: Vec<String>,
    },
}

impl Commands {
    pub fn selectors(&self) -> &[String] {
        match self {
            Commands::Up { selectors }
            | Commands::Down { selectors }
            | Commands::Backup { selectors } => selectors,
        }
    }
}

/// Builds the pipeline for `command` from `app`.
pub fn build(
    command: &Commands,
    app: &Application,
    runner: Rc<dyn ProcessRunner>,
) -> Result<Command<Selectors>> {
    let built = match command {
        Commands::Up { .. } => deploy::command(Operation::Start, &app.deployment()?, runner),
        Commands::Down { .. } => deploy::command(Operation::Stop, &app.deployment()?, runner),
        Commands::Backup { .. } => {
            let settings = app.backup()?;
            let archiver = app.archiver(&settings.archiver, runner)?;
            let uploader = settings
                .uploader
                .as_deref()
                .map(|name| app.uploader(name))
                .transpose()?;
            backup::command(
                expand_path(&settings.destination),
                app.backup_groups()?,
                archiver,
                uploader,
            )
        }
    };
    Ok(built.with_arguments(command.selectors().to_vec()))
}

/// Compiles the selectors, loads `config` and executes `command`.
pub fn run(command: &Commands, config: &Path) -> Result<ExecutionResult> {
    let selectors = Selectors::new(command.selectors())?;
    let app = Application::load(config)?;
    let pipeline = build(command, &app, Rc::new(SystemRunner))?;
    Ok(pipeline.execute(&selectors))
}
