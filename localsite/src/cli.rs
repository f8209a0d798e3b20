use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::commands;
use crate::config::{Backend, SITE_CONFIG_FILE_NAME};

/// localsite - provision a local IIS-style site with trusted HTTPS
#[derive(Parser)]
#[command(name = "localsite")]
#[command(version)]
#[command(about = "Provision a local site, its app pool, HTTPS bindings and hosts entries")]
pub struct Cli {
    /// Show verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Which site to work on and where.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TargetArgs {
    /// Site definition file
    #[arg(short = 'c', long, value_name = "FILE", default_value = SITE_CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Host and certificate store backend (default: settings, then platform)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Hosts file to edit instead of the system one
    #[arg(long, value_name = "PATH", env = "LOCALSITE_HOSTS_FILE")]
    pub hosts_file: Option<PathBuf>,

    /// Print machine-readable JSON instead of progress output
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Converge the host to the site definition
    Apply {
        #[command(flatten)]
        target: TargetArgs,

        /// Run without checking for administrator rights
        #[arg(long)]
        no_elevate: bool,
    },

    /// Show the current site, certificate and hosts state without changing anything
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
}

impl Cli {
    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(command) = self.command else {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        };

        match command {
            Commands::Apply { target, no_elevate } => commands::apply::run(&target, no_elevate),
            Commands::Status { target } => commands::status::run(&target),
        }
    }
}
