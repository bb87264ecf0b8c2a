//! buildenv CLI
//!
//! Command tree, logging setup and report output on top of `buildenv-core`.

pub mod commands;
pub mod logging;
pub mod report;

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[clap(
    name = "buildenv",
    version = buildenv_core::VERSION,
    about = "Provision the system packages needed to compile the database engine"
)]
pub struct Cli {
    /// Config file (default: ./buildenv.toml when present)
    #[clap(short, long, global = true, env = "BUILDENV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: commands::ProvisionCommands,
}
