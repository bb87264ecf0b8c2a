use anyhow::{Context, Result};
use buildenv_cli::{Cli, commands, logging};
use buildenv_core::Config;
use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    let config = Config::discover(cli.config.as_deref(), &cwd).context("Failed to load config")?;
    tracing::debug!(
        source = ?config.source,
        packages = %config.packages,
        privilege = ?config.privilege,
        "config loaded"
    );

    commands::handle_provision_command(cli.command, config).await
}
