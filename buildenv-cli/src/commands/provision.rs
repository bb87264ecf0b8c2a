//! Provisioning commands
//!
//! - run: refresh index, install missing packages, clean the index cache
//! - check: verify packages are installed and caches are empty
//! - plan: print the commands `run` would execute on this machine
//! - packages: list the configured package set

use crate::report::{
    ReportDocument, print_provision_report, print_verification_report, write_report,
};
use anyhow::{Context, Result};
use buildenv_core::{
    Apt, CommandRunner, Config, DryRunRunner, ProvisionOptions, Provisioner, SystemRunner, verify,
};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Subcommand, Clone)]
pub enum ProvisionCommands {
    /// Provision the environment (refresh index + install + clean cache)
    #[clap(alias = "install")]
    Run {
        /// Install the whole set even when every package is present
        #[clap(long)]
        force: bool,

        /// Keep the package index cache
        #[clap(long)]
        skip_cleanup: bool,

        /// Print commands instead of executing them
        #[clap(long)]
        dry_run: bool,

        /// Write a report (TOML, or JSON for *.json)
        #[clap(short, long)]
        report: Option<PathBuf>,

        /// Additional packages to install with the configured set
        #[clap(long = "extra", value_name = "PKG")]
        extra: Vec<String>,
    },

    /// Verify packages are installed and the index cache is empty
    Check {
        /// Write a report (TOML, or JSON for *.json)
        #[clap(short, long)]
        report: Option<PathBuf>,
    },

    /// Query installed packages and print the commands `run` would execute
    Plan {
        /// Plan an install of the whole set even when every package is present
        #[clap(long)]
        force: bool,
    },

    /// List the configured package set
    Packages,
}

/// Handle provisioning commands
pub async fn handle_provision_command(cmd: ProvisionCommands, config: Config) -> Result<()> {
    match cmd {
        ProvisionCommands::Run {
            force,
            skip_cleanup,
            dry_run,
            report,
            extra,
        } => {
            let config = config
                .with_extra_packages(&extra)
                .context("Invalid --extra package")?;
            let options = ProvisionOptions {
                force,
                skip_cleanup,
            };
            run_provision(config, options, dry_run, report).await
        }
        ProvisionCommands::Check { report } => check_only(config, report).await,
        ProvisionCommands::Plan { force } => plan(&config, force).await,
        ProvisionCommands::Packages => {
            for package in &config.packages {
                println!("{package}");
            }
            Ok(())
        }
    }
}

async fn run_provision(
    config: Config,
    options: ProvisionOptions,
    dry_run: bool,
    report_path: Option<PathBuf>,
) -> Result<()> {
    println!("🧰 buildenv - provisioning {} package(s)", config.packages.len());
    println!();

    let dry_runner = Arc::new(DryRunRunner::new());
    let runner: Arc<dyn CommandRunner> = if dry_run {
        dry_runner.clone() as Arc<dyn CommandRunner>
    } else {
        Arc::new(SystemRunner)
    };

    let provisioner = Provisioner::new(Apt::new(&config, runner));
    let report = provisioner
        .provision(&config.packages, options)
        .await
        .context("Provisioning failed")?;

    print_provision_report(&report);

    if dry_run {
        println!();
        println!("📝 Commands that would run:");
        for command in dry_runner.commands() {
            println!("  {command}");
        }
        // unprivileged cleanup runs in-process and is not among the recorded commands
        if report.cleanup.is_some() && !config.privilege.needs_sudo() {
            for dir in &config.cache_dirs {
                println!("  {}", provisioner.manager().cleanup_command(dir));
            }
        }
        if let Some(path) = report_path {
            emit_report(&ReportDocument::new(Some(&report), None), &path)?;
        }
        return Ok(());
    }

    let verification = verify(provisioner.manager(), &config.packages)
        .await
        .context("Failed to verify environment")?;
    if !verification.is_provisioned() {
        println!();
        print_verification_report(&verification);
    }

    if let Some(path) = report_path {
        emit_report(&ReportDocument::new(Some(&report), Some(&verification)), &path)?;
    }

    // a missing package after a successful install is still a failed environment
    if !verification.missing().is_empty() {
        anyhow::bail!(
            "Packages not installed after provisioning: {}",
            verification
                .missing()
                .iter()
                .map(|check| check.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}

async fn check_only(config: Config, report_path: Option<PathBuf>) -> Result<()> {
    println!("📋 Checking environment...");
    let apt = Apt::new(&config, Arc::new(SystemRunner));
    let verification = verify(&apt, &config.packages)
        .await
        .context("Failed to verify environment")?;

    print_verification_report(&verification);

    if let Some(path) = report_path {
        emit_report(&ReportDocument::new(None, Some(&verification)), &path)?;
    }

    if !verification.is_provisioned() {
        anyhow::bail!("Environment not provisioned");
    }

    Ok(())
}

fn emit_report(document: &ReportDocument<'_>, path: &Path) -> Result<()> {
    let written = write_report(document, path).context("Failed to write report")?;
    println!();
    println!("📄 Report written to: {}", written.display());
    Ok(())
}

/// Same skip logic as `run`: installed packages are queried, only the rest is planned
async fn plan(config: &Config, force: bool) -> Result<()> {
    let provisioner = Provisioner::new(Apt::new(config, Arc::new(SystemRunner)));
    let pending = provisioner
        .pending(&config.packages, force)
        .await
        .context("Failed to query installed packages")?;
    let apt = provisioner.manager();

    if pending.to_install.is_empty() {
        println!("# all {} package(s) already installed", config.packages.len());
    } else {
        println!("{}", apt.refresh_command());
        println!("{}", apt.install_command(&pending.to_install));
    }
    for dir in &config.cache_dirs {
        println!("{}", apt.cleanup_command(dir));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[clap(subcommand)]
        cmd: ProvisionCommands,
    }

    #[test]
    fn test_run_flags_parse() {
        let parsed = Harness::try_parse_from([
            "buildenv",
            "run",
            "--force",
            "--dry-run",
            "--extra",
            "gettext",
            "--extra",
            "libssl-dev",
        ])
        .unwrap();
        match parsed.cmd {
            ProvisionCommands::Run {
                force,
                dry_run,
                skip_cleanup,
                extra,
                ..
            } => {
                assert!(force);
                assert!(dry_run);
                assert!(!skip_cleanup);
                assert_eq!(extra, vec!["gettext", "libssl-dev"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_plan_force_flag() {
        let parsed = Harness::try_parse_from(["buildenv", "plan", "--force"]).unwrap();
        assert!(matches!(parsed.cmd, ProvisionCommands::Plan { force: true }));

        let parsed = Harness::try_parse_from(["buildenv", "plan"]).unwrap();
        assert!(matches!(parsed.cmd, ProvisionCommands::Plan { force: false }));
    }

    #[test]
    fn test_install_alias() {
        let parsed = Harness::try_parse_from(["buildenv", "install"]).unwrap();
        assert!(matches!(parsed.cmd, ProvisionCommands::Run { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_succeeds_without_system_access() {
        let config = Config {
            cache_dirs: vec![PathBuf::from("/nonexistent/lists")],
            ..Config::default()
        };
        let cmd = ProvisionCommands::Run {
            force: false,
            skip_cleanup: false,
            dry_run: true,
            report: None,
            extra: Vec::new(),
        };
        handle_provision_command(cmd, config).await.unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_writes_requested_report() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("dry.toml");
        let config = Config {
            cache_dirs: vec![dir.path().join("lists")],
            ..Config::default()
        };
        let cmd = ProvisionCommands::Run {
            force: false,
            skip_cleanup: false,
            dry_run: true,
            report: Some(target.clone()),
            extra: Vec::new(),
        };
        handle_provision_command(cmd, config).await.unwrap();

        let content = std::fs::read_to_string(&target).unwrap();
        assert!(content.contains("dry_run = true"));
        assert!(!content.contains("[verification]"));
    }
}
