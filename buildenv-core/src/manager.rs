//! Package manager adapters
//!
//! Only apt is supported. Commands go through a [`CommandRunner`] so the
//! adapter behaves the same in dry runs and tests.

use crate::config::{AptSection, Config};
use crate::error::{IndexRefreshSnafu, InstallSnafu, Result};
use crate::package::{PackageName, PackageSet};
use crate::runner::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of emptying the package-index cache
#[derive(Debug, Default, Clone, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Refresh the package index from its remote sources
    async fn refresh_index(&self) -> Result<()>;

    /// Install every package non-interactively; any failure fails the set
    async fn install(&self, packages: &PackageSet) -> Result<()>;

    async fn is_installed(&self, package: &PackageName) -> Result<bool>;

    /// Remove cached index metadata. Never fails; problems land in the report.
    async fn clean_cache(&self) -> CleanupReport;

    fn cache_dirs(&self) -> &[PathBuf];

    fn is_dry_run(&self) -> bool {
        false
    }
}

pub struct Apt {
    runner: Arc<dyn CommandRunner>,
    apt: AptSection,
    sudo: bool,
    cache_dirs: Vec<PathBuf>,
}

impl std::fmt::Debug for Apt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Apt")
            .field("apt", &self.apt)
            .field("sudo", &self.sudo)
            .field("cache_dirs", &self.cache_dirs)
            .field("dry_run", &self.runner.is_dry_run())
            .finish()
    }
}

impl Apt {
    pub fn new(config: &Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            apt: config.apt.clone(),
            sudo: config.privilege.needs_sudo(),
            cache_dirs: config.cache_dirs.clone(),
        }
    }

    fn privileged(&self, spec: CommandSpec) -> CommandSpec {
        if self.sudo { spec.elevated() } else { spec }
    }

    pub fn refresh_command(&self) -> CommandSpec {
        self.privileged(CommandSpec::new(&self.apt.apt_get).arg("update"))
    }

    pub fn install_command(&self, packages: &PackageSet) -> CommandSpec {
        self.privileged(
            CommandSpec::new(&self.apt.apt_get)
                .env("DEBIAN_FRONTEND", "noninteractive")
                .args(["install", "-y"])
                .args(packages.names()),
        )
    }

    /// Empties `dir` but keeps it; run through sudo when apt is
    pub fn cleanup_command(&self, dir: &Path) -> CommandSpec {
        self.privileged(CommandSpec::new("find").args([
            dir.to_string_lossy().into_owned(),
            "-mindepth".to_string(),
            "1".to_string(),
            "-delete".to_string(),
        ]))
    }

    pub fn query_command(&self, package: &PackageName) -> CommandSpec {
        CommandSpec::new(&self.apt.dpkg_query)
            .args(["-W", "-f=${Status}", package.as_str()])
            .capture()
    }
}

impl Apt {
    async fn empty_dir_elevated(&self, dir: &Path, report: &mut CleanupReport) {
        let dry_run = self.runner.is_dry_run();
        if !dry_run && !tokio::fs::try_exists(dir).await.unwrap_or(true) {
            tracing::debug!(dir = %dir.display(), "cache dir absent, nothing to clean");
            return;
        }

        // entries are usually world-readable even when only root may delete them
        let mut entries = Vec::new();
        if !dry_run {
            if let Ok(mut listing) = tokio::fs::read_dir(dir).await {
                while let Ok(Some(entry)) = listing.next_entry().await {
                    entries.push(entry.path());
                }
            }
        }

        let spec = self.cleanup_command(dir);
        match self.runner.run(&spec).await {
            Ok(outcome) if outcome.is_success() => report.removed.extend(entries),
            Ok(outcome) => {
                let error = format!("`{spec}` exited with {}", outcome.status_text());
                tracing::warn!(dir = %dir.display(), %error, "elevated cache cleanup failed");
                report.errors.push((dir.to_path_buf(), error));
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "elevated cache cleanup failed");
                report.errors.push((dir.to_path_buf(), e.to_string()));
            }
        }
    }
}

#[async_trait]
impl PackageManager for Apt {
    async fn refresh_index(&self) -> Result<()> {
        let spec = self.refresh_command();
        let outcome = self.runner.run(&spec).await?;
        if !outcome.is_success() {
            return IndexRefreshSnafu {
                command: spec.to_string(),
                status: outcome.status_text(),
            }
            .fail();
        }
        Ok(())
    }

    async fn install(&self, packages: &PackageSet) -> Result<()> {
        let spec = self.install_command(packages);
        let outcome = self.runner.run(&spec).await?;
        if !outcome.is_success() {
            return InstallSnafu {
                packages: packages.names().join(", "),
                command: spec.to_string(),
                status: outcome.status_text(),
            }
            .fail();
        }
        Ok(())
    }

    async fn is_installed(&self, package: &PackageName) -> Result<bool> {
        let outcome = self.runner.run(&self.query_command(package)).await?;
        // dpkg-query exits 1 for unknown packages
        Ok(outcome.is_success() && status_is_installed(&outcome.stdout))
    }

    async fn clean_cache(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for dir in &self.cache_dirs {
            if self.sudo {
                // root-owned cache, so removal goes through the runner
                self.empty_dir_elevated(dir, &mut report).await;
            } else if self.runner.is_dry_run() {
                tracing::info!(dir = %dir.display(), "dry run: would empty cache dir");
            } else {
                empty_dir(dir, &mut report).await;
            }
        }
        report
    }

    fn cache_dirs(&self) -> &[PathBuf] {
        &self.cache_dirs
    }

    fn is_dry_run(&self) -> bool {
        self.runner.is_dry_run()
    }
}

/// `install ok installed` is the only fully-installed dpkg status
fn status_is_installed(status: &str) -> bool {
    status
        .split_whitespace()
        .last()
        .is_some_and(|state| state == "installed")
}

/// Remove every entry inside `dir`, keeping `dir` itself
async fn empty_dir(dir: &Path, report: &mut CleanupReport) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "cache dir absent, nothing to clean");
            return;
        }
        Err(e) => {
            report.errors.push((dir.to_path_buf(), e.to_string()));
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                report.errors.push((dir.to_path_buf(), e.to_string()));
                break;
            }
        };

        let path = entry.path();
        let removal = match entry.file_type().await {
            Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };

        match removal {
            Ok(()) => report.removed.push(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove cache entry");
                report.errors.push((path, e.to_string()));
            }
        }
    }
}

/// Number of entries left in a cache dir; a missing dir counts as empty
pub fn remaining_entries(dir: &Path) -> std::io::Result<usize> {
    match std::fs::read_dir(dir) {
        Ok(entries) => Ok(entries.count()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}
