//! Environment provisioner
//!
//! Refresh index, install, clean cache. Refresh and install failures abort
//! the run; cache cleanup is best-effort and never replaces an install error.

use crate::error::Result;
use crate::manager::{CleanupReport, PackageManager};
use crate::package::{PackageName, PackageSet};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionOptions {
    /// Install the whole set even if every package is present
    pub force: bool,
    pub skip_cleanup: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub timestamp: String,
    pub requested: PackageSet,
    pub already_installed: Vec<PackageName>,
    pub installed: Vec<PackageName>,
    pub index_refreshed: bool,
    pub cleanup: Option<CleanupReport>,
    pub dry_run: bool,
}

impl ProvisionReport {
    fn new(requested: &PackageSet) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            requested: requested.clone(),
            already_installed: Vec::new(),
            installed: Vec::new(),
            index_refreshed: false,
            cleanup: None,
            dry_run: false,
        }
    }

    /// Nothing needed installing
    pub fn was_noop(&self) -> bool {
        self.installed.is_empty() && !self.index_refreshed
    }

    pub fn cleanup_warnings(&self) -> usize {
        self.cleanup.as_ref().map_or(0, |c| c.errors.len())
    }
}

/// Split of a package set into present and still-to-install packages
#[derive(Debug, Clone)]
pub struct Pending {
    pub already_installed: Vec<PackageName>,
    pub to_install: PackageSet,
}

#[derive(Debug)]
pub struct Provisioner<M> {
    manager: M,
}

impl<M: PackageManager> Provisioner<M> {
    pub fn new(manager: M) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub async fn provision(
        &self,
        packages: &PackageSet,
        options: ProvisionOptions,
    ) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::new(packages);
        report.dry_run = self.manager.is_dry_run();

        let Pending {
            already_installed,
            to_install,
        } = self.pending(packages, options.force).await?;
        report.already_installed = already_installed;

        if to_install.is_empty() {
            tracing::info!(count = packages.len(), "all packages already installed");
            report.cleanup = self.cleanup(options).await;
            return Ok(report);
        }

        tracing::info!("refreshing package index");
        self.manager.refresh_index().await?;
        report.index_refreshed = true;

        tracing::info!(packages = %to_install, "installing packages");
        let installed = self.manager.install(&to_install).await;

        // cleanup result is recorded, the install result is what we return
        report.cleanup = self.cleanup(options).await;
        installed?;

        report.installed = to_install.iter().cloned().collect();
        Ok(report)
    }

    /// Query which packages still need installing; `force` selects all of them
    pub async fn pending(&self, packages: &PackageSet, force: bool) -> Result<Pending> {
        if force {
            return Ok(Pending {
                already_installed: Vec::new(),
                to_install: packages.clone(),
            });
        }

        let mut already_installed = Vec::new();
        for package in packages {
            if self.manager.is_installed(package).await? {
                tracing::debug!(%package, "already installed");
                already_installed.push(package.clone());
            }
        }
        let to_install = packages.filter(|p| !already_installed.contains(p));
        Ok(Pending {
            already_installed,
            to_install,
        })
    }

    async fn cleanup(&self, options: ProvisionOptions) -> Option<CleanupReport> {
        if options.skip_cleanup {
            tracing::debug!("skipping cache cleanup");
            return None;
        }

        let cleanup = self.manager.clean_cache().await;
        for (path, error) in &cleanup.errors {
            tracing::warn!(path = %path.display(), %error, "cache cleanup incomplete");
        }
        tracing::debug!(removed = cleanup.removed.len(), "package index cache cleaned");
        Some(cleanup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvisionError;
    use crate::manager::tests::{MockRunner, test_config};
    use crate::manager::{Apt, remaining_entries};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn setup(runner: MockRunner) -> (tempfile::TempDir, Arc<MockRunner>, Provisioner<Apt>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lock"), "").unwrap();
        std::fs::write(dir.path().join("archive_InRelease"), "x").unwrap();
        let runner = Arc::new(runner);
        let apt = Apt::new(&test_config(dir.path()), runner.clone());
        (dir, runner, Provisioner::new(apt))
    }

    #[tokio::test]
    async fn test_fresh_environment_installs_everything() {
        let (dir, runner, provisioner) = setup(MockRunner::default());
        let set = PackageSet::build_toolchain();

        let report = provisioner
            .provision(&set, ProvisionOptions::default())
            .await
            .unwrap();

        assert!(report.index_refreshed);
        assert_eq!(report.installed.len(), 6);
        assert_eq!(runner.count("apt-get update"), 1);
        assert_eq!(runner.count("apt-get install"), 1);
        assert_eq!(remaining_entries(dir.path()).unwrap(), 0);

        for package in &set {
            assert!(provisioner.manager().is_installed(package).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (_dir, runner, provisioner) = setup(MockRunner::default());
        let set = PackageSet::build_toolchain();
        provisioner
            .provision(&set, ProvisionOptions::default())
            .await
            .unwrap();

        let second = provisioner
            .provision(&set, ProvisionOptions::default())
            .await
            .unwrap();

        assert!(second.was_noop());
        assert_eq!(second.already_installed.len(), 6);
        assert_eq!(runner.count("apt-get update"), 1);
        assert_eq!(runner.count("apt-get install"), 1);
    }

    #[tokio::test]
    async fn test_only_missing_packages_installed() {
        let (_dir, runner, provisioner) =
            setup(MockRunner::with_installed(&["flex", "bison", "build-essential"]));

        let report = provisioner
            .provision(&PackageSet::build_toolchain(), ProvisionOptions::default())
            .await
            .unwrap();

        assert_eq!(report.already_installed.len(), 3);
        let installed: Vec<&str> = report.installed.iter().map(PackageName::as_str).collect();
        assert_eq!(
            installed,
            vec!["libreadline6-dev", "zlib1g-dev", "libossp-uuid-dev"]
        );
        assert!(runner.commands().iter().any(|c| c.ends_with(
            "apt-get install -y libreadline6-dev zlib1g-dev libossp-uuid-dev"
        )));
    }

    #[tokio::test]
    async fn test_pending_splits_present_from_missing() {
        let (_dir, runner, provisioner) = setup(MockRunner::with_installed(&["bison"]));
        let set = PackageSet::from_names(["flex", "bison", "zlib1g-dev"]).unwrap();

        let pending = provisioner.pending(&set, false).await.unwrap();
        assert_eq!(pending.already_installed.len(), 1);
        assert_eq!(pending.to_install.names(), vec!["flex", "zlib1g-dev"]);
        assert_eq!(runner.count("dpkg-query"), 3);
        assert_eq!(runner.count("apt-get"), 0);

        let forced = provisioner.pending(&set, true).await.unwrap();
        assert_eq!(forced.to_install, set);
    }

    #[tokio::test]
    async fn test_force_reinstalls_all() {
        let (_dir, runner, provisioner) = setup(MockRunner::with_installed(&["flex", "bison"]));
        let options = ProvisionOptions {
            force: true,
            ..ProvisionOptions::default()
        };
        let set = PackageSet::from_names(["flex", "bison"]).unwrap();

        let report = provisioner.provision(&set, options).await.unwrap();

        assert_eq!(report.installed.len(), 2);
        assert_eq!(runner.count("dpkg-query"), 0);
    }

    #[tokio::test]
    async fn test_unreachable_index_installs_nothing() {
        let (dir, runner, provisioner) = setup(MockRunner {
            fail_update: true,
            ..MockRunner::default()
        });

        let err = provisioner
            .provision(&PackageSet::build_toolchain(), ProvisionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::IndexRefresh { .. }));
        assert_eq!(runner.count("apt-get install"), 0);
        assert!(runner.installed.lock().unwrap().is_empty());
        // cache untouched when we never reached install
        assert_eq!(remaining_entries(dir.path()).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_install_failure_still_cleans_and_is_returned() {
        let (dir, _runner, provisioner) = setup(MockRunner {
            fail_install: true,
            ..MockRunner::default()
        });

        let err = provisioner
            .provision(&PackageSet::build_toolchain(), ProvisionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Install { .. }));
        assert_eq!(remaining_entries(dir.path()).unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_install_error() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where a directory is expected makes read_dir fail
        let bogus: PathBuf = dir.path().join("not-a-dir");
        std::fs::write(&bogus, "x").unwrap();

        let runner = Arc::new(MockRunner {
            fail_install: true,
            ..MockRunner::default()
        });
        let apt = Apt::new(&test_config(&bogus), runner);
        let err = Provisioner::new(apt)
            .provision(&PackageSet::build_toolchain(), ProvisionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Install { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_failure_alone_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not-a-dir");
        std::fs::write(&bogus, "x").unwrap();

        let apt = Apt::new(&test_config(&bogus), Arc::new(MockRunner::default()));
        let report = Provisioner::new(apt)
            .provision(&PackageSet::build_toolchain(), ProvisionOptions::default())
            .await
            .unwrap();

        assert_eq!(report.installed.len(), 6);
        assert_eq!(report.cleanup_warnings(), 1);
    }

    #[tokio::test]
    async fn test_skip_cleanup_leaves_cache() {
        let (dir, _runner, provisioner) = setup(MockRunner::default());
        let options = ProvisionOptions {
            skip_cleanup: true,
            ..ProvisionOptions::default()
        };
        let report = provisioner
            .provision(&PackageSet::build_toolchain(), options)
            .await
            .unwrap();
        assert!(report.cleanup.is_none());
        assert_eq!(remaining_entries(dir.path()).unwrap(), 2);
    }
}
