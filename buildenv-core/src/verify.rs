//! Post-provisioning checks
//!
//! Confirms every package reports as installed and every cache dir is empty.

use crate::error::Result;
use crate::manager::{PackageManager, remaining_entries};
use crate::package::{PackageName, PackageSet};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;

/// Result of checking a single package
#[derive(Debug, Clone, Serialize)]
pub struct PackageCheck {
    pub name: PackageName,
    pub installed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheCheck {
    pub path: PathBuf,
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CacheCheck {
    pub fn is_empty(&self) -> bool {
        self.error.is_none() && self.remaining == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub packages: Vec<PackageCheck>,
    pub caches: Vec<CacheCheck>,
}

impl VerificationReport {
    pub fn missing(&self) -> Vec<&PackageCheck> {
        self.packages.iter().filter(|p| !p.installed).collect()
    }

    pub fn dirty_caches(&self) -> Vec<&CacheCheck> {
        self.caches.iter().filter(|c| !c.is_empty()).collect()
    }

    pub fn is_provisioned(&self) -> bool {
        self.missing().is_empty() && self.dirty_caches().is_empty()
    }
}

pub async fn verify<M: PackageManager + ?Sized>(
    manager: &M,
    packages: &PackageSet,
) -> Result<VerificationReport> {
    let mut checks = Vec::with_capacity(packages.len());
    for package in packages {
        let installed = manager.is_installed(package).await?;
        tracing::debug!(%package, installed, "checked package");
        checks.push(PackageCheck {
            name: package.clone(),
            installed,
        });
    }

    let caches = manager
        .cache_dirs()
        .iter()
        .map(|dir| match remaining_entries(dir) {
            Ok(remaining) => CacheCheck {
                path: dir.clone(),
                remaining,
                error: None,
            },
            Err(e) => CacheCheck {
                path: dir.clone(),
                remaining: 0,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        packages: checks,
        caches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Apt;
    use crate::manager::tests::{MockRunner, test_config};
    use crate::provisioner::{ProvisionOptions, Provisioner};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_bare_environment_not_provisioned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lock"), "").unwrap();
        let apt = Apt::new(
            &test_config(dir.path()),
            Arc::new(MockRunner::with_installed(&["flex"])),
        );

        let report = verify(&apt, &PackageSet::build_toolchain()).await.unwrap();

        assert!(!report.is_provisioned());
        assert_eq!(report.missing().len(), 5);
        assert_eq!(report.dirty_caches().len(), 1);
        assert_eq!(report.caches[0].remaining, 1);
    }

    #[tokio::test]
    async fn test_provisioned_environment_verifies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lock"), "").unwrap();
        let apt = Apt::new(&test_config(dir.path()), Arc::new(MockRunner::default()));
        let provisioner = Provisioner::new(apt);
        let set = PackageSet::build_toolchain();

        provisioner
            .provision(&set, ProvisionOptions::default())
            .await
            .unwrap();
        let report = verify(provisioner.manager(), &set).await.unwrap();

        assert!(report.is_provisioned());
        assert!(report.packages.iter().all(|p| p.installed));
    }
}
