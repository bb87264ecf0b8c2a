//! Error types for provisioning
//!
//! Index refresh and install failures are provisioning failures: they are
//! never retried and abort the whole run.

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProvisionError {
    #[snafu(display("Package index refresh failed: `{command}` exited with {status}"))]
    IndexRefresh { command: String, status: String },

    #[snafu(display("Package install failed for [{packages}]: `{command}` exited with {status}"))]
    Install {
        packages: String,
        command: String,
        status: String,
    },

    #[snafu(display("Failed to execute `{command}`: {source}"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to read config {}: {source}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse config {}: {source}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("Invalid package name: {name:?}"))]
    InvalidPackageName { name: String },

    #[snafu(display("Unknown privilege mode: {value:?} (expected auto, sudo or none)"))]
    UnknownPrivilege { value: String },

    #[snafu(display("Package set is empty"))]
    EmptyPackageSet,
}

impl ProvisionError {
    /// True for the failures that leave the environment unprovisioned
    pub fn is_provisioning_failure(&self) -> bool {
        matches!(
            self,
            Self::IndexRefresh { .. } | Self::Install { .. } | Self::Spawn { .. }
        )
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
