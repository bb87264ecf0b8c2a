//! Core library for buildenv
//!
//! Provisions the system packages needed to compile the database engine
//! from source and verifies the result:
//! - Package set definition and validation
//! - Configuration (buildenv.toml)
//! - apt adapter behind a command runner seam
//! - Provisioner (refresh, install, clean cache)
//! - Post-provisioning verification

pub mod config;
pub mod error;
pub mod manager;
pub mod package;
pub mod provisioner;
pub mod runner;
pub mod verify;

pub use config::{Config, Privilege};
pub use error::{ProvisionError, Result};
pub use manager::{Apt, CleanupReport, PackageManager};
pub use package::{BUILD_TOOLCHAIN, PackageName, PackageSet};
pub use provisioner::{Pending, ProvisionOptions, ProvisionReport, Provisioner};
pub use runner::{CommandRunner, CommandSpec, DryRunRunner, SystemRunner};
pub use verify::{VerificationReport, verify};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
