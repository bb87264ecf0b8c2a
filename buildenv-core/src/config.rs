//! Provisioning configuration loaded from buildenv.toml
//!
//! Every field is optional; a missing file yields the build toolchain defaults.

use crate::error::{
    ConfigParseSnafu, ConfigReadSnafu, EmptyPackageSetSnafu, Result, UnknownPrivilegeSnafu,
};
use crate::package::{BUILD_TOOLCHAIN, PackageSet};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_FILE: &str = "buildenv.toml";
pub const DEFAULT_CACHE_DIR: &str = "/var/lib/apt/lists";

/// Raw file layout matching buildenv.toml
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    provision: ProvisionSection,
    #[serde(default)]
    apt: AptSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProvisionSection {
    packages: Option<Vec<String>>,
    #[serde(default)]
    extra_packages: Vec<String>,
    privilege: Option<String>,
    cache_dirs: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AptSection {
    #[serde(default = "default_apt_get")]
    pub apt_get: String,
    #[serde(default = "default_dpkg_query")]
    pub dpkg_query: String,
}

impl Default for AptSection {
    fn default() -> Self {
        Self {
            apt_get: default_apt_get(),
            dpkg_query: default_dpkg_query(),
        }
    }
}

fn default_apt_get() -> String {
    "apt-get".to_string()
}

fn default_dpkg_query() -> String {
    "dpkg-query".to_string()
}

/// Whether package-manager commands run through sudo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// sudo unless already root
    #[default]
    Auto,
    Sudo,
    None,
}

impl Privilege {
    pub fn needs_sudo(self) -> bool {
        match self {
            Self::Auto => !is_root(),
            Self::Sudo => true,
            Self::None => false,
        }
    }
}

/// True when the effective uid is 0, whatever the account is called
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

impl FromStr for Privilege {
    type Err = crate::error::ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sudo" => Ok(Self::Sudo),
            "none" => Ok(Self::None),
            _ => UnknownPrivilegeSnafu { value: s }.fail(),
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub packages: PackageSet,
    pub privilege: Privilege,
    pub cache_dirs: Vec<PathBuf>,
    pub apt: AptSection,
    /// File the config came from, if any
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            packages: PackageSet::build_toolchain(),
            privilege: Privilege::default(),
            cache_dirs: vec![PathBuf::from(DEFAULT_CACHE_DIR)],
            apt: AptSection::default(),
            source: None,
        }
    }
}

impl Config {
    /// Load from an explicit path. The file must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(ConfigReadSnafu { path })?;
        let mut config = Self::from_toml(&content, path)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load `path` if given, else `buildenv.toml` in `dir` when present, else defaults
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "using discovered config");
            Self::load(&candidate)
        } else {
            tracing::debug!("no config file found, using build toolchain defaults");
            Ok(Self::default())
        }
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).context(ConfigParseSnafu { path })?;
        let section = file.provision;

        let base: Vec<String> = section
            .packages
            .unwrap_or_else(|| BUILD_TOOLCHAIN.iter().map(|s| (*s).to_string()).collect());
        let packages = PackageSet::from_names(base.iter().chain(section.extra_packages.iter()))?;

        let privilege = match section.privilege {
            Some(value) => value.parse()?,
            None => Privilege::default(),
        };

        let cache_dirs = section
            .cache_dirs
            .unwrap_or_else(|| vec![DEFAULT_CACHE_DIR.to_string()])
            .iter()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref()))
            .collect();

        let config = Self {
            packages,
            privilege,
            cache_dirs,
            apt: file.apt,
            source: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Append packages given on the command line
    pub fn with_extra_packages<S: AsRef<str>>(mut self, extra: &[S]) -> Result<Self> {
        if extra.is_empty() {
            return Ok(self);
        }
        let names: Vec<&str> = self
            .packages
            .names()
            .into_iter()
            .chain(extra.iter().map(|name| name.as_ref()))
            .collect();
        self.packages = PackageSet::from_names(names)?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.packages.is_empty() {
            return EmptyPackageSetSnafu.fail();
        }
        Ok(())
    }
}
