//! Package identifiers and the immutable package set

use crate::error::{InvalidPackageNameSnafu, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;

lazy_static! {
    // Debian policy: lowercase alphanumerics plus `+ - .`, starting alphanumeric
    static ref PACKAGE_NAME_RE: Regex =
        Regex::new(r"^[a-z0-9][a-z0-9+.\-]+$").expect("package name regex is valid");
}

/// Packages needed to compile the database engine from source:
/// parser generators, the compiler toolchain, and readline/zlib/uuid headers.
pub const BUILD_TOOLCHAIN: &[&str] = &[
    "flex",
    "bison",
    "build-essential",
    "libreadline6-dev",
    "zlib1g-dev",
    "libossp-uuid-dev",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if !PACKAGE_NAME_RE.is_match(name) {
            return InvalidPackageNameSnafu { name }.fail();
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ordered, de-duplicated list of packages. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PackageSet {
    packages: Vec<PackageName>,
}

impl PackageSet {
    /// Build a set from raw names, keeping first occurrence order
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut packages: Vec<PackageName> = Vec::new();
        for name in names {
            let parsed = PackageName::parse(name.as_ref())?;
            if !packages.contains(&parsed) {
                packages.push(parsed);
            }
        }
        Ok(Self { packages })
    }

    pub fn build_toolchain() -> Self {
        Self {
            packages: BUILD_TOOLCHAIN
                .iter()
                .map(|name| PackageName((*name).to_string()))
                .collect(),
        }
    }

    /// Subset of this set matching `keep`, preserving order
    pub fn filter<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&PackageName) -> bool,
    {
        Self {
            packages: self.packages.iter().filter(|p| keep(p)).cloned().collect(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackageName> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.iter().any(|p| p.as_str() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.packages.iter().map(PackageName::as_str).collect()
    }
}

impl<'a> IntoIterator for &'a PackageSet {
    type Item = &'a PackageName;
    type IntoIter = std::slice::Iter<'a, PackageName>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter()
    }
}

impl fmt::Display for PackageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_toolchain_order() {
        let set = PackageSet::build_toolchain();
        assert_eq!(
            set.names(),
            vec![
                "flex",
                "bison",
                "build-essential",
                "libreadline6-dev",
                "zlib1g-dev",
                "libossp-uuid-dev"
            ]
        );
    }

    #[test]
    fn test_toolchain_names_pass_validation() {
        let parsed = PackageSet::from_names(BUILD_TOOLCHAIN).unwrap();
        assert_eq!(parsed, PackageSet::build_toolchain());
    }

    #[test]
    fn test_package_name_validation() {
        assert!(PackageName::parse("g++").is_ok());
        assert!(PackageName::parse("libstdc++6").is_ok());
        assert!(PackageName::parse("python3.12-dev").is_ok());
        assert!(PackageName::parse("Flex").is_err());
        assert!(PackageName::parse("-y").is_err());
        assert!(PackageName::parse("a").is_err());
        assert!(PackageName::parse("flex; rm -rf /").is_err());
        assert!(PackageName::parse("").is_err());
    }

    #[test]
    fn test_duplicates_collapse_in_first_order() {
        let set = PackageSet::from_names(["bison", "flex", "bison"]).unwrap();
        assert_eq!(set.names(), vec!["bison", "flex"]);
        assert!(set.contains("flex"));
        assert!(!set.contains("zlib1g-dev"));
    }

    #[test]
    fn test_filter_keeps_order() {
        let set = PackageSet::build_toolchain();
        let libs = set.filter(|p| p.as_str().starts_with("lib"));
        assert_eq!(libs.names(), vec!["libreadline6-dev", "libossp-uuid-dev"]);
        assert_eq!(set.len(), 6);
    }
}
