//! Report output for provisioning and verification results
//!
//! Reports are written as TOML, or JSON when the path ends in `.json`,
//! and printed in a human-readable form to stdout.

use anyhow::{Context, Result};
use buildenv_core::{ProvisionReport, VerificationReport};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct Meta {
    tool: &'static str,
    version: &'static str,
    generated: String,
}

/// Full report document as written to disk
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    provision: Option<&'a ProvisionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification: Option<&'a VerificationReport>,
}

impl<'a> ReportDocument<'a> {
    pub fn new(
        provision: Option<&'a ProvisionReport>,
        verification: Option<&'a VerificationReport>,
    ) -> Self {
        Self {
            meta: Meta {
                tool: "buildenv",
                version: buildenv_core::VERSION,
                generated: chrono::Utc::now().to_rfc3339(),
            },
            provision,
            verification,
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

fn serialize(document: &ReportDocument<'_>, path: &Path) -> Result<String> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::to_string_pretty(document).context("Failed to serialize report as JSON")
    } else {
        toml::to_string_pretty(document).context("Failed to serialize report as TOML")
    }
}

/// Write the report, creating parent directories. Returns the final path.
pub fn write_report(document: &ReportDocument<'_>, output_path: &Path) -> Result<PathBuf> {
    let final_path = expand(output_path);
    let content = serialize(document, &final_path)?;

    if let Some(parent) = final_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }
    }

    fs::write(&final_path, content)
        .with_context(|| format!("Failed to write report to {}", final_path.display()))?;

    tracing::debug!(path = %final_path.display(), "report written");
    Ok(final_path)
}

pub fn print_provision_report(report: &ProvisionReport) {
    println!("🧰 buildenv Provisioning Report");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Generated: {}", report.timestamp);
    if report.dry_run {
        println!("Mode: dry run (nothing executed)");
    }
    println!();

    println!("📦 Packages:");
    for package in &report.requested {
        let status = if report.installed.contains(package) {
            if report.dry_run { "📝 would install" } else { "✨ installed" }
        } else if report.already_installed.contains(package) {
            "✅ present"
        } else {
            "  "
        };
        println!("  {status} {package}");
    }

    println!();
    if report.index_refreshed {
        println!("🔄 Package index refreshed");
    } else {
        println!("⏭️  Package index not refreshed (nothing to install)");
    }

    match &report.cleanup {
        Some(cleanup) if cleanup.is_success() => {
            println!("🧹 Cache cleaned ({} entries removed)", cleanup.removed.len());
        }
        Some(cleanup) => {
            println!("⚠️  Cache cleanup incomplete:");
            for (path, error) in &cleanup.errors {
                println!("  {}: {}", path.display(), error);
            }
        }
        None => println!("⏭️  Cache cleanup skipped"),
    }

    println!();
    if report.was_noop() {
        println!("✅ Environment already provisioned");
    } else {
        println!("✅ Installed {} package(s)", report.installed.len());
    }
}

pub fn print_verification_report(report: &VerificationReport) {
    println!("🔍 buildenv Verification");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("📦 Packages:");
    for check in &report.packages {
        let status = if check.installed { "✅" } else { "❌" };
        println!("  {status} {}", check.name);
    }

    if !report.caches.is_empty() {
        println!();
        println!("🗂️  Package index cache:");
        for cache in &report.caches {
            match &cache.error {
                Some(error) => println!("  ❌ {}: {}", cache.path.display(), error),
                None if cache.remaining == 0 => println!("  ✅ {} (empty)", cache.path.display()),
                None => println!(
                    "  ⚠️  {} ({} entries remain)",
                    cache.path.display(),
                    cache.remaining
                ),
            }
        }
    }

    println!();
    if report.is_provisioned() {
        println!("✅ Environment provisioned");
    } else {
        println!(
            "⚠️  Environment not provisioned: {} missing package(s), {} dirty cache dir(s)",
            report.missing().len(),
            report.dirty_caches().len()
        );
    }
}
