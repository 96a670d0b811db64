//! Pulls the APK of each installed app and names it after the app and its version.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};

use crate::{
    adb::{self, Bridge, PackageKind},
    app_name::AppNameSource,
    ledger::{ApkRecord, Ledger},
    sanitize::sanitize_filename,
};

pub const DEFAULT_USER_DIR: &str = "user_apks";
pub const DEFAULT_SYSTEM_DIR: &str = "system_apks";

/// Where pulled APKs are saved, and which packages are pulled.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub user_dir: PathBuf,
    pub system_dir: PathBuf,
    /// If false, only user-installed packages are processed.
    pub include_system: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            user_dir: DEFAULT_USER_DIR.into(),
            system_dir: DEFAULT_SYSTEM_DIR.into(),
            include_system: true,
        }
    }
}

impl HarvestConfig {
    pub fn dir_for(&self, kind: PackageKind) -> &Path {
        match kind {
            PackageKind::User => &self.user_dir,
            PackageKind::System => &self.system_dir,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The ledger already holds this version of the package.
    AlreadyDownloaded,
    /// The device gave no APK path for the package.
    PathUnresolved,
    /// `adb pull` did not report success.
    TransferFailed,
}

/// What became of a single package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    Finalized(PathBuf),
    Skipped(SkipReason),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarvestSummary {
    pub finalized: usize,
    pub skipped: usize,
    /// Packages whose processing gave an error, e.g. a failed rename.
    pub failed: usize,
}

pub struct Harvester<'b, B: Bridge, N: AppNameSource> {
    bridge: &'b B,
    names: N,
    config: HarvestConfig,
    ledger: Option<Ledger>,
}

impl<'b, B: Bridge, N: AppNameSource> Harvester<'b, B, N> {
    pub fn new(bridge: &'b B, names: N, config: HarvestConfig) -> Self {
        Self {
            bridge,
            names,
            config,
            ledger: None,
        }
    }

    /// Skips packages already in the ledger, and records newly pulled ones.
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Gives back the ledger (if any) so that it can be closed.
    pub fn into_ledger(self) -> Option<Ledger> {
        self.ledger
    }

    /// Processes every user package, then every system package.
    /// Failures for individual packages are logged and counted, not returned.
    pub fn run(&self) -> Result<HarvestSummary> {
        let mut kinds = vec![PackageKind::User];
        if self.config.include_system {
            kinds.push(PackageKind::System);
        }

        for kind in &kinds {
            let dir = self.config.dir_for(*kind);
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Creating output directory {}", dir.display()))?;
        }

        let mut summary = HarvestSummary::default();
        for kind in kinds {
            let packages = adb::list_packages(self.bridge, kind);
            info!("Found {} {} apps", packages.len(), kind.describe());

            for package in packages {
                info!("Processing {} app: {package}", kind.describe());
                match self.process_package(&package, kind) {
                    Ok(PackageOutcome::Finalized(_)) => summary.finalized += 1,
                    Ok(PackageOutcome::Skipped(_)) => summary.skipped += 1,
                    Err(err) => {
                        error!("Failed to process {package}: {err:#}");
                        summary.failed += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Pulls the APK of a single package into the directory for its kind.
    pub fn process_package(&self, package: &str, kind: PackageKind) -> Result<PackageOutcome> {
        let remote_path = match adb::package_path(self.bridge, package) {
            Some(path) => path,
            None => {
                warn!("Failed to get APK path for {package}");
                return Ok(PackageOutcome::Skipped(SkipReason::PathUnresolved));
            }
        };

        let version = sanitize_filename(&adb::package_version(self.bridge, package));

        if let Some(ledger) = &self.ledger {
            if ledger.contains(package, &version).context("Checking ledger")? {
                info!("APK for {package} version {version} already downloaded. Skipping.");
                return Ok(PackageOutcome::Skipped(SkipReason::AlreadyDownloaded));
            }
        }

        let staged_path = self.config.dir_for(kind).join(format!("{package}.apk"));
        if !adb::pull(self.bridge, &remote_path, &staged_path) {
            warn!("Failed to download APK for {package}");
            return Ok(PackageOutcome::Skipped(SkipReason::TransferFailed));
        }

        let app_name = self
            .names
            .extract_app_name(&staged_path)
            .map(|name| sanitize_filename(&name))
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| package.to_string());

        let destination = finalize(&staged_path, &app_name, &version)?;

        if let Some(ledger) = &self.ledger {
            ledger
                .insert(&ApkRecord {
                    package_name: package.to_string(),
                    app_name,
                    version_name: version,
                    is_system_app: kind == PackageKind::System,
                    apk_path: destination.to_string_lossy().to_string(),
                })
                .context("Recording APK in ledger")?;
        }

        Ok(PackageOutcome::Finalized(destination))
    }
}

/// Moves a staged APK to `{app_name}-{version}.apk` in the same directory.
/// Gives an error, leaving the staged file in place, if a file already has that name.
pub fn finalize(staged_path: &Path, app_name: &str, version: &str) -> Result<PathBuf> {
    let file_name = format!(
        "{}-{}.apk",
        sanitize_filename(app_name),
        sanitize_filename(version)
    );
    let destination = staged_path.with_file_name(file_name);

    // `rename` silently replaces an existing file on Unix.
    if destination.symlink_metadata().is_ok() {
        return Err(anyhow!(
            "Cannot rename {}: {} already exists",
            staged_path.display(),
            destination.display()
        ));
    }

    std::fs::rename(staged_path, &destination).with_context(|| {
        format!(
            "Renaming {} to {}",
            staged_path.display(),
            destination.display()
        )
    })?;
    info!(
        "Successfully renamed {} to {}",
        staged_path.display(),
        destination.display()
    );

    Ok(destination)
}
