//! Recursively copies a folder on the device to the local machine, keeping its layout.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use const_format::formatcp;
use log::{error, info, warn};

use crate::adb::{self, Bridge};

pub const EXTERNAL_STORAGE: &str = "/storage/emulated/0";
pub const DEFAULT_REMOTE_FOLDER: &str = formatcp!("{EXTERNAL_STORAGE}/Download");
pub const DEFAULT_MIRROR_DIR: &str = "downloaded_files";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorSummary {
    pub pulled: usize,
    pub failed: usize,
}

/// Pulls every regular file below `remote_root` into the same relative location below `local_root`.
/// A failed listing gives an empty summary, a failed file is logged and the rest are still pulled.
pub fn mirror_folder(
    bridge: &impl Bridge,
    remote_root: &str,
    local_root: &Path,
) -> Result<MirrorSummary> {
    std::fs::create_dir_all(local_root)
        .with_context(|| format!("Creating mirror directory {}", local_root.display()))?;

    let mut summary = MirrorSummary::default();
    let files = match adb::list_files(bridge, remote_root) {
        Some(files) => files,
        None => {
            error!("Failed to list files in {remote_root}");
            return Ok(summary);
        }
    };
    info!("Found {} files in {remote_root}", files.len());

    for remote_file in files {
        let relative = match relative_remote_path(remote_root, &remote_file) {
            Some(relative) => relative,
            None => {
                warn!("Skipping {remote_file}: not a file below {remote_root}");
                summary.failed += 1;
                continue;
            }
        };

        let local_file = local_root.join(relative);
        if let Some(parent) = local_file.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                error!("Failed to create {}: {err}", parent.display());
                summary.failed += 1;
                continue;
            }
        }

        if adb::pull(bridge, &remote_file, &local_file) {
            info!("Pulled: {remote_file} -> {}", local_file.display());
            summary.pulled += 1;
        } else {
            error!("Failed to pull: {remote_file}");
            summary.failed += 1;
        }
    }

    info!(
        "Mirrored {} files from {remote_root} ({} failed)",
        summary.pulled, summary.failed
    );
    Ok(summary)
}

/// Gets the path of `remote_file` relative to `remote_root`, as a local path.
/// Returns None if the file is not below the root, or the result would escape it.
pub fn relative_remote_path(remote_root: &str, remote_file: &str) -> Option<PathBuf> {
    let root = remote_root.trim_end_matches('/');
    let rest = remote_file.strip_prefix(root)?.strip_prefix('/')?;

    let mut relative = PathBuf::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            part => relative.push(part),
        }
    }

    // Guard against anything `push` could treat as absolute or as a prefix.
    let escapes = relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)));
    if relative.as_os_str().is_empty() || escapes {
        None
    } else {
        Some(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBridge;

    const ROOT: &str = "/storage/emulated/0/Download";

    #[test]
    fn default_folder_is_downloads() {
        assert_eq!(DEFAULT_REMOTE_FOLDER, "/storage/emulated/0/Download");
    }

    #[test]
    fn mirrors_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let local_root = dir.path().join(DEFAULT_MIRROR_DIR);
        let bridge = MockBridge::new()
            .respond(
                &format!("shell find '{ROOT}' -type f"),
                &format!("{ROOT}/a/b.txt\n{ROOT}/c.txt\n"),
            )
            .file(&format!("{ROOT}/a/b.txt"), b"b")
            .file(&format!("{ROOT}/c.txt"), b"c");

        let summary = mirror_folder(&bridge, ROOT, &local_root).unwrap();
        assert_eq!(summary, MirrorSummary { pulled: 2, failed: 0 });
        assert_eq!(std::fs::read(local_root.join("a").join("b.txt")).unwrap(), b"b");
        assert_eq!(std::fs::read(local_root.join("c.txt")).unwrap(), b"c");
    }

    #[test]
    fn failed_file_does_not_stop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = MockBridge::new()
            .respond(
                &format!("shell find '{ROOT}' -type f"),
                &format!("{ROOT}/gone.txt\n{ROOT}/kept.txt"),
            )
            .file(&format!("{ROOT}/kept.txt"), b"kept");

        let summary = mirror_folder(&bridge, ROOT, dir.path()).unwrap();
        assert_eq!(summary, MirrorSummary { pulled: 1, failed: 1 });
        assert!(dir.path().join("kept.txt").is_file());
        assert!(!dir.path().join("gone.txt").exists());
    }

    #[test]
    fn failed_listing_pulls_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let local_root = dir.path().join("out");
        let bridge = MockBridge::new().fail(
            &format!("shell find '{ROOT}' -type f"),
            "find: '/storage/emulated/0/Download': No such file or directory",
        );

        let summary = mirror_folder(&bridge, ROOT, &local_root).unwrap();
        assert_eq!(summary, MirrorSummary::default());
        assert!(local_root.is_dir());
        assert_eq!(bridge.pull_count(), 0);
    }

    #[test]
    fn refuses_to_escape_local_root() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = MockBridge::new()
            .respond(
                &format!("shell find '{ROOT}' -type f"),
                &format!("{ROOT}/../secret.txt\n/other/file.txt"),
            )
            .file(&format!("{ROOT}/../secret.txt"), b"secret");

        let summary = mirror_folder(&bridge, ROOT, &dir.path().join("out")).unwrap();
        assert_eq!(summary, MirrorSummary { pulled: 0, failed: 2 });
        assert_eq!(bridge.pull_count(), 0);
        assert!(!dir.path().join("secret.txt").exists());
    }

    #[test]
    fn relative_paths() {
        assert_eq!(
            relative_remote_path("/sdcard/Download/", "/sdcard/Download/a/b.txt"),
            Some(PathBuf::from("a").join("b.txt"))
        );
        assert_eq!(
            relative_remote_path("/sdcard/Download", "/sdcard/Download//./c.txt"),
            Some(PathBuf::from("c.txt"))
        );
        assert_eq!(relative_remote_path("/sdcard/Download", "/sdcard/Downloads/c.txt"), None);
        assert_eq!(relative_remote_path("/sdcard/Download", "/sdcard/Download"), None);
        assert_eq!(relative_remote_path("/sdcard/Download", "/sdcard/Download/a/../../b"), None);
    }
}
