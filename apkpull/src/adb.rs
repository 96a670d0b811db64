//! Utilities for interacting with the Android Debug Bridge in order to pull apps and files from a device.
//! Every query is a single invocation of the adb executable followed by parsing of its output.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{anyhow, Context, Result};
use log::warn;

#[cfg(windows)]
pub const ADB_EXE_PATH: &str = "adb.exe";

#[cfg(not(windows))]
pub const ADB_EXE_PATH: &str = "adb";

/// Version used when the device does not report one for a package.
pub const UNKNOWN_VERSION: &str = "unknown";

const PACKAGE_PREFIX: &str = "package:";
const VERSION_NAME_KEY: &str = "versionName=";
// Printed by `adb pull` on success, e.g. `/sdcard/a.txt: 1 file pulled, 0 skipped.`
const PULL_SUCCESS_MARKER: &str = "pulled";

/// Something that can run the device bridge tool with a list of arguments.
pub trait Bridge {
    /// Invokes the tool, returning its trimmed standard output.
    /// Gives an error if the tool could not be started or exited with a non-zero code.
    fn invoke(&self, args: &[&str]) -> Result<String>;
}

/// Invokes an adb executable directly, without a host shell.
pub struct Adb {
    exe_path: PathBuf,
}

impl Adb {
    pub fn new(exe_path: impl Into<PathBuf>) -> Self {
        Self {
            exe_path: exe_path.into(),
        }
    }
}

impl Default for Adb {
    fn default() -> Self {
        Self::new(ADB_EXE_PATH)
    }
}

impl Bridge for Adb {
    fn invoke(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.exe_path)
            .args(args)
            .output()
            .with_context(|| format!("Invoking ADB executable at {}", self.exe_path.display()))?;

        if output.status.success() {
            Ok(get_trimmed_string(&output.stdout))
        } else {
            Err(anyhow!(
                "Invoked ADB and got non-zero exit code ({}). stderr: {}, stdout: {}",
                output.status,
                get_trimmed_string(&output.stderr),
                get_trimmed_string(&output.stdout),
            ))
        }
    }
}

fn get_trimmed_string(from: &[u8]) -> String {
    String::from_utf8_lossy(from).trim().to_string()
}

/// Runs a command, logging the reason and giving `None` if it fails.
pub fn run_command(bridge: &impl Bridge, args: &[&str]) -> Option<String> {
    match bridge.invoke(args) {
        Ok(stdout) => Some(stdout),
        Err(err) => {
            warn!("Command failed: adb {}", args.join(" "));
            warn!("Error: {err:#}");
            None
        }
    }
}

/// Quotes an argument for the shell on the device.
/// `adb shell` joins its arguments with spaces, so paths containing spaces or quotes must be escaped.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Which set of installed packages to list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PackageKind {
    /// Installed by the user (third party)
    User,
    /// Part of the system image
    System,
}

impl PackageKind {
    fn list_flag(self) -> &'static str {
        match self {
            PackageKind::User => "-3",
            PackageKind::System => "-s",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            PackageKind::User => "user",
            PackageKind::System => "system",
        }
    }
}

/// Lists the IDs of the installed packages of the given kind, in the order the device reports them.
pub fn list_packages(bridge: &impl Bridge, kind: PackageKind) -> Vec<String> {
    let output = match run_command(bridge, &["shell", "pm", "list", "packages", kind.list_flag()]) {
        Some(output) => output,
        None => return Vec::new(),
    };

    output
        .lines()
        .map(|line| line.trim().replace(PACKAGE_PREFIX, ""))
        .filter(|package| !package.is_empty())
        .collect()
}

/// Gets the on-device path of the base APK of the package with the given ID.
/// Returns None if the device gives no path for it.
pub fn package_path(bridge: &impl Bridge, package_id: &str) -> Option<String> {
    let output = run_command(bridge, &["shell", "pm", "path", package_id])?;

    // Split APKs give one line per APK, the base APK is listed first.
    output.lines().find_map(|line| {
        let path_idx = line.find(PACKAGE_PREFIX)? + PACKAGE_PREFIX.len();
        Some(line[path_idx..].trim().to_string()).filter(|path| !path.is_empty())
    })
}

/// Gets the version name of the package with the given ID as reported by `dumpsys`.
/// Returns UNKNOWN_VERSION if no version is reported.
pub fn package_version(bridge: &impl Bridge, package_id: &str) -> String {
    run_command(bridge, &["shell", "dumpsys", "package", package_id])
        .and_then(|output| {
            output.lines().find_map(|line| {
                let version_idx = line.find(VERSION_NAME_KEY)? + VERSION_NAME_KEY.len();
                // Trim to remove carriage return (`\r`)
                Some(line[version_idx..].trim().to_string()).filter(|version| !version.is_empty())
            })
        })
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

/// Copies the file at `remote` on the device to `local`.
/// Returns true only if adb reported that the file was pulled.
pub fn pull(bridge: &impl Bridge, remote: &str, local: &Path) -> bool {
    let local = local.to_string_lossy();
    match run_command(bridge, &["pull", remote, &local]) {
        Some(output) => output.contains(PULL_SUCCESS_MARKER),
        None => false,
    }
}

/// Lists the paths of all regular files below `remote_dir` on the device, recursively.
/// Returns None if the listing failed.
pub fn list_files(bridge: &impl Bridge, remote_dir: &str) -> Option<Vec<String>> {
    let quoted_dir = shell_quote(remote_dir);
    let output = run_command(bridge, &["shell", "find", &quoted_dir, "-type", "f"])?;

    Some(
        output
            .lines()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
