//! A scripted stand-in for a connected device.

use std::{cell::RefCell, collections::HashMap};

use anyhow::{anyhow, Result};

use crate::adb::Bridge;

/// Answers commands from a script keyed by the space-joined arguments.
/// `pull` is served from a map of remote files, written to the requested local path.
/// Anything unscripted fails, as adb would for an unknown command.
#[derive(Default)]
pub struct MockBridge {
    responses: HashMap<String, Result<String, String>>,
    files: HashMap<String, Vec<u8>>,
    calls: RefCell<Vec<String>>,
}

impl MockBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &str, stdout: &str) -> Self {
        self.responses
            .insert(command.to_string(), Ok(stdout.trim().to_string()));
        self
    }

    pub fn fail(mut self, command: &str, stderr: &str) -> Self {
        self.responses
            .insert(command.to_string(), Err(stderr.to_string()));
        self
    }

    pub fn file(mut self, remote: &str, contents: &[u8]) -> Self {
        self.files.insert(remote.to_string(), contents.to_vec());
        self
    }

    /// Scripts `pm list packages` for both kinds of package.
    pub fn packages(self, user: &[&str], system: &[&str]) -> Self {
        let listing = |packages: &[&str]| {
            packages
                .iter()
                .map(|package| format!("package:{package}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        self.respond("shell pm list packages -3", &listing(user))
            .respond("shell pm list packages -s", &listing(system))
    }

    /// Scripts an installed package with its APK path, contents and (optionally) version.
    pub fn installed(self, package: &str, apk: &[u8], version: Option<&str>) -> Self {
        let remote = format!("/data/app/{package}-1/base.apk");
        let with_path = self
            .respond(&format!("shell pm path {package}"), &format!("package:{remote}"))
            .file(&remote, apk);

        match version {
            Some(version) => with_path.respond(
                &format!("shell dumpsys package {package}"),
                &format!("Packages:\n  Package [{package}]:\n    versionName={version}\n"),
            ),
            None => with_path,
        }
    }

    /// Every command invoked so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn pull_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.starts_with("pull "))
            .count()
    }
}

impl Bridge for MockBridge {
    fn invoke(&self, args: &[&str]) -> Result<String> {
        let command = args.join(" ");
        self.calls.borrow_mut().push(command.clone());

        if let ["pull", remote, local] = args {
            return match self.files.get(*remote) {
                Some(contents) => {
                    std::fs::write(local, contents)?;
                    Ok(format!(
                        "{remote}: 1 file pulled, 0 skipped. 0.1 MB/s ({} bytes in 0.001s)",
                        contents.len()
                    ))
                }
                None => Err(anyhow!(
                    "adb: error: failed to stat remote object '{remote}': No such file or directory"
                )),
            };
        }

        match self.responses.get(&command) {
            Some(Ok(stdout)) => Ok(stdout.clone()),
            Some(Err(stderr)) => Err(anyhow!("{stderr}")),
            None => Err(anyhow!("/system/bin/sh: unscripted command: {command}")),
        }
    }
}
