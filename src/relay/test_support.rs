//! Shell-script helpers for process tests.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use super::invocation::Invocation;
use super::process::ProcessRunner;
use crate::errors::SpawnError;

const ETXTBSY: i32 = 26;

/// Write an executable `/bin/sh` script into a fresh temp dir.
pub fn helper_script(body: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("helper.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    (dir, path)
}

/// Start a helper, retrying while another test thread still holds a write
/// handle to a freshly written script.
pub fn start_helper(invocation: &Invocation) -> ProcessRunner {
    for _ in 0..50 {
        match ProcessRunner::start(invocation) {
            Ok(runner) => return runner,
            Err(SpawnError::Spawn { source, .. }) if source.raw_os_error() == Some(ETXTBSY) => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("failed to start helper: {e}"),
        }
    }
    panic!("helper script stayed busy");
}

/// Whether `pid` names a live (non-zombie) process.
pub fn pid_exists(pid: u32) -> bool {
    let stat = PathBuf::from(format!("/proc/{pid}/stat"));
    if PathBuf::from("/proc/self/stat").exists() {
        return match std::fs::read_to_string(&stat) {
            // state is the first field after the parenthesised command name
            Ok(contents) => contents
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        };
    }
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None).is_ok()
}

/// Wait up to `limit` for `pid` to disappear.
pub async fn wait_for_exit(pid: u32, limit: Duration) -> bool {
    let deadline = std::time::Instant::now() + limit;
    while pid_exists(pid) {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}
