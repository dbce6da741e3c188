// ABOUTME: Locates the claude executable on this machine.
// ABOUTME: Checks an explicit path, CLAUDE_PATH, then the usual install locations.

use std::path::{Path, PathBuf};

/// Ordered list of places the claude binary may live.
///
/// `explicit` (from config) wins, then the `CLAUDE_PATH` environment variable,
/// then the per-user and system-wide install locations.
pub fn candidate_paths(explicit: Option<&str>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = explicit.filter(|p| !p.trim().is_empty()) {
        candidates.push(PathBuf::from(path));
    }
    if let Ok(env_path) = std::env::var("CLAUDE_PATH") {
        if !env_path.trim().is_empty() {
            candidates.push(PathBuf::from(env_path));
        }
    }

    let home = directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from));
    if let Some(home) = home {
        candidates.push(home.join(".local").join("bin").join("claude"));
        candidates.push(home.join(".claude").join("local").join("claude"));
    }

    candidates.push(PathBuf::from("/usr/local/bin/claude"));
    candidates.push(PathBuf::from("/usr/bin/claude"));
    candidates
}

/// First candidate that is an executable regular file
pub fn find_claude_cli(explicit: Option<&str>) -> Option<PathBuf> {
    candidate_paths(explicit)
        .into_iter()
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
