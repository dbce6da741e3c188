// ABOUTME: XDG Base Directory paths for config, data, and logs
// ABOUTME: Data dir may be overridden by configuration; these are the fallbacks

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "jarvis";
const APPLICATION: &str = "jarvis";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Default data directory (e.g., ~/.local/share/jarvis/)
/// Falls back to ./data if XDG directories unavailable
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Log directory inside a data directory
pub fn log_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("logs")
}

/// SQLite database inside a data directory
pub fn database_file(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("jarvis.db")
}

/// Config directory (e.g., ~/.config/jarvis/)
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn files_live_under_data_dir() {
        let base = Path::new("/var/lib/jarvis");
        assert_eq!(log_dir(base), PathBuf::from("/var/lib/jarvis/logs"));
        assert_eq!(database_file(base), PathBuf::from("/var/lib/jarvis/jarvis.db"));
    }

    #[test]
    fn config_file_is_toml() {
        assert!(config_file().ends_with("config.toml"));
    }
}
