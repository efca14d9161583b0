// ABOUTME: Per-user location of roompoll's config file
// ABOUTME: Resolved through the platform's config directory, falling back to the working directory

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "roompoll";
const APPLICATION: &str = "roompoll";

/// Platform directories for roompoll, if a home directory can be found
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Directory holding roompoll's config; `.` when no home directory exists
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Last fallback consulted by `Config::find_config_file`
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
