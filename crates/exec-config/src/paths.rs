use std::path::PathBuf;

/// Default `config.toml` location, resolved via the platform config
/// directory rather than a hardcoded path.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "execd")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default directory for rotating server logs.
pub fn default_log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "execd").map(|dirs| {
        dirs.state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .join("logs")
    })
}

/// Default path for the append-only `TimingRecord` sidecar log.
pub fn default_timing_log_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "execd")
        .map(|dirs| dirs.data_local_dir().join("timing-history.jsonl"))
}
