use std::path::{Path, PathBuf};

/// Fixed name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "hyprink.conf";

/// Returns the hyprink home directory, or None if no config directory can be resolved.
pub fn try_hyprink_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("HYPRINK_HOME") {
        return Some(PathBuf::from(val));
    }
    dirs::config_dir().map(|c| c.join("hyprink"))
}

/// Returns the hyprink home directory (`$HYPRINK_HOME` or `<config dir>/hyprink`).
///
/// Falls back to `.hyprink` in the working directory when the platform has
/// no notion of a config directory.
pub fn hyprink_home() -> PathBuf {
    try_hyprink_home().unwrap_or_else(|| PathBuf::from(".hyprink"))
}

/// Candidate config locations, most specific first:
/// `$HYPRINK_CONFIG`, `./hyprink.conf`, `<home>/hyprink.conf`.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);
    if let Ok(val) = std::env::var("HYPRINK_CONFIG") {
        candidates.push(PathBuf::from(val));
    }
    candidates.push(PathBuf::from(CONFIG_FILE_NAME));
    candidates.push(hyprink_home().join(CONFIG_FILE_NAME));
    candidates
}

/// Default install root: `<home>/installed`
pub fn default_install_root() -> PathBuf {
    hyprink_home().join("installed")
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parent directory usable as a sibling location for temp files.
///
/// `Path::parent` yields `""` for bare relative names; that maps to `.`.
pub fn parent_or_cwd(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
