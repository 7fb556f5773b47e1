//! Standard locations for autodeck files

use std::path::PathBuf;

/// Get the default config file path
///
/// Returns: `~/.config/autodeck/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("autodeck")
        .join(filename)
}

/// Get the default data directory (catalog, session reports)
///
/// Returns: `~/.local/share/autodeck` (platform equivalent elsewhere)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("autodeck")
}
