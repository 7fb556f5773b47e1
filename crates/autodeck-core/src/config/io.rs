//! YAML file helpers shared by every config type
//!
//! The session config and the MIDI mapping profile in `autodeck-midi` both
//! go through these. A missing or broken file never stops the program: the
//! lenient loader logs and falls back to `Default`.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Read and parse a YAML file
///
/// `Ok(None)` when the file does not exist. Read and parse failures are
/// errors carrying the path.
pub fn try_load_config<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Cannot read {:?}", path))?;
    let parsed = serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Cannot parse {:?}", path))?;
    Ok(Some(parsed))
}

/// Lenient load: defaults for a missing file, defaults plus a warning for a
/// file that cannot be read or parsed
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match try_load_config(path) {
        Ok(Some(config)) => {
            log::info!("load_config: Loaded {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("load_config: No file at {:?}, using defaults", path);
            T::default()
        }
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Serialize to YAML and write it, creating missing parent directories
///
/// The file is written next to its destination first and then renamed, so a
/// crash mid-write leaves the previous file intact.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {:?}", dir))?;
    }

    let yaml = serde_yaml::to_string(config).context("Cannot serialize config")?;
    let staging = path.with_extension("yaml.partial");
    std::fs::write(&staging, yaml).with_context(|| format!("Cannot write {:?}", staging))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("Cannot move {:?} into place", staging))?;

    log::info!("save_config: Wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        level: i32,
        label: String,
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/nonexistent/autodeck/sample.yaml");
        assert!(try_load_config::<Sample>(path).unwrap().is_none());
        assert_eq!(load_config::<Sample>(path), Sample::default());
    }

    #[test]
    fn test_broken_file_is_error_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "level: [not, a, number").unwrap();

        let err = try_load_config::<Sample>(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.yaml"));
        assert_eq!(load_config::<Sample>(&path), Sample::default());
    }

    #[test]
    fn test_save_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/sample.yaml");
        let sample = Sample {
            level: 7,
            label: "seven".into(),
        };

        save_config(&sample, &path).unwrap();
        assert!(!path.with_extension("yaml.partial").exists());
        assert_eq!(load_config::<Sample>(&path), sample);
    }
}
