use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use volumes_core::config::VolumesConfig;

const CONFIG_FILE: &str = "volumes.toml";

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("volumes")
        .join(CONFIG_FILE)
}

/// Loads `explicit` if given, otherwise the per-user config file. Only the
/// per-user file may be absent, in which case the built-in volumes are used.
pub fn load(explicit: Option<&Path>) -> Result<VolumesConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_path();
            if !path.exists() {
                debug!(path = %path.display(), "no config file, using built-in volumes");
                return Ok(VolumesConfig::default());
            }
            path
        }
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("config not found at {}", path.display()))?;
    let config = VolumesConfig::from_toml(&content)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    debug!(path = %path.display(), volumes = config.volumes.len(), "loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "default_volume = \"work\"\n\n[volumes.work]\nprotocol = \"fs\"\nroot = \"/srv/work\"\n",
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.default_volume.as_deref(), Some("work"));
        assert!(config.volumes.contains_key("work"));
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("config not found"));
    }

    #[test]
    fn rejects_unknown_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[volumes.x]\nprotocol = \"ftp\"\n").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
