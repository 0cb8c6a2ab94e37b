//! Application configuration.
//!
//! A small TOML file at `~/.config/gitfleet/config.toml` supplying
//! manifest-independent defaults — the Rust-native analogue of the
//! manifest's `<default sync-j="...">` attribute, since this crate has no
//! manifest XML parser. CLI flags always win over these defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GitfleetConfig {
    #[serde(default)]
    pub jobs: Option<u64>,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub auto_gc: bool,
}

impl GitfleetConfig {
    /// Load from the default user config path, falling back to defaults
    /// when the file is absent, unreadable, or malformed.
    pub fn load_default() -> Self {
        match default_config_path() {
            Some(path) => Self::load(&path),
            None => Self::default(),
        }
    }

    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| toml::from_str(&contents).ok())
            .unwrap_or_default()
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gitfleet").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = GitfleetConfig::load(&dir.path().join("absent.toml"));
        assert_eq!(config, GitfleetConfig::default());
    }

    #[test]
    fn test_parses_jobs_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "jobs = 12\nfail_fast = true\nauto_gc = true\n").unwrap();
        let config = GitfleetConfig::load(&path);
        assert_eq!(config.jobs, Some(12));
        assert!(config.fail_fast);
        assert!(config.auto_gc);
    }

    #[test]
    fn test_malformed_toml_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid toml").unwrap();
        let config = GitfleetConfig::load(&path);
        assert_eq!(config, GitfleetConfig::default());
    }
}
