//! Path utilities and XDG directory discovery, plus the on-disk `VERSION`
//! file (§6) at the storage root.

use crate::ConfigError;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

use scm_types::VersionFile;

/// XDG-compliant paths for the Storage Container Manager.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    /// Create a new `Paths` instance with XDG discovery.
    pub fn new() -> Self {
        Self { project_dirs: ProjectDirs::from("com", "scm", "scm") }
    }

    /// Get user config directory (`~/.config/scm/`).
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::XdgError("failed to determine user config directory".to_string()))
    }

    /// Get user cache directory (`~/.cache/scm/`).
    pub fn user_cache_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.cache_dir().to_path_buf())
            .ok_or_else(|| ConfigError::XdgError("failed to determine user cache directory".to_string()))
    }

    /// Get user config file path (`~/.config/scm/config.toml`).
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// Get project config file path (`scm.toml`).
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("scm.toml")
    }

    /// Get local config file path (`scm.local.toml`, gitignored).
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("scm.local.toml")
    }

    /// Get `.scm` state directory under the storage root.
    pub fn state_dir(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(".scm")
    }

    /// Get the KV store's directory, a sibling of the `VERSION` file
    /// (§6 "The KV store lives at a sibling directory per node-type").
    pub fn kv_store_dir(storage_root: impl AsRef<Path>) -> PathBuf {
        storage_root.as_ref().join("scm").join("current")
    }

    /// Get the on-disk `VERSION` file path at the storage root (§6).
    pub fn version_file(storage_root: impl AsRef<Path>) -> PathBuf {
        storage_root.as_ref().join("scm").join("VERSION")
    }

    /// Check if a project is initialized (has `scm.toml`).
    pub fn is_initialized(project_dir: impl AsRef<Path>) -> bool {
        Self::project_config_file(project_dir).exists()
    }

    /// Reads and parses the `VERSION` file at `storage_root`, if present
    /// (§6: "Absence of the file on a fresh install triggers
    /// initialization").
    pub fn read_version_file(storage_root: impl AsRef<Path>) -> Result<Option<VersionFile>, ConfigError> {
        let path = Self::version_file(&storage_root);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigError::ReadError { path: path.clone(), source })?;
        VersionFile::parse(&contents).map(Some).map_err(ConfigError::ValidationError)
    }

    /// Writes `version` to the `VERSION` file at `storage_root`, creating
    /// the parent directory if needed.
    pub fn write_version_file(storage_root: impl AsRef<Path>, version: &VersionFile) -> Result<(), ConfigError> {
        let path = Self::version_file(&storage_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::ReadError { path: path.clone(), source })?;
        }
        fs::write(&path, version.serialize()).map_err(|source| ConfigError::ReadError { path, source })
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn xdg_paths_do_not_panic() {
        let paths = Paths::new();

        if let Ok(config_dir) = paths.user_config_dir() {
            assert!(config_dir.to_string_lossy().contains("scm"));
        }

        if let Ok(cache_dir) = paths.user_cache_dir() {
            assert!(cache_dir.to_string_lossy().contains("scm"));
        }
    }

    #[test]
    fn project_paths_are_anchored_under_the_project_dir() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_file = Paths::project_config_file(project_dir);
        assert_eq!(config_file, project_dir.join("scm.toml"));

        let local_file = Paths::local_config_file(project_dir);
        assert_eq!(local_file, project_dir.join("scm.local.toml"));

        let state_dir = Paths::state_dir(project_dir);
        assert_eq!(state_dir, project_dir.join(".scm"));

        assert!(!Paths::is_initialized(project_dir));
        std::fs::write(&config_file, "[node]\n").unwrap();
        assert!(Paths::is_initialized(project_dir));
    }

    #[test]
    fn version_file_round_trips_through_read_and_write() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let storage_root = temp_dir.path();

        assert!(Paths::read_version_file(storage_root).unwrap().is_none());

        let version = VersionFile::fresh("SCM", 1_700_000_000_000, 1);
        Paths::write_version_file(storage_root, &version).unwrap();

        let read_back = Paths::read_version_file(storage_root).unwrap().unwrap();
        assert_eq!(read_back, version);
    }

    #[test]
    fn crashed_mid_upgrade_survives_a_round_trip() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let storage_root = temp_dir.path();

        let mut version = VersionFile::fresh("SCM", 0, 1);
        version.upgrading_to_layout_version = Some(2);
        Paths::write_version_file(storage_root, &version).unwrap();

        let read_back = Paths::read_version_file(storage_root).unwrap().unwrap();
        assert!(read_back.crashed_mid_upgrade());
    }
}
