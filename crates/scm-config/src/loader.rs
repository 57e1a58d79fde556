//! Configuration loader with multi-source merging (§6)

use crate::{Paths, ScmConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir).
    pub fn new() -> Self {
        Self { project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")), env_prefix: "SCM".to_string() }
    }

    /// Set the project (storage-root) directory.
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "SCM").
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources with proper precedence.
    pub fn load(self) -> Result<ScmConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults.
        let defaults = ScmConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/scm/config.toml).
        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder
                    .add_source(config::File::from(user_config_file).required(false).format(config::FileFormat::Toml));
            }
        }

        // 3. Project config (scm.toml).
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder
                .add_source(config::File::from(project_config_file).required(false).format(config::FileFormat::Toml));
        }

        // 4. Local config (scm.local.toml, gitignored).
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder
                .add_source(config::File::from(local_config_file).required(false).format(config::FileFormat::Toml));
        }

        // 5. Environment variables (SCM_*).
        builder =
            builder.add_source(config::Environment::with_prefix(&self.env_prefix).separator("_").try_parsing(true));

        let config = builder.build().context("failed to build configuration")?;

        let mut scm_config: ScmConfig = config.try_deserialize().context("failed to deserialize configuration")?;

        scm_config.resolve_paths(&self.project_dir);

        Ok(scm_config)
    }

    /// Load configuration or return defaults if not found.
    pub fn load_or_default(self) -> ScmConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_when_no_config_file_present() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config = ConfigLoader::new().with_project_dir(temp_dir.path()).load().expect("failed to load config");

        assert_eq!(config.heartbeat.stale_after_secs, 30);
        assert_eq!(config.replication.replication_factor, 3);
    }

    #[test]
    fn project_config_overrides_defaults() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[heartbeat]
stale_after_secs = 45
dead_after_secs = 180

[safe_mode]
container_threshold = 0.95
"#;
        fs::write(project_dir.join("scm.toml"), config_content).expect("failed to write config");

        let config = ConfigLoader::new().with_project_dir(project_dir).load().expect("failed to load config");

        assert_eq!(config.heartbeat.stale_after_secs, 45);
        assert_eq!(config.heartbeat.dead_after_secs, 180);
        assert_eq!(config.safe_mode.container_threshold, 0.95);
    }

    #[test]
    fn local_config_overrides_project_config() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("scm.toml"),
            r#"
[heartbeat]
stale_after_secs = 30
"#,
        )
        .expect("failed to write project config");

        fs::write(
            project_dir.join("scm.local.toml"),
            r#"
[heartbeat]
stale_after_secs = 5
"#,
        )
        .expect("failed to write local config");

        let config = ConfigLoader::new().with_project_dir(project_dir).load().expect("failed to load config");

        assert_eq!(config.heartbeat.stale_after_secs, 5);
    }

    #[test]
    fn relative_data_dir_is_resolved_to_an_absolute_path() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let project_dir = temp_dir.path();

        let config = ConfigLoader::new().with_project_dir(project_dir).load().expect("failed to load config");

        assert!(config.node.data_dir.is_absolute());
    }
}
