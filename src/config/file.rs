//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::env::EnvConfig;
use super::AppConfig;
use crate::models::Catalog;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./rpc-harness.yaml",
    "./rpc-harness.yml",
    "./.rpc-harness.yaml",
    "~/.config/rpc-harness/config.yaml",
];

/// Full configuration file structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Application settings
    #[serde(default)]
    pub app: AppConfig,

    /// Test catalog; the built-in suite when absent
    #[serde(default)]
    pub catalog: Catalog,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            catalog: Catalog::default(),
        }
    }
}

impl ConfigFile {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::find() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from an explicit path, the environment's path, or the default locations
    pub fn resolve(explicit: Option<&Path>, env: &EnvConfig) -> Result<Self> {
        match explicit
            .map(Path::to_path_buf)
            .or_else(|| env.config_file.as_ref().map(PathBuf::from))
        {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !["1.0", "1.1"].contains(&self.version.as_str()) {
            anyhow::bail!("Unsupported config version: {}", self.version);
        }

        if self.app.parallel < 1 {
            anyhow::bail!("parallel must be at least 1, got {}", self.app.parallel);
        }

        if self.app.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than 0");
        }

        let mut seen = std::collections::HashSet::new();
        for spec in self.catalog.all() {
            if !seen.insert(spec.to_string()) {
                anyhow::bail!("Duplicate catalog entry: {spec}");
            }
        }

        Ok(())
    }

    /// Apply environment overrides on top of the file values
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(src_dir) = &env.src_dir {
            self.app.src_dir = PathBuf::from(src_dir);
        }
        if let Some(build_dir) = &env.build_dir {
            self.app.build_dir = PathBuf::from(build_dir);
        }
        if let Some(tests_dir) = &env.tests_dir {
            self.app.tests_dir = Some(PathBuf::from(tests_dir));
        }
        if let Some(parallel) = env.parallel {
            self.app.parallel = parallel;
        }
        if let Some(level) = &env.log_level {
            self.app.log_level = level.clone();
        }
    }

    /// Generate example configuration
    pub fn example() -> Self {
        Self {
            version: "1.0".to_string(),
            app: AppConfig {
                src_dir: PathBuf::from("."),
                build_dir: PathBuf::from("./build"),
                parallel: 8,
                ..AppConfig::default()
            },
            catalog: Catalog::default(),
        }
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestSpec;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_default() {
        let config = ConfigFile::default();
        assert_eq!(config.version, "1.0");
        assert!(config.catalog.len() > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_save_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let config = ConfigFile::example();
        config.save(&path).unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.version, config.version);
        assert_eq!(loaded.app.parallel, 8);
        assert_eq!(loaded.catalog, config.catalog);
    }

    #[test]
    fn test_config_file_save_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        ConfigFile::example().save(&path).unwrap();
        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.app.build_dir, PathBuf::from("./build"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.yml");
        std::fs::write(
            &path,
            "app:\n  parallel: 2\ncatalog:\n  basic:\n    - only.py --fast\n",
        )
        .unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.app.parallel, 2);
        assert_eq!(config.app.capture_grace_secs, 10);
        assert_eq!(
            config.catalog.basic,
            vec![TestSpec::new("only.py").with_arg("--fast")]
        );
        assert!(config.catalog.extended.is_empty());
    }

    #[test]
    fn test_validate_config() {
        let mut config = ConfigFile::default();
        config.app.parallel = 0;
        assert!(config.validate().is_err());

        let mut config = ConfigFile::default();
        config.version = "9.9".to_string();
        assert!(config.validate().is_err());

        let mut config = ConfigFile::default();
        config.catalog.extended.push(config.catalog.basic[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = ConfigFile::default();
        let env = EnvConfig {
            parallel: Some(12),
            tests_dir: Some("/suite".to_string()),
            ..Default::default()
        };
        config.apply_env(&env);
        assert_eq!(config.app.parallel, 12);
        assert_eq!(config.app.tests_dir(), PathBuf::from("/suite"));
        assert_eq!(config.app.src_dir, PathBuf::from("."));
    }

    #[test]
    fn test_resolve_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("explicit.yaml");
        std::fs::write(&path, "app:\n  parallel: 3\n").unwrap();

        let config = ConfigFile::resolve(Some(&path), &EnvConfig::default()).unwrap();
        assert_eq!(config.app.parallel, 3);
    }

    #[test]
    fn test_expand_path() {
        let path = expand_path("./test.yaml");
        assert_eq!(path, PathBuf::from("./test.yaml"));
    }
}
