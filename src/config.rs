//! Configuration for lamad-curriculum

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CurriculumError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lamad-curriculum")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database and config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Database file name inside `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Study hours per week used for completion estimates
    #[serde(default = "default_weekly_hours")]
    pub weekly_hours: f64,

    /// Take a snapshot before guarded reconciliations
    #[serde(default = "default_true")]
    pub backups_enabled: bool,

    /// Snapshots kept per user (0 = unlimited)
    #[serde(default = "default_backup_retention")]
    pub backup_retention: u32,
}

fn default_database_file() -> String {
    "curriculum.db".to_string()
}

fn default_weekly_hours() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_backup_retention() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            weekly_hours: default_weekly_hours(),
            backups_enabled: true,
            backup_retention: default_backup_retention(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CurriculumError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CurriculumError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CurriculumError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CurriculumError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that may also arrive from CLI overrides
    pub fn validate(&self) -> Result<(), CurriculumError> {
        if !self.weekly_hours.is_finite() || self.weekly_hours < 0.0 {
            return Err(CurriculumError::Config(format!(
                "weekly_hours must be a non-negative number, got {}",
                self.weekly_hours
            )));
        }
        if self.database_file.trim().is_empty() {
            return Err(CurriculumError::Config("database_file must not be empty".into()));
        }
        Ok(())
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("weekly_hours = 4.5").unwrap();
        assert_eq!(config.weekly_hours, 4.5);
        assert_eq!(config.database_file, "curriculum.db");
        assert!(config.backups_enabled);
        assert_eq!(config.backup_retention, 5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            storage_dir: dir.path().to_path_buf(),
            backups_enabled: false,
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(!loaded.backups_enabled);
        assert_eq!(loaded.database_path(), dir.path().join("curriculum.db"));
    }

    #[test]
    fn test_rejects_negative_weekly_hours() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "weekly_hours = -2.0").unwrap();

        assert!(matches!(Config::load(&path), Err(CurriculumError::Config(_))));
    }

    #[test]
    fn test_validate_catches_overridden_weekly_hours() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.weekly_hours = f64::NAN;
        assert!(matches!(config.validate(), Err(CurriculumError::Config(_))));

        config.weekly_hours = -1.0;
        assert!(matches!(config.validate(), Err(CurriculumError::Config(_))));
    }
}
