//! Pipeline configuration
//!
//! Storage locations, ingest rules, model hyperparameters and the HTTP bind
//! address. Every field has a default so an empty TOML file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{NUMBER_MAX, NUMBER_MIN, WINDOW_SIZE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl PipelineConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `LOTO_CONFIG_PATH` (or `loto.toml`), then apply env overrides.
    pub fn from_env() -> Self {
        let path = std::env::var("LOTO_CONFIG_PATH").unwrap_or_else(|_| "loto.toml".to_string());

        let mut config = Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default pipeline config ({}): {}", path, e);
            Self::default()
        });
        config.apply_env_overrides();
        config
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = non_empty_env("LOTO_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(db) = non_empty_env("LOTO_DB_PATH") {
            self.storage.database_file = db;
        }
        if let Some(addr) = non_empty_env("LOTO_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
    }

    /// Point all storage at `dir`, keeping the configured file names.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.data_dir = dir.into();
        self
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// File locations. Relative file names resolve against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Table holding the historical draws
    #[serde(default = "default_table")]
    pub table: String,

    /// Current prediction slot (overwritten on every retrain)
    #[serde(default = "default_prediction_file")]
    pub prediction_file: String,

    /// Prediction history journal
    #[serde(default = "default_history_file")]
    pub history_file: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_database_file() -> String {
    "loto_data.db".to_string()
}

fn default_table() -> String {
    "loto_draws".to_string()
}

fn default_prediction_file() -> String {
    "predictie_ml_rf_20draws.json".to_string()
}

fn default_history_file() -> String {
    "istoric_predictii_ml.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            table: default_table(),
            prediction_file: default_prediction_file(),
            history_file: default_history_file(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database_file)
    }

    pub fn prediction_path(&self) -> PathBuf {
        self.resolve(&self.prediction_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.resolve(&self.history_file)
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let p = PathBuf::from(name);
        if p.is_absolute() {
            p
        } else {
            self.data_dir.join(p)
        }
    }
}

/// Batch validation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// chrono formats tried in order for the date column
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,

    /// Reject numbers outside `[number_min, number_max]`
    #[serde(default)]
    pub enforce_number_domain: bool,

    #[serde(default = "default_number_min")]
    pub number_min: i64,

    #[serde(default = "default_number_max")]
    pub number_max: i64,
}

fn default_date_formats() -> Vec<String> {
    ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_number_min() -> i64 {
    NUMBER_MIN
}

fn default_number_max() -> i64 {
    NUMBER_MAX
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            date_formats: default_date_formats(),
            enforce_number_domain: false,
            number_min: NUMBER_MIN,
            number_max: NUMBER_MAX,
        }
    }
}

/// Rolling predictor and forest hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Seed shared by every per-position model
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub max_depth: Option<usize>,
}

fn default_window_size() -> usize {
    WINDOW_SIZE
}

fn default_n_estimators() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            n_estimators: default_n_estimators(),
            seed: default_seed(),
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.model.window_size, 20);
        assert_eq!(config.model.seed, 42);
        assert_eq!(config.storage.table, "loto_draws");
        assert!(!config.ingest.enforce_number_domain);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let parsed: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(parsed.model.n_estimators, 100);
        assert_eq!(parsed.ingest.date_formats.len(), 4);
    }

    #[test]
    fn test_partial_toml_section() {
        let parsed: PipelineConfig = toml::from_str(
            r#"
            [ingest]
            enforce_number_domain = true

            [storage]
            data_dir = "/var/lib/loto"
            "#,
        )
        .unwrap();
        assert!(parsed.ingest.enforce_number_domain);
        assert_eq!(parsed.ingest.number_max, 49);
        assert_eq!(
            parsed.storage.database_path(),
            PathBuf::from("/var/lib/loto/loto_data.db")
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loto.toml");
        let mut config = PipelineConfig::default();
        config.model.seed = 7;
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.model.seed, 7);
    }

    #[test]
    fn test_absolute_file_names_ignore_data_dir() {
        let mut storage = StorageConfig::default();
        storage.data_dir = PathBuf::from("/data");
        storage.history_file = "/elsewhere/history.json".to_string();
        assert_eq!(storage.history_path(), PathBuf::from("/elsewhere/history.json"));
        assert_eq!(
            storage.prediction_path(),
            PathBuf::from("/data/predictie_ml_rf_20draws.json")
        );
    }
}
