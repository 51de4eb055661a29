//! Run configuration: `etl.toml`, environment overrides, then CLI flags.

use crate::error::{EtlError, Result};
use crate::jobs::JobKind;
use crate::load::ConflictPolicy;
use crate::normalize::MappingPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "etl.toml";
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Destination database settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// SQLite database file (`:memory:` for a throwaway database)
    pub path: PathBuf,
    /// Schema tables are qualified with; anything but `main` attaches `path` under this name
    pub schema: String,
    /// Create declared tables that do not exist yet
    pub create_tables: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("warehouse.db"),
            schema: "main".to_string(),
            create_tables: true,
        }
    }
}

impl WarehouseConfig {
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }
}

/// Per-job settings. Unset fields fall back to the job's own defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub input: Option<PathBuf>,
    pub encoding: Option<String>,
    pub on_conflict: ConflictPolicy,
    pub batch_size: Option<usize>,
    pub enabled: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input: None,
            encoding: None,
            on_conflict: ConflictPolicy::default(),
            batch_size: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub customer: JobConfig,
    pub transaction: JobConfig,
    pub event: JobConfig,
    pub reviews: JobConfig,
}

impl JobsConfig {
    pub fn get(&self, kind: JobKind) -> &JobConfig {
        match kind {
            JobKind::Customer => &self.customer,
            JobKind::Transaction => &self.transaction,
            JobKind::Event => &self.event,
            JobKind::Reviews => &self.reviews,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Rows per insert statement
    pub batch_size: usize,
    pub mapping_policy: MappingPolicy,
    /// Where staging CSVs and the run summary go; nothing is written when unset
    pub staging_dir: Option<PathBuf>,
    /// Rows shown in debug previews of each frame
    pub preview_rows: usize,
    pub warehouse: WarehouseConfig,
    pub jobs: JobsConfig,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            mapping_policy: MappingPolicy::default(),
            staging_dir: None,
            preview_rows: 5,
            warehouse: WarehouseConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

impl EtlConfig {
    /// Load from `path`, or from `etl.toml` when present, or fall back to defaults,
    /// then apply environment overrides. Callers validate once CLI flags are merged.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                if !p.is_file() {
                    return Err(EtlError::Config(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                Self::from_file(p)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                info!("no {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)
            .map_err(|e| EtlError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `ETL_*` overrides from `lookup` (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("ETL_WAREHOUSE_PATH") {
            self.warehouse.path = PathBuf::from(path);
        }
        if let Some(schema) = lookup("ETL_WAREHOUSE_SCHEMA") {
            self.warehouse.schema = schema;
        }
        if let Some(size) = lookup("ETL_BATCH_SIZE") {
            self.batch_size = size
                .trim()
                .parse()
                .map_err(|_| EtlError::Config(format!("ETL_BATCH_SIZE is not a number: {}", size)))?;
        }
        if let Some(dir) = lookup("ETL_STAGING_DIR") {
            self.staging_dir = Some(PathBuf::from(dir));
        }
        if let Some(policy) = lookup("ETL_MAPPING_POLICY") {
            self.mapping_policy = policy.parse().map_err(EtlError::Config)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EtlError::Config("batch_size must be at least 1".to_string()));
        }
        for kind in JobKind::ALL {
            if self.jobs.get(kind).batch_size == Some(0) {
                return Err(EtlError::Config(format!(
                    "jobs.{}.batch_size must be at least 1",
                    kind
                )));
            }
        }
        if !is_identifier(&self.warehouse.schema) {
            return Err(EtlError::Config(format!(
                "warehouse.schema '{}' is not a plain identifier",
                self.warehouse.schema
            )));
        }
        Ok(())
    }

    pub fn job(&self, kind: JobKind) -> &JobConfig {
        self.jobs.get(kind)
    }

    pub fn batch_size_for(&self, kind: JobKind) -> usize {
        self.jobs.get(kind).batch_size.unwrap_or(self.batch_size)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EtlConfig::default();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.mapping_policy, MappingPolicy::Warn);
        assert_eq!(config.warehouse.schema, "main");
        assert!(config.jobs.reviews.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EtlConfig::from_toml(
            r#"
            batch_size = 250
            mapping_policy = "strict"
            staging_dir = "staging_data"

            [warehouse]
            path = "dw.db"
            schema = "dw"

            [jobs.reviews]
            input = "data/Reviews.csv"

            [jobs.transaction]
            on_conflict = "ignore"
            batch_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.mapping_policy, MappingPolicy::Strict);
        assert_eq!(config.staging_dir, Some(PathBuf::from("staging_data")));
        assert_eq!(config.warehouse.path, PathBuf::from("dw.db"));
        assert!(config.warehouse.create_tables);
        assert_eq!(
            config.jobs.reviews.input,
            Some(PathBuf::from("data/Reviews.csv"))
        );
        assert_eq!(config.jobs.reviews.encoding, None);
        assert_eq!(config.jobs.transaction.on_conflict, ConflictPolicy::Ignore);
        assert_eq!(config.batch_size_for(JobKind::Transaction), 50);
        assert_eq!(config.batch_size_for(JobKind::Event), 250);
    }

    #[test]
    fn test_skip_is_lenient_mapping_in_file_and_env() {
        let config = EtlConfig::from_toml("mapping_policy = \"skip\"").unwrap();
        assert_eq!(config.mapping_policy, MappingPolicy::Warn);

        let mut config = EtlConfig::default();
        config.mapping_policy = MappingPolicy::Strict;
        config
            .apply_overrides(|k| (k == "ETL_MAPPING_POLICY").then(|| "skip".to_string()))
            .unwrap();
        assert_eq!(config.mapping_policy, MappingPolicy::Warn);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ETL_WAREHOUSE_PATH", "/tmp/other.db"),
            ("ETL_BATCH_SIZE", "42"),
            ("ETL_MAPPING_POLICY", "strict"),
        ]);
        let mut config = EtlConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.warehouse.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.batch_size, 42);
        assert_eq!(config.mapping_policy, MappingPolicy::Strict);

        let bad = |k: &str| (k == "ETL_BATCH_SIZE").then(|| "lots".to_string());
        assert!(EtlConfig::default().apply_overrides(bad).is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = EtlConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = EtlConfig::default();
        config.warehouse.schema = "dw; DROP".to_string();
        assert!(config.validate().is_err());

        let mut config = EtlConfig::default();
        config.jobs.event.batch_size = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_leaves_validation_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl.toml");
        std::fs::write(&path, "batch_size = 0\n").unwrap();
        let mut config = EtlConfig::load(Some(&path)).unwrap();
        assert_eq!(config.batch_size, 0);
        assert!(config.validate().is_err());
        config.batch_size = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let err = EtlConfig::load(Some(Path::new("/nonexistent/etl.toml"))).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
