use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// SQL dialect the compiler emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Sqlite,
    Clickhouse,
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::Sqlite => write!(f, "sqlite"),
            DialectKind::Clickhouse => write!(f, "clickhouse"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown SQL dialect '{0}' (expected 'sqlite' or 'clickhouse')")]
pub struct UnknownDialect(String);

impl FromStr for DialectKind {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DialectKind::Sqlite),
            "clickhouse" => Ok(DialectKind::Clickhouse),
            other => Err(UnknownDialect(other.to_string())),
        }
    }
}

/// Compiler configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Number of values above which a within/without predicate is streamed
    /// into a temporary table instead of an inline IN-list
    #[validate(range(
        min = 1,
        max = 1_000_000,
        message = "Bulk within threshold must be between 1 and 1000000"
    ))]
    pub bulk_within_threshold: usize,

    /// Lazy (one statement buffered at a time) or eager result assembly
    pub lazy_results: bool,

    /// Largest `times(n)` a repeat is unrolled into chained hops
    #[validate(range(
        min = 1,
        max = 64,
        message = "Max repeat unroll must be between 1 and 64"
    ))]
    pub max_repeat_unroll: usize,

    /// SQL dialect for identifier quoting, range clauses and temp tables
    pub dialect: DialectKind,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            bulk_within_threshold: 100,
            lazy_results: true,
            max_repeat_unroll: 32,
            dialect: DialectKind::Sqlite,
        }
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            bulk_within_threshold: parse_env_var("SQLGRAPH_BULK_WITHIN_THRESHOLD", "100")?,
            lazy_results: parse_env_var("SQLGRAPH_LAZY_RESULTS", "true")?,
            max_repeat_unroll: parse_env_var("SQLGRAPH_MAX_REPEAT_UNROLL", "32")?,
            dialect: parse_env_var("SQLGRAPH_DIALECT", "sqlite")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let config = Self {
            bulk_within_threshold: cli.bulk_within_threshold,
            lazy_results: !cli.eager,
            max_repeat_unroll: cli.max_repeat_unroll,
            dialect: cli.dialect,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub bulk_within_threshold: usize,
    pub eager: bool,
    pub max_repeat_unroll: usize,
    pub dialect: DialectKind,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bulk_within_threshold, 100);
        assert!(config.lazy_results);
        assert_eq!(config.dialect, DialectKind::Sqlite);
    }

    #[test]
    fn test_invalid_threshold() {
        let config = CompilerConfig {
            bulk_within_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_repeat_unroll() {
        let config = CompilerConfig {
            max_repeat_unroll: 65,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        env::set_var("SQLGRAPH_BULK_WITHIN_THRESHOLD", "250");
        env::set_var("SQLGRAPH_DIALECT", "clickhouse");
        let config = CompilerConfig::from_env().unwrap();
        env::remove_var("SQLGRAPH_BULK_WITHIN_THRESHOLD");
        env::remove_var("SQLGRAPH_DIALECT");

        assert_eq!(config.bulk_within_threshold, 250);
        assert_eq!(config.dialect, DialectKind::Clickhouse);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        env::set_var("SQLGRAPH_LAZY_RESULTS", "maybe");
        let result = CompilerConfig::from_env();
        env::remove_var("SQLGRAPH_LAZY_RESULTS");

        match result {
            Err(ConfigError::Parse { field, .. }) => assert_eq!(field, "SQLGRAPH_LAZY_RESULTS"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_yaml_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bulk_within_threshold: 10\nlazy_results: false").unwrap();

        let config = CompilerConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.bulk_within_threshold, 10);
        assert!(!config.lazy_results);
        assert_eq!(config.max_repeat_unroll, 32);
    }
}
