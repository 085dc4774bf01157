//! Configuration for migration runs
//!
//! Loaded from a YAML file by the command-line front-end, with
//! `ROCKHOPPER_*` environment variables taking precedence over file values.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RockhopperError, RockhopperResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Underlying SQL driver identifier
    pub driver: String,
    /// SQL dialect selector; defaults to the driver name
    pub dialect: String,
    /// Connection string
    pub dsn: String,
    /// Directories scanned for migration scripts
    pub migrations_dirs: Vec<String>,
    /// Override for the bookkeeping table name
    pub table_name: String,
    /// Optional allow-list of packages
    pub packages: Vec<String>,
}

impl Config {
    /// Load a config file and overlay the environment on top of it
    pub fn load<P: AsRef<Path>>(path: P) -> RockhopperResult<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| {
            RockhopperError::Configuration(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let mut config: Config = serde_yaml::from_str(&data)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay `ROCKHOPPER_*` environment variables on this config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(driver) = env::var("ROCKHOPPER_DRIVER") {
            self.driver = driver;
        }
        if let Ok(dialect) = env::var("ROCKHOPPER_DIALECT") {
            self.dialect = dialect;
        }
        if let Ok(dsn) = env::var("ROCKHOPPER_DSN") {
            self.dsn = dsn;
        }
        if let Ok(dirs) = env::var("ROCKHOPPER_MIGRATIONS_DIR") {
            self.migrations_dirs = dirs
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(table) = env::var("ROCKHOPPER_TABLE_NAME") {
            self.table_name = table;
        }
    }

    /// Dialect selector, falling back to the driver name
    pub fn dialect_name(&self) -> &str {
        if self.dialect.is_empty() {
            &self.driver
        } else {
            &self.dialect
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let config: Config = serde_yaml::from_str(
            "driver: mysql\n\
             dsn: mysql://root@localhost/test\n\
             migrationsDirs:\n\
             - migrations/mysql\n\
             packages:\n\
             - main\n",
        )
        .unwrap();

        assert_eq!(config.driver, "mysql");
        assert_eq!(config.dialect, "");
        assert_eq!(config.dialect_name(), "mysql");
        assert_eq!(config.migrations_dirs, vec!["migrations/mysql"]);
        assert_eq!(config.packages, vec!["main"]);
        assert_eq!(config.table_name, "");
    }

    #[test]
    fn test_dialect_overrides_driver() {
        let config = Config {
            driver: "mysql".to_string(),
            dialect: "tidb".to_string(),
            ..Config::default()
        };

        assert_eq!(config.dialect_name(), "tidb");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config {
            driver: "mysql".to_string(),
            ..Config::default()
        };

        env::set_var("ROCKHOPPER_DRIVER", "postgres");
        env::set_var("ROCKHOPPER_MIGRATIONS_DIR", "a, b");
        config.apply_env_overrides();
        env::remove_var("ROCKHOPPER_DRIVER");
        env::remove_var("ROCKHOPPER_MIGRATIONS_DIR");

        assert_eq!(config.driver, "postgres");
        assert_eq!(config.migrations_dirs, vec!["a", "b"]);
    }
}
