//! Recognised configuration keys (spec §6), loaded from TOML with
//! environment-variable overrides, the way `tor-config` layers Arti's
//! configuration over a parsed file.

use serde::Deserialize;
use std::path::Path;

use crate::error::{PkdError, PkdResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DbDialect {
    A,
    B,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "db-dialect")]
    pub db_dialect: DbDialect,
    #[serde(rename = "db-host")]
    pub db_host: String,
    #[serde(rename = "db-port")]
    pub db_port: u16,
    #[serde(rename = "db-name")]
    pub db_name: String,
    #[serde(rename = "db-user")]
    pub db_user: String,
    #[serde(rename = "db-password")]
    pub db_password: String,

    #[serde(rename = "directory-host")]
    pub directory_host: String,
    #[serde(rename = "directory-port")]
    pub directory_port: u16,
    #[serde(rename = "directory-bind-dn")]
    pub directory_bind_dn: String,
    #[serde(rename = "directory-bind-password")]
    pub directory_bind_password: String,
    #[serde(rename = "directory-base-dn")]
    pub directory_base_dn: String,

    #[serde(rename = "server-port")]
    pub server_port: u16,
    #[serde(rename = "worker-threads")]
    pub worker_threads: usize,
    #[serde(rename = "max-body-mb")]
    pub max_body_mb: usize,

    #[serde(rename = "scheduler-reconcile-hour")]
    pub scheduler_reconcile_hour: u8,
    #[serde(rename = "scheduler-enabled")]
    pub scheduler_enabled: bool,
    #[serde(rename = "scheduler-revalidate-on-sync")]
    pub scheduler_revalidate_on_sync: bool,

    #[serde(rename = "pool-db-min")]
    pub pool_db_min: usize,
    #[serde(rename = "pool-db-max")]
    pub pool_db_max: usize,
    #[serde(rename = "pool-directory-min")]
    pub pool_directory_min: usize,
    #[serde(rename = "pool-directory-max")]
    pub pool_directory_max: usize,
    #[serde(rename = "pool-acquire-timeout-seconds")]
    pub pool_acquire_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_dialect: DbDialect::A,
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_name: "pkd".to_string(),
            db_user: "pkd".to_string(),
            db_password: String::new(),

            directory_host: "localhost".to_string(),
            directory_port: 389,
            directory_bind_dn: String::new(),
            directory_bind_password: String::new(),
            directory_base_dn: "dc=download,dc=pkd".to_string(),

            server_port: 8080,
            worker_threads: 8,
            max_body_mb: 64,

            scheduler_reconcile_hour: 2,
            scheduler_enabled: true,
            scheduler_revalidate_on_sync: true,

            pool_db_min: 5,
            pool_db_max: 20,
            pool_directory_min: 2,
            pool_directory_max: 10,
            pool_acquire_timeout_seconds: 5,
        }
    }
}

impl Config {
    /// Loads a TOML file, falling back to defaults for absent keys, then
    /// applies `PKD_*` environment-variable overrides for the handful of
    /// keys operators most commonly need to override per-deployment.
    pub fn load(path: &Path) -> PkdResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PkdError::Config(format!("reading {}: {e}", path.display())))?;
        let mut config: Config =
            toml::from_str(&text).map_err(|e| PkdError::Config(format!("parsing config: {e}")))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PKD_DB_HOST") {
            self.db_host = v;
        }
        if let Ok(v) = std::env::var("PKD_DB_PASSWORD") {
            self.db_password = v;
        }
        if let Ok(v) = std::env::var("PKD_DIRECTORY_BIND_PASSWORD") {
            self.directory_bind_password = v;
        }
        if let Ok(v) = std::env::var("PKD_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                self.server_port = port;
            }
        }
    }

    fn validate(&self) -> PkdResult<()> {
        if self.scheduler_reconcile_hour > 23 {
            return Err(PkdError::Config(format!(
                "scheduler-reconcile-hour must be 0-23, got {}",
                self.scheduler_reconcile_hour
            )));
        }
        if self.pool_db_min > self.pool_db_max {
            return Err(PkdError::Config(
                "pool-db-min must not exceed pool-db-max".to_string(),
            ));
        }
        if self.pool_directory_min > self.pool_directory_max {
            return Err(PkdError::Config(
                "pool-directory-min must not exceed pool-directory-max".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_reconcile_hour() {
        let mut config = Config::default();
        config.scheduler_reconcile_hour = 24;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_pool_bounds() {
        let mut config = Config::default();
        config.pool_db_min = 50;
        config.pool_db_max = 5;
        assert!(config.validate().is_err());
    }
}
