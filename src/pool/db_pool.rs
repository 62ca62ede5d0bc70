//! Database connection pool wiring: a `Pool<Box<dyn QueryExecutor>>` whose
//! factory dispatches on configured dialect (spec §4.2 pool defaults:
//! relational-A 5..20, relational-B 2..10).

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, DbDialect};
use crate::error::PkdResult;
use crate::pool::{Pool, ResourceFactory};
use crate::query::oracle_executor::OracleExecutor;
use crate::query::postgres_executor::PostgresExecutor;
use crate::query::QueryExecutor;

struct DbConnectionFactory {
    dialect: DbDialect,
    host: String,
    port: u16,
    name: String,
    user: String,
    password: String,
}

impl ResourceFactory<Box<dyn QueryExecutor>> for DbConnectionFactory {
    fn build(&self) -> PkdResult<Box<dyn QueryExecutor>> {
        match self.dialect {
            DbDialect::A => {
                let executor = PostgresExecutor::connect(
                    &self.host,
                    self.port,
                    &self.name,
                    &self.user,
                    &self.password,
                )?;
                Ok(Box::new(executor))
            }
            DbDialect::B => {
                let executor = OracleExecutor::connect(
                    &self.host,
                    self.port,
                    &self.name,
                    &self.user,
                    &self.password,
                )?;
                Ok(Box::new(executor))
            }
        }
    }

    fn is_healthy(&self, resource: &mut Box<dyn QueryExecutor>) -> bool {
        resource.query("SELECT 1", &[]).is_ok()
    }
}

/// Builds the application-wide database pool from configuration. Pool size
/// defaults to the dialect's bounds unless overridden in `config`.
pub fn build_db_pool(config: &Config) -> PkdResult<Pool<Box<dyn QueryExecutor>>> {
    let factory = Arc::new(DbConnectionFactory {
        dialect: config.db_dialect,
        host: config.db_host.clone(),
        port: config.db_port,
        name: config.db_name.clone(),
        user: config.db_user.clone(),
        password: config.db_password.clone(),
    });
    Pool::new(
        config.pool_db_min,
        config.pool_db_max,
        Duration::from_secs(config.pool_acquire_timeout_seconds),
        factory,
    )
}
