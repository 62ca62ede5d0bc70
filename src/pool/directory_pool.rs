//! Directory (LDAPv3) connection pool wiring (spec §4.2: 2..10 connections,
//! bound with retry on checkout).

use std::sync::Arc;
use std::time::Duration;

use ldap3::LdapConn;

use crate::config::Config;
use crate::error::{PkdError, PkdResult};
use crate::pool::{Pool, ResourceFactory};

struct DirectoryConnectionFactory {
    url: String,
    bind_dn: String,
    bind_password: String,
}

impl ResourceFactory<LdapConn> for DirectoryConnectionFactory {
    fn build(&self) -> PkdResult<LdapConn> {
        // Three attempts with a 100ms linear backoff, per spec §4.2.
        let mut last_error = None;
        for attempt in 0..3 {
            match self.try_connect() {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    last_error = Some(e);
                    std::thread::sleep(Duration::from_millis(100 * (attempt as u64 + 1)));
                }
            }
        }
        Err(last_error.unwrap_or_else(|| PkdError::Directory("connection failed".to_string())))
    }

    fn is_healthy(&self, resource: &mut LdapConn) -> bool {
        resource
            .simple_bind(&self.bind_dn, &self.bind_password)
            .is_ok()
    }
}

impl DirectoryConnectionFactory {
    fn try_connect(&self) -> PkdResult<LdapConn> {
        let mut conn = LdapConn::new(&self.url)
            .map_err(|e| PkdError::Directory(format!("connect failed: {e}")))?;
        conn.simple_bind(&self.bind_dn, &self.bind_password)
            .map_err(|e| PkdError::Directory(format!("bind failed: {e}")))?
            .success()
            .map_err(|e| PkdError::Directory(format!("bind rejected: {e}")))?;
        Ok(conn)
    }
}

pub fn build_directory_pool(config: &Config) -> PkdResult<Pool<LdapConn>> {
    let url = format!("ldap://{}:{}", config.directory_host, config.directory_port);
    let factory = Arc::new(DirectoryConnectionFactory {
        url,
        bind_dn: config.directory_bind_dn.clone(),
        bind_password: config.directory_bind_password.clone(),
    });
    Pool::new(
        config.pool_directory_min,
        config.pool_directory_max,
        Duration::from_secs(config.pool_acquire_timeout_seconds),
        factory,
    )
}
