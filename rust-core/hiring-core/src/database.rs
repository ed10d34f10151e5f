//! # Database Module
//!
//! Read/write Postgres pools for one cluster.
//!
//! Each [`Role`] owns an independent `sqlx` pool. Both are built at startup,
//! shared by every request task, and closed once at shutdown.

use crate::config::{ClusterConfig, ConnectionConfig};
use crate::error::{Error, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Connection;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Logical purpose of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Queries that only read
    Read,
    /// Queries that modify data
    Write,
}

impl Role {
    /// Every role, in connection order
    pub const ALL: [Self; 2] = [Self::Read, Self::Write];

    /// Lowercase tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            _ => Err(Error::UnsupportedOperation {
                operation: s.to_string(),
            }),
        }
    }
}

/// Pool sizing and timeouts, applied to both roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// Connections older than this are recycled
    pub max_lifetime: Duration,
    /// Idle connections above the minimum are closed after this
    pub idle_timeout: Duration,
    /// Bound on establishing and pinging a pool, and on each acquire
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 25,
            min_connections: 5,
            max_lifetime: Duration::from_secs(60 * 60),
            idle_timeout: Duration::from_secs(30 * 60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolSettings {
    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .max_lifetime(self.max_lifetime)
            .idle_timeout(self.idle_timeout)
            .acquire_timeout(self.connect_timeout)
    }
}

/// Read and write pools for a Postgres cluster
pub struct ClusterConnector {
    config: ClusterConfig,
    settings: PoolSettings,
    read: Option<PgPool>,
    write: Option<PgPool>,
    closed: AtomicBool,
}

impl fmt::Debug for ClusterConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConnector")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ClusterConnector {
    /// Validate the configuration without opening any pool
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` listing every missing field.
    pub fn new(config: ClusterConfig, settings: PoolSettings) -> Result<Self> {
        config.validate().map_err(Error::Configuration)?;
        Ok(Self {
            config,
            settings,
            read: None,
            write: None,
            closed: AtomicBool::new(false),
        })
    }

    /// Validate the configuration, then open and ping both pools
    ///
    /// If the second pool fails the first one is closed again.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` before any network activity, or
    /// `Error::Connection` naming the role that could not be reached.
    pub async fn connect(config: ClusterConfig, settings: PoolSettings) -> Result<Self> {
        let mut connector = Self::new(config, settings)?;
        for role in Role::ALL {
            if let Err(e) = connector.open(role).await {
                connector.close().await;
                return Err(e);
            }
        }
        Ok(connector)
    }

    /// Open and ping the pool for `role`, replacing any existing one
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the pool cannot be built or pinged
    /// within the connect timeout.
    pub async fn open(&mut self, role: Role) -> Result<()> {
        let endpoint = self.config.endpoint(role);
        let options = connect_options(endpoint);
        let pool_options = self.settings.pool_options();
        let timeout = self.settings.connect_timeout;

        let established = tokio::time::timeout(timeout, async {
            let pool = pool_options
                .connect_with(options)
                .await
                .map_err(|e| format!("cannot create connection pool: {e}"))?;
            if let Err(e) = ping_pool(&pool).await {
                pool.close().await;
                return Err(format!("cannot connect to PostgreSQL: {e}"));
            }
            Ok::<_, String>(pool)
        })
        .await;

        let pool = match established {
            Ok(Ok(pool)) => pool,
            Ok(Err(message)) => return Err(Error::connection(role, message)),
            Err(_) => {
                return Err(Error::connection(
                    role,
                    format!("no connection within {}s", timeout.as_secs_f32()),
                ))
            }
        };

        info!(
            role = %role,
            host = %endpoint.host(),
            port = endpoint.port(),
            database = %endpoint.database(),
            "Connected to PostgreSQL"
        );
        self.attach(role, pool).await;
        Ok(())
    }

    /// Attach a pool for `role` that connects on first use
    pub async fn open_lazy(&mut self, role: Role) {
        let pool = self
            .settings
            .pool_options()
            .connect_lazy_with(connect_options(self.config.endpoint(role)));
        debug!(role = %role, "Attached lazy pool");
        self.attach(role, pool).await;
    }

    async fn attach(&mut self, role: Role, pool: PgPool) {
        let slot = match role {
            Role::Read => &mut self.read,
            Role::Write => &mut self.write,
        };
        if let Some(previous) = slot.replace(pool) {
            previous.close().await;
        }
        self.closed.store(false, Ordering::SeqCst);
    }

    /// Cluster configuration this connector was built from
    #[must_use]
    pub const fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Connection string for `role`, built from that role's settings
    #[must_use]
    pub fn dsn(&self, role: Role) -> String {
        self.config.dsn(role)
    }

    /// Pool for `role`
    ///
    /// # Errors
    ///
    /// Returns `Error::PoolUnavailable` if the pool was never opened.
    pub fn pool(&self, role: Role) -> Result<&PgPool> {
        let slot = match role {
            Role::Read => &self.read,
            Role::Write => &self.write,
        };
        slot.as_ref().ok_or(Error::PoolUnavailable { role })
    }

    /// Health check against the pool for `role`
    ///
    /// # Errors
    ///
    /// Returns `Error::PoolUnavailable` if the pool was never opened, or
    /// `Error::Connection` if the ping fails.
    pub async fn ping(&self, role: Role) -> Result<()> {
        let pool = self.pool(role)?;
        ping_pool(pool)
            .await
            .map_err(|e| Error::connection(role, e))
    }

    /// Close every open pool
    ///
    /// Only the first call releases anything; later calls return at once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for role in Role::ALL {
            match self.pool(role) {
                Ok(pool) => {
                    pool.close().await;
                    debug!(role = %role, "Closed pool");
                }
                Err(_) => warn!(role = %role, "Pool was never opened, nothing to close"),
            }
        }
    }

    /// Whether `close` has run since the last pool was attached
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn connect_options(endpoint: &ConnectionConfig) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(endpoint.host())
        .port(endpoint.port())
        .username(endpoint.username())
        .database(endpoint.database())
        .ssl_mode(PgSslMode::Disable);
    if endpoint.password().is_empty() {
        options
    } else {
        options.password(endpoint.password())
    }
}

async fn ping_pool(pool: &PgPool) -> std::result::Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, port: u16, user: &str, db: &str) -> ConnectionConfig {
        ConnectionConfig::new(host, port, user, "pw", db)
    }

    fn cluster() -> ClusterConfig {
        ClusterConfig::new(
            endpoint("127.0.0.1", 1, "reader", "hiring_ro"),
            endpoint("127.0.0.1", 2, "writer", "hiring_rw"),
        )
    }

    fn quick_settings() -> PoolSettings {
        PoolSettings {
            min_connections: 0,
            connect_timeout: Duration::from_millis(500),
            ..PoolSettings::default()
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("read".parse::<Role>().unwrap(), Role::Read);
        assert_eq!(" WRITE ".parse::<Role>().unwrap(), Role::Write);

        let err = "admin".parse::<Role>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation { ref operation } if operation == "admin"));
    }

    #[test]
    fn test_default_pool_settings() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_connections, 25);
        assert_eq!(settings.min_connections, 5);
        assert_eq!(settings.max_lifetime, Duration::from_secs(3600));
        assert_eq!(settings.idle_timeout, Duration::from_secs(1800));
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_dsn_is_per_role() {
        let connector = ClusterConnector::new(cluster(), PoolSettings::default()).unwrap();
        let read = connector.dsn(Role::Read);
        let write = connector.dsn(Role::Write);

        assert_ne!(read, write);
        assert!(read.contains("port=1") && read.contains("user='reader'"));
        assert!(read.contains("dbname='hiring_ro'"));
        assert!(write.contains("port=2") && write.contains("user='writer'"));
        assert!(write.contains("dbname='hiring_rw'"));
    }

    #[test]
    fn test_new_rejects_incomplete_config() {
        let config = ClusterConfig::new(endpoint("", 0, "reader", "db"), endpoint("h", 1, "", "db"));
        let err = ClusterConnector::new(config, PoolSettings::default()).unwrap_err();

        let Error::Configuration(errors) = err else {
            panic!("expected configuration error");
        };
        assert_eq!(errors.len(), 3);
    }

    #[tokio::test]
    async fn test_connect_validates_before_network() {
        let config = ClusterConfig::new(endpoint("", 5432, "u", "d"), endpoint("h", 5432, "u", "d"));
        let result = ClusterConnector::connect(config, quick_settings()).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_connect_unreachable_reports_read_role() {
        let err = ClusterConnector::connect(cluster(), quick_settings())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { role: Role::Read, .. }));
    }

    #[tokio::test]
    async fn test_ping_lazy_pool_unreachable() {
        let mut connector = ClusterConnector::new(cluster(), quick_settings()).unwrap();
        connector.open_lazy(Role::Read).await;

        let err = connector.ping(Role::Read).await.unwrap_err();
        assert!(matches!(err, Error::Connection { role: Role::Read, .. }));
        connector.close().await;
    }

    #[tokio::test]
    async fn test_ping_without_pool() {
        let connector = ClusterConnector::new(cluster(), quick_settings()).unwrap();
        let err = connector.ping(Role::Write).await.unwrap_err();
        assert!(matches!(err, Error::PoolUnavailable { role: Role::Write }));
    }

    #[test]
    fn test_close_without_pools() {
        let connector = ClusterConnector::new(cluster(), quick_settings()).unwrap();
        tokio_test::block_on(connector.close());
        assert!(connector.is_closed());
        tokio_test::block_on(connector.close());
        assert!(connector.is_closed());
    }

    #[tokio::test]
    async fn test_close_partial_pools_once() {
        let mut connector = ClusterConnector::new(cluster(), quick_settings()).unwrap();
        connector.open_lazy(Role::Read).await;

        assert!(connector.pool(Role::Read).is_ok());
        assert!(matches!(
            connector.ping(Role::Write).await,
            Err(Error::PoolUnavailable { role: Role::Write })
        ));

        connector.close().await;
        assert!(connector.pool(Role::Read).unwrap().is_closed());
        connector.close().await;
        assert!(connector.is_closed());
    }

    fn live_target() -> ConnectionConfig {
        let var = |key: &str| std::env::var(key).expect("TEST_POSTGRES_* required");
        let port = var("TEST_POSTGRES_PORT").parse().expect("numeric port");
        ConnectionConfig::new(
            var("TEST_POSTGRES_HOST"),
            port,
            var("TEST_POSTGRES_USERNAME"),
            var("TEST_POSTGRES_PASSWORD"),
            var("TEST_POSTGRES_DB"),
        )
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_connect_fails_on_write_after_read_opened() {
        let config = ClusterConfig::new(
            live_target(),
            endpoint("127.0.0.1", 1, "writer", "hiring_rw"),
        );

        let err = ClusterConnector::connect(config, quick_settings())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { role: Role::Write, .. }));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_connect_and_ping_both_roles() {
        let target = live_target();
        let config = ClusterConfig::new(target.clone(), target);

        let connector = ClusterConnector::connect(config, PoolSettings::default())
            .await
            .expect("connect failed");
        for role in Role::ALL {
            connector.ping(role).await.expect("ping failed");
        }
        connector.close().await;
    }
}
