//! # Configuration
//!
//! Typed settings for the application socket, the Postgres cluster and the
//! optional analytics store and cache.
//!
//! Values come from the process environment (after loading `.env` when one
//! exists). Every check runs before anything is reported, so a broken
//! deployment sees all of its problems in one message.

use crate::database::Role;
use crate::error::{Error, Result};
use crate::validation::{FieldError, ValidationErrors, ValidationResult};
use std::fmt;
use tracing::debug;

/// Connection settings for a single Postgres endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    username: String,
    password: String,
    database: String,
}

impl ConnectionConfig {
    /// Create connection settings
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            database: database.into(),
        }
    }

    /// Server host name or address
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Login role
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Login password
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Target database name
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Key/value connection string in libpq format, with quoted values
    #[must_use]
    pub fn dsn(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode=disable",
            quote_dsn_value(&self.host),
            self.port,
            quote_dsn_value(&self.username),
            quote_dsn_value(&self.password),
            quote_dsn_value(&self.database)
        )
    }

    fn validate_into(&self, scope: &str, errors: &mut ValidationErrors) {
        if self.host.is_empty() {
            errors.add_required(format!("{scope}.host"));
        }
        if self.port == 0 {
            errors.add_required(format!("{scope}.port"));
        }
        if self.username.is_empty() {
            errors.add_required(format!("{scope}.username"));
        }
        if self.database.is_empty() {
            errors.add_required(format!("{scope}.database"));
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Read and write endpoints of one Postgres cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Endpoint serving read traffic
    pub read: ConnectionConfig,
    /// Endpoint serving write traffic
    pub write: ConnectionConfig,
}

impl ClusterConfig {
    /// Create a cluster config from its two endpoints
    #[must_use]
    pub const fn new(read: ConnectionConfig, write: ConnectionConfig) -> Self {
        Self { read, write }
    }

    /// Settings for the given role
    #[must_use]
    pub const fn endpoint(&self, role: Role) -> &ConnectionConfig {
        match role {
            Role::Read => &self.read,
            Role::Write => &self.write,
        }
    }

    /// Connection string for the given role
    #[must_use]
    pub fn dsn(&self, role: Role) -> String {
        self.endpoint(role).dsn()
    }

    /// Check that both endpoints are fully specified
    ///
    /// # Errors
    ///
    /// Returns every missing host, port, username and database across both
    /// roles.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        self.read.validate_into("postgres.read", &mut errors);
        self.write.validate_into("postgres.write", &mut errors);
        errors.into_result()
    }
}

/// Application socket and build information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Version reported by the info endpoint
    pub version: String,
    /// Interface to listen on
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl AppConfig {
    /// `host:port` form used for binding
    #[must_use]
    pub fn socket_str(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL for the given protocol (e.g. `http`)
    #[must_use]
    pub fn url(&self, protocol: &str) -> String {
        format!("{protocol}://{}", self.socket_str())
    }

    /// Check that version, host and port are set
    ///
    /// # Errors
    ///
    /// Returns every missing setting.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        if self.version.is_empty() {
            errors.add_required("app.version");
        }
        if self.host.is_empty() {
            errors.add_required("app.host");
        }
        if self.port == 0 {
            errors.add_required("app.port");
        }
        errors.into_result()
    }
}

/// Column-store used for analytics queries
#[derive(Clone, PartialEq, Eq)]
pub struct AnalyticsConfig {
    /// Server host
    pub host: String,
    /// Native protocol port
    pub port: u16,
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
    /// Target database
    pub database: String,
}

impl AnalyticsConfig {
    /// Native-protocol connection string
    #[must_use]
    pub fn dsn(&self) -> String {
        format!(
            "tcp://{}:{}?username={}&password={}&database={}",
            self.host, self.port, self.username, self.password, self.database
        )
    }

    /// Check host, port and username
    ///
    /// # Errors
    ///
    /// Returns every missing setting.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        if self.host.is_empty() {
            errors.add_required("analytics.host");
        }
        if self.port == 0 {
            errors.add_required("analytics.port");
        }
        if self.username.is_empty() {
            errors.add_required("analytics.username");
        }
        errors.into_result()
    }
}

impl fmt::Debug for AnalyticsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Key-value cache holding auth and resource data in separate databases
#[derive(Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// ACL user
    pub username: String,
    /// ACL password
    pub password: String,
    /// Logical database for sessions and tokens
    pub auth_database: u8,
    /// Logical database for cached resources
    pub resource_database: u8,
}

impl CacheConfig {
    /// Connection string targeting the auth database
    #[must_use]
    pub fn dsn(&self) -> String {
        format!(
            "tcp://{}:{}?username={}&password={}&database={}",
            self.host, self.port, self.username, self.password, self.auth_database
        )
    }

    /// Check host, port and username
    ///
    /// # Errors
    ///
    /// Returns every missing setting.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        if self.host.is_empty() {
            errors.add_required("cache.host");
        }
        if self.port == 0 {
            errors.add_required("cache.port");
        }
        if self.username.is_empty() {
            errors.add_required("cache.username");
        }
        errors.into_result()
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("auth_database", &self.auth_database)
            .field("resource_database", &self.resource_database)
            .finish_non_exhaustive()
    }
}

/// Credential validation settings
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// Shared HS256 secret; bearer tokens are rejected outright when unset
    pub jwt_secret: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Application socket and version
    pub app: AppConfig,
    /// Primary relational store
    pub postgres: ClusterConfig,
    /// Optional analytics store
    pub analytics: Option<AnalyticsConfig>,
    /// Optional cache
    pub cache: Option<CacheConfig>,
    /// Credential validation
    pub auth: AuthConfig,
}

impl Config {
    /// Load `.env` (if present) and read configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` listing every missing or malformed key.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded .env from {}", path.display()),
            Err(e) => debug!("No .env file loaded: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    ///
    /// Empty values are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` listing every missing or malformed key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(lookup);

        let config = Self {
            app: AppConfig {
                version: env.string(&["APP_VERSION"]),
                host: env.string(&["APP_HOST"]),
                port: env.port(&["APP_PORT"]),
            },
            postgres: ClusterConfig::new(
                postgres_endpoint(&env, "POSTGRES_READ"),
                postgres_endpoint(&env, "POSTGRES_WRITE"),
            ),
            analytics: env.any_set("CLICKHOUSE", ANALYTICS_KEYS).then(|| AnalyticsConfig {
                host: env.string(&["CLICKHOUSE_HOST"]),
                port: env.port(&["CLICKHOUSE_PORT"]),
                username: env.string(&["CLICKHOUSE_USERNAME"]),
                password: env.string(&["CLICKHOUSE_PASSWORD"]),
                database: env.string(&["CLICKHOUSE_DB", "CLICKHOUSE_DATABASE"]),
            }),
            cache: env.any_set("REDIS", CACHE_KEYS).then(|| CacheConfig {
                host: env.string(&["REDIS_HOST"]),
                port: env.port(&["REDIS_PORT"]),
                username: env.string(&["REDIS_USERNAME"]),
                password: env.string(&["REDIS_PASSWORD"]),
                auth_database: env.small_int(&["REDIS_AUTH_DB"]),
                resource_database: env.small_int(&["REDIS_RESOURCE_DB"]),
            }),
            auth: AuthConfig {
                jwt_secret: env.optional(&["AUTH_JWT_SECRET"]),
            },
        };

        let mut errors = env.into_errors();
        if let Err(e) = config.validate() {
            errors.merge(e);
        }
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(Error::Configuration(errors))
        }
    }

    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns the union of all section errors.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        let sections = [
            self.app.validate(),
            self.postgres.validate(),
            self.analytics.as_ref().map_or(Ok(()), AnalyticsConfig::validate),
            self.cache.as_ref().map_or(Ok(()), CacheConfig::validate),
        ];
        for section in sections {
            if let Err(e) = section {
                errors.merge(e);
            }
        }
        errors.into_result()
    }
}

fn postgres_endpoint<F>(env: &EnvReader<F>, role_prefix: &str) -> ConnectionConfig
where
    F: Fn(&str) -> Option<String>,
{
    let key = |suffix: &str| [format!("{role_prefix}_{suffix}"), format!("POSTGRES_{suffix}")];
    let host = key("HOST");
    let port = key("PORT");
    let username = key("USERNAME");
    let password = key("PASSWORD");
    let [db_role, db_shared] = key("DB");
    let [database_role, database_shared] = key("DATABASE");

    ConnectionConfig::new(
        env.string(&host),
        env.port(&port),
        env.string(&username),
        env.string(&password),
        env.string(&[db_role, database_role, db_shared, database_shared]),
    )
}

const ANALYTICS_KEYS: &[&str] = &["HOST", "PORT", "USERNAME", "PASSWORD", "DB", "DATABASE"];
const CACHE_KEYS: &[&str] = &[
    "HOST",
    "PORT",
    "USERNAME",
    "PASSWORD",
    "AUTH_DB",
    "RESOURCE_DB",
];

/// Single-quote a libpq value, escaping `\\` and `'`
fn quote_dsn_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if matches!(c, '\\' | '\'') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Lookup wrapper that records parse failures instead of stopping at them
struct EnvReader<F> {
    lookup: F,
    errors: std::cell::RefCell<ValidationErrors>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            errors: std::cell::RefCell::new(ValidationErrors::new()),
        }
    }

    /// First non-empty value among `keys`, trimmed, with the key it came from
    fn first<K: AsRef<str>>(&self, keys: &[K]) -> Option<(String, String)> {
        keys.iter().find_map(|key| {
            let key = key.as_ref();
            (self.lookup)(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (key.to_string(), v))
        })
    }

    fn optional<K: AsRef<str>>(&self, keys: &[K]) -> Option<String> {
        self.first(keys).map(|(_, v)| v)
    }

    fn string<K: AsRef<str>>(&self, keys: &[K]) -> String {
        self.optional(keys).unwrap_or_default()
    }

    fn port<K: AsRef<str>>(&self, keys: &[K]) -> u16 {
        self.parsed(keys, "a port number")
    }

    fn small_int<K: AsRef<str>>(&self, keys: &[K]) -> u8 {
        self.parsed(keys, "an integer between 0 and 255")
    }

    fn parsed<K, T>(&self, keys: &[K], expected: &str) -> T
    where
        K: AsRef<str>,
        T: std::str::FromStr + Default,
    {
        let Some((key, raw)) = self.first(keys) else {
            return T::default();
        };
        raw.parse().unwrap_or_else(|_| {
            self.errors
                .borrow_mut()
                .add(FieldError::invalid_type(key, expected));
            T::default()
        })
    }

    fn any_set(&self, prefix: &str, suffixes: &[&str]) -> bool {
        suffixes
            .iter()
            .any(|suffix| self.first(&[format!("{prefix}_{suffix}")]).is_some())
    }

    fn into_errors(self) -> ValidationErrors {
        self.errors.into_inner()
    }
}
