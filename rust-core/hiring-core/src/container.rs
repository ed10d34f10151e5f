//! # Container
//!
//! Explicit wiring of configuration, the Postgres connector, middleware
//! instances and handlers. Built once at startup and handed to the server.

use crate::config::Config;
use crate::database::{ClusterConnector, PoolSettings};
use crate::error::Result;
use crate::handlers::{InfoHandler, LoginHandler, RegisterHandler};
use crate::middleware::{
    AuthenticateMiddleware, CredentialValidator, DenyAll, JwtValidator, LoggingMiddleware,
    MiddlewareChain, SharedMiddleware,
};
use crate::router::{Router, SharedRoutable};
use std::sync::Arc;
use tracing::{debug, info};

/// Application dependencies
pub struct Container {
    config: Arc<Config>,
    connector: Arc<ClusterConnector>,
    handlers: Vec<SharedRoutable>,
}

impl Container {
    /// Connect both Postgres pools and wire the handlers
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` or `Error::Connection` from the
    /// connector.
    pub async fn init(config: Config, settings: PoolSettings) -> Result<Self> {
        if let Some(analytics) = &config.analytics {
            debug!(analytics = ?analytics, "Analytics store configured");
        }
        if let Some(cache) = &config.cache {
            debug!(cache = ?cache, "Cache configured");
        }

        let connector = ClusterConnector::connect(config.postgres.clone(), settings).await?;
        Ok(Self::with_connector(config, connector))
    }

    /// Wire handlers around an existing connector
    #[must_use]
    pub fn with_connector(config: Config, connector: ClusterConnector) -> Self {
        let config = Arc::new(config);
        let connector = Arc::new(connector);

        let validator: Arc<dyn CredentialValidator> = match config.auth.jwt_secret.as_deref() {
            Some(secret) => {
                info!("Bearer token authentication enabled");
                Arc::new(JwtValidator::new(secret))
            }
            None => Arc::new(DenyAll),
        };
        let logging: SharedMiddleware = Arc::new(LoggingMiddleware::new());
        let authenticate: SharedMiddleware = Arc::new(AuthenticateMiddleware::new(validator));

        let chain = |middlewares: &[&SharedMiddleware]| -> MiddlewareChain {
            middlewares.iter().copied().cloned().collect()
        };

        let handlers: Vec<SharedRoutable> = vec![
            Arc::new(InfoHandler::new(
                config.app.version.clone(),
                chain(&[&logging, &authenticate]),
            )),
            Arc::new(RegisterHandler::new(
                Arc::clone(&connector),
                chain(&[&logging]),
            )),
            Arc::new(LoginHandler::new(Arc::clone(&connector), chain(&[&logging]))),
        ];

        Self {
            config,
            connector,
            handlers,
        }
    }

    /// Registry holding every wired handler
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if a handler's metadata is
    /// malformed.
    pub fn router(&self) -> Result<Router> {
        let mut router = Router::new();
        router.register_all(self.handlers.iter().cloned())?;
        Ok(router)
    }

    /// Loaded configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared Postgres connector
    #[must_use]
    pub fn connector(&self) -> &Arc<ClusterConnector> {
        &self.connector
    }

    /// Wired handlers in registration order
    #[must_use]
    pub fn handlers(&self) -> &[SharedRoutable] {
        &self.handlers
    }

    /// Release the Postgres pools
    pub async fn shutdown(&self) {
        info!("Closing PostgreSQL pools");
        self.connector.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(extra: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = [
            ("APP_VERSION", "1.2.0"),
            ("APP_HOST", "127.0.0.1"),
            ("APP_PORT", "8080"),
            ("POSTGRES_HOST", "localhost"),
            ("POSTGRES_PORT", "5432"),
            ("POSTGRES_USERNAME", "hiring"),
            ("POSTGRES_PASSWORD", "secret"),
            ("POSTGRES_DB", "hiring"),
        ]
        .iter()
        .chain(extra)
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
        Config::from_lookup(|key| env.get(key).cloned()).unwrap()
    }

    fn container(extra: &[(&str, &str)]) -> Container {
        let config = config(extra);
        let connector =
            ClusterConnector::new(config.postgres.clone(), PoolSettings::default()).unwrap();
        Container::with_connector(config, connector)
    }

    #[test]
    fn test_handlers_wired_in_order() {
        let container = container(&[]);
        let router = container.router().unwrap();

        let wiring: Vec<(String, Vec<&str>)> = router
            .routes()
            .iter()
            .map(|r| (r.path(), r.middlewares().names()))
            .collect();
        assert_eq!(
            wiring,
            vec![
                (
                    "/api/v1/".to_string(),
                    vec!["LoggingMiddleware", "AuthenticateMiddleware"]
                ),
                ("/api/v1/register".to_string(), vec!["LoggingMiddleware"]),
                ("/api/v1/login".to_string(), vec!["LoggingMiddleware"]),
            ]
        );
        assert_eq!(container.config().app.version, "1.2.0");
        assert_eq!(container.handlers().len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_is_repeatable() {
        let container = container(&[("AUTH_JWT_SECRET", "s3cret")]);
        container.shutdown().await;
        container.shutdown().await;
        assert!(container.connector().is_closed());
    }
}
