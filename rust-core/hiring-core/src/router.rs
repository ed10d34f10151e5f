//! # Route Registry
//!
//! Collects routable handlers into ordered routes. The registry does no
//! matching itself; the server binds its routes into a route table.

use crate::error::Result;
use crate::middleware::MiddlewareChain;
use crate::request::Request;
use crate::route::{Route, RouteMetadata};
use crate::server::{Handler, HandlerFuture, SharedHandler};
use std::sync::Arc;
use tracing::{debug, info};

/// A handler that knows where it is mounted and what decorates it
pub trait Routable: Handler {
    /// Prefix, version and name the handler is mounted at
    fn route_metadata(&self) -> RouteMetadata;

    /// Middleware applied around the handler, outermost first
    fn middlewares(&self) -> MiddlewareChain;
}

/// Shared routable handler
pub type SharedRoutable = Arc<dyn Routable>;

/// Exposes a routable as a plain terminal handler
struct Terminal(SharedRoutable);

impl Handler for Terminal {
    fn handle(&self, req: Request) -> HandlerFuture<'_> {
        self.0.handle(req)
    }
}

/// Ordered route registry
#[derive(Debug, Default, Clone)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Create a new empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one route per handler, in input order
    ///
    /// Duplicate paths are kept; the transport decides which binding wins.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if a handler's metadata is
    /// malformed. Routes registered before the failure are kept.
    pub fn register_all<I>(&mut self, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedRoutable>,
    {
        info!("Router initializing");
        for routable in handlers {
            let metadata = routable.route_metadata();
            metadata.validate()?;

            let middlewares = routable.middlewares();
            debug!(path = %metadata, middlewares = ?middlewares.names(), "Registering route");

            let terminal: SharedHandler = Arc::new(Terminal(routable));
            self.routes.push(Route::new(metadata, middlewares, terminal));
        }
        Ok(())
    }

    /// Registered routes in registration order
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if no routes are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::middleware::LoggingMiddleware;
    use crate::request::Method;
    use crate::server::Response;
    use std::collections::HashMap;

    struct Fixed {
        metadata: RouteMetadata,
        body: &'static str,
    }

    impl Handler for Fixed {
        fn handle(&self, _req: Request) -> HandlerFuture<'_> {
            Box::pin(async move { Response::text(self.body) })
        }
    }

    impl Routable for Fixed {
        fn route_metadata(&self) -> RouteMetadata {
            self.metadata.clone()
        }

        fn middlewares(&self) -> MiddlewareChain {
            let mut chain = MiddlewareChain::new();
            chain.add(LoggingMiddleware::new());
            chain
        }
    }

    fn fixed(name: &str, body: &'static str) -> SharedRoutable {
        Arc::new(Fixed {
            metadata: RouteMetadata::new("api", "v1", name),
            body,
        })
    }

    #[test]
    fn test_register_all_keeps_order_and_duplicates() {
        let mut router = Router::new();
        router
            .register_all([fixed("register", "a"), fixed("", "b"), fixed("register", "c")])
            .unwrap();

        let paths: Vec<String> = router.routes().iter().map(Route::path).collect();
        assert_eq!(paths, ["/api/v1/register", "/api/v1/", "/api/v1/register"]);
        assert_eq!(router.len(), 3);
        assert_eq!(router.routes()[0].middlewares().len(), 1);
    }

    #[test]
    fn test_register_all_rejects_malformed_metadata() {
        let bad: SharedRoutable = Arc::new(Fixed {
            metadata: RouteMetadata::new("", "v1", "login"),
            body: "x",
        });
        let mut router = Router::new();

        let err = router.register_all([fixed("login", "ok"), bad]).unwrap_err();
        assert!(matches!(err, Error::InvalidRoutePattern { .. }));
        assert_eq!(router.len(), 1);
    }

    #[tokio::test]
    async fn test_route_reaches_handler() {
        let mut router = Router::new();
        router.register_all([fixed("login", "login")]).unwrap();

        let req = Request::new(Method::Post, "/api/v1/login", HashMap::new());
        let response = router.routes()[0].composed_handler().handle(req).await;
        assert_eq!(response.body, "login");
    }

    #[test]
    fn test_empty_router() {
        let router = Router::new();
        assert!(router.is_empty());
        assert!(router.routes().is_empty());
    }
}
