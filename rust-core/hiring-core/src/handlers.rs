//! # Handlers
//!
//! Terminal request processors mounted under `/api/v1/`.

use crate::database::ClusterConnector;
use crate::middleware::MiddlewareChain;
use crate::request::Request;
use crate::route::{RouteMetadata, API_PREFIX, ROUTE_INFO, ROUTE_LOGIN, ROUTE_REGISTER, V1};
use crate::router::Routable;
use crate::server::{Handler, HandlerFuture, Response};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

#[derive(Serialize)]
struct InfoBody<'a> {
    version: &'a str,
}

/// Reports the running application version
pub struct InfoHandler {
    version: String,
    middlewares: MiddlewareChain,
}

impl InfoHandler {
    /// Create an info handler reporting `version`
    pub fn new(version: impl Into<String>, middlewares: MiddlewareChain) -> Self {
        Self {
            version: version.into(),
            middlewares,
        }
    }
}

impl Handler for InfoHandler {
    fn handle(&self, _req: Request) -> HandlerFuture<'_> {
        Box::pin(async move {
            match serde_json::to_string(&InfoBody {
                version: &self.version,
            }) {
                Ok(body) => Response::json(body),
                Err(e) => {
                    error!("Failed to encode info body: {}", e);
                    Response::empty(500)
                }
            }
        })
    }
}

impl Routable for InfoHandler {
    fn route_metadata(&self) -> RouteMetadata {
        RouteMetadata::new(API_PREFIX, V1, ROUTE_INFO)
    }

    fn middlewares(&self) -> MiddlewareChain {
        self.middlewares.clone()
    }
}

/// Accepts registrations; currently answers 200 with an empty body
pub struct RegisterHandler {
    connector: Arc<ClusterConnector>,
    middlewares: MiddlewareChain,
}

impl RegisterHandler {
    /// Create a register handler backed by `connector`
    #[must_use]
    pub fn new(connector: Arc<ClusterConnector>, middlewares: MiddlewareChain) -> Self {
        Self {
            connector,
            middlewares,
        }
    }

    /// Pools available to the handler
    #[must_use]
    pub fn connector(&self) -> &ClusterConnector {
        &self.connector
    }
}

impl Handler for RegisterHandler {
    fn handle(&self, _req: Request) -> HandlerFuture<'_> {
        Box::pin(async { Response::empty(200).with_header("content-type", "application/json") })
    }
}

impl Routable for RegisterHandler {
    fn route_metadata(&self) -> RouteMetadata {
        RouteMetadata::new(API_PREFIX, V1, ROUTE_REGISTER)
    }

    fn middlewares(&self) -> MiddlewareChain {
        self.middlewares.clone()
    }
}

/// Accepts logins; currently answers 200 with an empty body
pub struct LoginHandler {
    connector: Arc<ClusterConnector>,
    middlewares: MiddlewareChain,
}

impl LoginHandler {
    /// Create a login handler backed by `connector`
    #[must_use]
    pub fn new(connector: Arc<ClusterConnector>, middlewares: MiddlewareChain) -> Self {
        Self {
            connector,
            middlewares,
        }
    }

    /// Pools available to the handler
    #[must_use]
    pub fn connector(&self) -> &ClusterConnector {
        &self.connector
    }
}

impl Handler for LoginHandler {
    fn handle(&self, _req: Request) -> HandlerFuture<'_> {
        Box::pin(async { Response::empty(200).with_header("content-type", "application/json") })
    }
}

impl Routable for LoginHandler {
    fn route_metadata(&self) -> RouteMetadata {
        RouteMetadata::new(API_PREFIX, V1, ROUTE_LOGIN)
    }

    fn middlewares(&self) -> MiddlewareChain {
        self.middlewares.clone()
    }
}
