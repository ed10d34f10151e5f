//! # Route Metadata
//!
//! A route couples a `/{prefix}/{version}/{name}` path with a terminal
//! handler and the middleware that decorates it.

use crate::error::{Error, Result};
use crate::middleware::MiddlewareChain;
use crate::server::SharedHandler;
use std::fmt;

/// Path prefix shared by every API route
pub const API_PREFIX: &str = "api";
/// First API version
pub const V1: &str = "v1";
/// Second API version
pub const V2: &str = "v2";

/// Info route name (the version root)
pub const ROUTE_INFO: &str = "";
/// Registration route name
pub const ROUTE_REGISTER: &str = "register";
/// Login route name
pub const ROUTE_LOGIN: &str = "login";

/// Prefix, version and name of a route
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteMetadata {
    /// Path prefix (e.g. `api`)
    pub prefix: String,
    /// API version (e.g. `v1`)
    pub version: String,
    /// Route name; empty for the version root
    pub name: String,
}

impl RouteMetadata {
    /// Create route metadata
    pub fn new(
        prefix: impl Into<String>,
        version: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            version: version.into(),
            name: name.into(),
        }
    }

    /// Full path; an empty name leaves a trailing slash
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}/{}/{}", self.prefix, self.version, self.name)
    }

    /// Check that the metadata forms a well-shaped path
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` for an empty prefix or version,
    /// or a segment containing `/`.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.prefix.is_empty() {
            Some("prefix is empty")
        } else if self.version.is_empty() {
            Some("version is empty")
        } else if [&self.prefix, &self.version, &self.name]
            .iter()
            .any(|segment| segment.contains('/'))
        {
            Some("segment contains '/'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidRoutePattern {
                pattern: self.path(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for RouteMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Registered route: metadata, middleware and terminal handler
#[derive(Clone)]
pub struct Route {
    metadata: RouteMetadata,
    middlewares: MiddlewareChain,
    handler: SharedHandler,
}

impl Route {
    /// Create a route
    #[must_use]
    pub fn new(metadata: RouteMetadata, middlewares: MiddlewareChain, handler: SharedHandler) -> Self {
        Self {
            metadata,
            middlewares,
            handler,
        }
    }

    /// Full request path
    #[must_use]
    pub fn path(&self) -> String {
        self.metadata.path()
    }

    /// Terminal handler wrapped in this route's middleware
    ///
    /// Built fresh on every call.
    #[must_use]
    pub fn composed_handler(&self) -> SharedHandler {
        self.middlewares.then(self.handler.clone())
    }

    /// Route metadata
    #[must_use]
    pub const fn metadata(&self) -> &RouteMetadata {
        &self.metadata
    }

    /// Middleware, outermost first
    #[must_use]
    pub const fn middlewares(&self) -> &MiddlewareChain {
        &self.middlewares
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path())
            .field("middlewares", &self.middlewares)
            .finish_non_exhaustive()
    }
}
