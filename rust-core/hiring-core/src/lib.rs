//! # Hiring Core
//!
//! Library behind the hiring API: configuration, the read/write Postgres
//! connector, middleware, the route registry, handlers and the HTTP server.
//!
//! ## Startup
//!
//! `Config` → `Container` (connects both pools, wires handlers) →
//! `Router` → `Server`.
//!
//! ## Modules
//!
//! - `config` - Environment-driven, validated settings
//! - `database` - Read/write Postgres pools via SQLx
//! - `middleware` - Logging and authentication decorators
//! - `route` - Route metadata and composed handlers
//! - `router` - Ordered route registry
//! - `handlers` - Info, register and login handlers
//! - `container` - Dependency wiring
//! - `server` - HTTP server built on Hyper
//! - `request` - HTTP request with headers, query and identity
//! - `entity` - Domain records
//! - `validation` - Structured validation errors
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod container;
pub mod database;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod route;
pub mod router;
pub mod server;
pub mod validation;

pub use config::{AppConfig, ClusterConfig, Config, ConnectionConfig};
pub use container::Container;
pub use database::{ClusterConnector, PoolSettings, Role};
pub use error::{Error, Result};
pub use middleware::{
    AuthenticateMiddleware, CredentialValidator, DenyAll, Identity, JwtValidator,
    LoggingMiddleware, Middleware, MiddlewareChain,
};
pub use request::{Method, Request};
pub use route::{Route, RouteMetadata};
pub use router::{Routable, Router};
pub use server::{Handler, Response, Server, ServerConfig};
pub use validation::{FieldError, ValidationCode, ValidationErrors, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
