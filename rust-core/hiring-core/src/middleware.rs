//! # Middleware System
//!
//! Handler decoration for logging and authentication.
//!
//! A middleware takes the next handler and returns a new one with the same
//! contract. It may forward the request unchanged, forward it with added
//! context, or answer on its own without forwarding.

use crate::error::{Error, Result};
use crate::request::Request;
use crate::server::{Handler, HandlerFuture, Response, SharedHandler};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Wraps a handler to add cross-cutting behavior
pub trait Middleware: Send + Sync {
    /// Return a handler that runs this middleware around `next`
    fn wrap(&self, next: SharedHandler) -> SharedHandler;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Middleware shared between routes
pub type SharedMiddleware = Arc<dyn Middleware>;

/// Ordered middleware list; the first entry wraps outermost
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<SharedMiddleware>,
}

impl MiddlewareChain {
    /// Create a new empty middleware chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the end of the chain
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Add an already shared middleware to the end of the chain
    pub fn add_shared(&mut self, middleware: SharedMiddleware) {
        self.middlewares.push(middleware);
    }

    /// Wrap `handler` so that the first middleware sees the request first:
    /// `[m1, m2, m3]` around `h` yields `m1(m2(m3(h)))`
    #[must_use]
    pub fn then(&self, handler: SharedHandler) -> SharedHandler {
        self.middlewares
            .iter()
            .rev()
            .fold(handler, |next, mw| mw.wrap(next))
    }

    /// Middleware names, outermost first
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|mw| mw.name()).collect()
    }

    /// Get the number of middlewares
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Check if chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl FromIterator<SharedMiddleware> for MiddlewareChain {
    fn from_iter<I: IntoIterator<Item = SharedMiddleware>>(iter: I) -> Self {
        Self {
            middlewares: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Logs remote address, method and path, then forwards
#[derive(Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        Arc::new(Logged { next })
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

struct Logged {
    next: SharedHandler,
}

impl Handler for Logged {
    fn handle(&self, req: Request) -> HandlerFuture<'_> {
        Box::pin(async move {
            let remote_addr = req
                .remote_addr
                .map_or_else(|| "-".to_string(), |addr| addr.to_string());
            let method = req.method.clone();
            let path = req.path.clone();
            info!(
                remote_addr = %remote_addr,
                method = %method,
                path = %path,
                "Request received"
            );

            let response = self.next.handle(req).await;
            debug!(method = %method, path = %path, status = response.status, "Response sent");
            response
        })
    }
}

/// Authenticated caller attached to a request
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Stable subject identifier (user id)
    pub subject: String,
    /// Every claim the credential carried
    pub claims: Value,
}

/// Decides whether a request carries acceptable credentials
pub trait CredentialValidator: Send + Sync {
    /// Identity for the request's credentials
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized` when credentials are missing or invalid.
    fn validate(&self, req: &Request) -> Result<Identity>;
}

/// Rejects every request; the default until real credentials exist
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl CredentialValidator for DenyAll {
    fn validate(&self, _req: &Request) -> Result<Identity> {
        Err(Error::Unauthorized {
            reason: "credential validation is not configured".to_string(),
        })
    }
}

/// HS256 bearer tokens signed with a shared secret
#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Create a validator from a shared secret
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl CredentialValidator for JwtValidator {
    fn validate(&self, req: &Request) -> Result<Identity> {
        let token = req.bearer_token().ok_or_else(|| Error::Unauthorized {
            reason: "missing bearer token".to_string(),
        })?;

        let data = decode::<Value>(token, &self.decoding_key, &self.validation).map_err(|e| {
            Error::Unauthorized {
                reason: format!("invalid token: {e}"),
            }
        })?;

        let subject = data
            .claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Unauthorized {
                reason: "token has no subject".to_string(),
            })?
            .to_string();

        Ok(Identity {
            subject,
            claims: data.claims,
        })
    }
}

/// Attaches the caller's identity, or answers 401 without forwarding
#[derive(Clone)]
pub struct AuthenticateMiddleware {
    validator: Arc<dyn CredentialValidator>,
}

impl Default for AuthenticateMiddleware {
    fn default() -> Self {
        Self::new(Arc::new(DenyAll))
    }
}

impl AuthenticateMiddleware {
    /// Create an authenticate middleware backed by `validator`
    #[must_use]
    pub fn new(validator: Arc<dyn CredentialValidator>) -> Self {
        Self { validator }
    }
}

impl Middleware for AuthenticateMiddleware {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        Arc::new(Authenticated {
            next,
            validator: Arc::clone(&self.validator),
        })
    }

    fn name(&self) -> &'static str {
        "AuthenticateMiddleware"
    }
}

struct Authenticated {
    next: SharedHandler,
    validator: Arc<dyn CredentialValidator>,
}

impl Handler for Authenticated {
    fn handle(&self, mut req: Request) -> HandlerFuture<'_> {
        Box::pin(async move {
            match self.validator.validate(&req) {
                Ok(identity) => {
                    debug!(subject = %identity.subject, path = %req.path, "Authenticated");
                    req.identity = Some(identity);
                    self.next.handle(req).await
                }
                Err(e) => {
                    debug!(path = %req.path, "Rejected: {}", e);
                    Response::from_error(&e)
                }
            }
        })
    }
}
