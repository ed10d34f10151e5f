//! # HTTP Server
//!
//! Hyper/Tokio transport that binds registered routes and dispatches
//! requests to their composed handlers.
//!
//! ## Key Features
//!
//! - Explicit route table built from the registry (no global multiplexer)
//! - Paths ending in `/` also serve every unclaimed path below them
//! - Paths naming a subtree without its trailing slash redirect to it
//! - Graceful shutdown on Ctrl-C with bounded connection drain

use crate::error::{Error, Result};
use crate::request::Request;
use crate::route::Route;
use http_body_util::Full;
pub use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use matchit::Router as MatchitRouter;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, error, info, warn};

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

/// HTTP response produced by handlers and middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// Content type, omitted from the wire when `None`
    pub content_type: Option<String>,
    /// Additional response headers
    pub headers: HashMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self::empty(200)
    }
}

impl Response {
    /// Response with a status and no body
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            content_type: None,
            headers: HashMap::new(),
        }
    }

    /// Create a JSON response
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: Some("application/json".to_string()),
            ..Self::empty(200)
        }
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: Some("text/plain".to_string()),
            ..Self::empty(200)
        }
    }

    /// Response for a request-time error
    ///
    /// Validation failures carry their field errors as JSON; every other
    /// error is reported by status alone.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        let status = err.status_code().as_u16();
        match err {
            Error::Validation(errors) => Self::json(errors.to_json()).with_status(status),
            _ => Self::empty(status),
        }
    }

    /// Set status code
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set header (Content-Type is stored separately)
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = Some(value.to_string());
        } else {
            self.headers.insert(key.to_string(), value.to_string());
        }
    }

    fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let mut response = hyper::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let headers = response.headers_mut();
        if let Some(value) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            headers.insert(CONTENT_TYPE, value);
        }
        for (k, v) in &self.headers {
            match (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %k, "Dropping invalid response header"),
            }
        }
        response
    }
}

/// Future returned by [`Handler::handle`]
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Response> + Send + 'a>>;

/// Terminal or decorated request processor
pub trait Handler: Send + Sync {
    /// Process one request
    fn handle(&self, req: Request) -> HandlerFuture<'_>;
}

/// Handler shared between routes and connection tasks
pub type SharedHandler = Arc<dyn Handler>;

struct FnHandler<F>(F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, req: Request) -> HandlerFuture<'_> {
        Box::pin((self.0)(req))
    }
}

/// Wrap an async closure as a shared handler
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Composed handlers keyed by path, as bound at the transport
pub struct RouteTable {
    exact: MatchitRouter<usize>,
    subtrees: Vec<(String, usize)>,
    paths: Vec<String>,
    handlers: Vec<SharedHandler>,
}

impl RouteTable {
    /// Bind routes in order; a later route with the same path replaces the
    /// earlier binding
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if a path cannot be inserted.
    pub fn bind(routes: &[Route]) -> Result<Self> {
        let mut paths: Vec<String> = Vec::with_capacity(routes.len());
        let mut handlers: Vec<SharedHandler> = Vec::with_capacity(routes.len());

        for route in routes {
            let path = route.path();
            let handler = route.composed_handler();
            if let Some(i) = paths.iter().position(|p| *p == path) {
                warn!(path = %path, "Duplicate route, replacing earlier binding");
                handlers[i] = handler;
            } else {
                paths.push(path);
                handlers.push(handler);
            }
        }

        let mut exact = MatchitRouter::new();
        let mut subtrees = Vec::new();
        for (i, path) in paths.iter().enumerate() {
            exact
                .insert(path.clone(), i)
                .map_err(|e| Error::InvalidRoutePattern {
                    pattern: path.clone(),
                    reason: e.to_string(),
                })?;
            if path.ends_with('/') {
                subtrees.push((path.clone(), i));
            }
        }
        // Longest prefix wins
        subtrees.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(Self {
            exact,
            subtrees,
            paths,
            handlers,
        })
    }

    /// Handler bound to `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::RouteNotFound` if neither an exact path nor a
    /// subtree claims it.
    pub fn resolve(&self, path: &str) -> Result<&SharedHandler> {
        let index = self.exact.at(path).map(|m| *m.value).ok().or_else(|| {
            self.subtrees
                .iter()
                .find(|(prefix, _)| path.starts_with(prefix.as_str()))
                .map(|(_, i)| *i)
        });

        index
            .and_then(|i| self.handlers.get(i))
            .ok_or_else(|| Error::RouteNotFound {
                path: path.to_string(),
            })
    }

    /// Location to redirect to when `path` names a subtree root without
    /// its trailing slash
    #[must_use]
    pub fn redirect(&self, path: &str) -> Option<String> {
        let target = format!("{path}/");
        self.subtrees
            .iter()
            .any(|(prefix, _)| *prefix == target)
            .then_some(target)
    }

    /// Bound paths in registration order
    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

/// HTTP server over an explicit route table
pub struct Server {
    config: ServerConfig,
    table: Arc<RouteTable>,
}

impl Server {
    /// Bind `routes` into a new server
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the routes cannot be bound.
    pub fn new(config: ServerConfig, routes: &[Route]) -> Result<Self> {
        let table = RouteTable::bind(routes)?;
        for path in table.paths() {
            debug!(path = %path, "Bound route");
        }
        Ok(Self {
            config,
            table: Arc::new(table),
        })
    }

    /// Bind the server to an address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Address the server listens on
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.config.address
    }

    /// Serve until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound, or
    /// `Error::Io` if accepting connections fails.
    pub async fn serve(&self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then drain open connections
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound, or
    /// `Error::Io` if accepting connections fails.
    pub async fn serve_with_shutdown<S>(&self, signal: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        let listener = self.listen()?;
        self.serve_on(listener, signal).await
    }

    /// Bind a listener on the configured address
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound.
    pub fn listen(&self) -> Result<TcpListener> {
        let addr = self.config.address;
        let bind_error = |source| Error::BindError {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        socket.listen(1024).map_err(bind_error)
    }

    /// Serve connections from `listener` until `signal` resolves
    ///
    /// On shutdown every open connection is told to finish its current
    /// request and close; idle keep-alive connections close at once.
    /// Connections still open after `shutdown_timeout` are abandoned.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if accepting connections fails.
    pub async fn serve_on<S>(&self, listener: TcpListener, signal: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        match listener.local_addr() {
            Ok(addr) => info!("Server listening on http://{}", addr),
            Err(_) => info!("Server listening on http://{}", self.config.address),
        }

        let graceful = GracefulShutdown::new();
        let keep_alive = self.config.keep_alive;
        let max_body_size = self.config.max_body_size;
        tokio::pin!(signal);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let table = Arc::clone(&self.table);

                    let service = service_fn(move |req| {
                        let table = Arc::clone(&table);
                        async move {
                            Ok::<_, Infallible>(
                                handle_request(req, &table, remote_addr, max_body_size).await,
                            )
                        }
                    });
                    let conn = http1::Builder::new()
                        .keep_alive(keep_alive)
                        .serve_connection(io, service);
                    let conn = graceful.watch(conn);

                    tokio::task::spawn(async move {
                        if let Err(err) = conn.await {
                            error!("Error serving connection: {:?}", err);
                        }
                    });
                }
                () = &mut signal => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }
        drop(listener);

        tokio::select! {
            () = graceful.shutdown() => debug!("All connections closed"),
            () = tokio::time::sleep(self.config.shutdown_timeout) => {
                warn!("Shutdown timeout reached with connections still open");
            }
        }
        Ok(())
    }

    /// Dispatch a request without the network stack
    pub async fn dispatch(&self, req: Request) -> Response {
        dispatch(&self.table, req).await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Core request processing logic (network agnostic)
async fn dispatch(table: &RouteTable, req: Request) -> Response {
    match table.resolve(&req.path) {
        Ok(handler) => handler.handle(req).await,
        Err(e) => match table.redirect(&req.path) {
            Some(location) => Response::empty(301).with_header("location", &location),
            None => Response::from_error(&e),
        },
    }
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    table: &RouteTable,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let version = req.version();

    let response = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(request) => dispatch(table, request.with_remote_addr(remote_addr)).await,
        Err(e @ Error::PayloadTooLarge { .. }) => {
            warn!("Rejected request body: {}", e);
            Response::from_error(&e)
        }
        Err(e) => {
            warn!("Failed to read request: {}", e);
            Response::empty(400)
        }
    };

    debug!(
        "{} - \"{} {} {:?}\" {}",
        remote_addr, method, path, version, response.status
    );
    response.into_hyper()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareChain;
    use crate::request::Method;
    use crate::route::RouteMetadata;

    fn fixed(body: &'static str) -> SharedHandler {
        handler_fn(move |_req| async move { Response::text(body) })
    }

    fn route(name: &str, body: &'static str) -> Route {
        Route::new(
            RouteMetadata::new("api", "v1", name),
            MiddlewareChain::new(),
            fixed(body),
        )
    }

    fn get(path: &str) -> Request {
        Request::new(Method::Get, path, HashMap::new())
    }

    #[test]
    fn test_response_json() {
        let resp = Response::json(r#"{"status": "ok"}"#);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_response_with_status() {
        let resp = Response::text("Not Found").with_status(404);
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_response_from_error() {
        let resp = Response::from_error(&Error::Unauthorized {
            reason: "nope".into(),
        });
        assert_eq!(resp, Response::empty(401));
    }

    #[test]
    fn test_into_hyper_omits_missing_content_type() {
        let resp = Response::empty(204).with_header("x-request-id", "abc").into_hyper();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(resp.headers().get("x-request-id").unwrap(), "abc");
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert!(config.keep_alive);
    }

    #[tokio::test]
    async fn test_exact_and_subtree_resolution() {
        let routes = [route("", "info"), route("login", "login")];
        let server = Server::new(ServerConfig::default(), &routes).unwrap();

        assert_eq!(server.dispatch(get("/api/v1/login")).await.body, "login");
        assert_eq!(server.dispatch(get("/api/v1/")).await.body, "info");
        assert_eq!(server.dispatch(get("/api/v1/unknown/deep")).await.body, "info");
        assert_eq!(server.dispatch(get("/api/v1/%6Cogin")).await.body, "login");

        let redirect = server.dispatch(get("/api/v1")).await;
        assert_eq!(redirect.status, 301);
        assert_eq!(redirect.headers.get("location").map(String::as_str), Some("/api/v1/"));
        assert_eq!(server.dispatch(get("/api/v2/login")).await.status, 404);
    }

    #[tokio::test]
    async fn test_duplicate_path_last_binding_wins() {
        let routes = [route("login", "first"), route("login", "second")];
        let table = RouteTable::bind(&routes).unwrap();

        assert_eq!(table.paths(), ["/api/v1/login".to_string()]);
        let handler = table.resolve("/api/v1/login").unwrap();
        assert_eq!(handler.handle(get("/api/v1/login")).await.body, "second");
    }

    #[tokio::test]
    async fn test_serve_with_shutdown_stops() {
        let server = Server::new(ServerConfig::default(), &[route("login", "login")])
            .unwrap()
            .bind(([127, 0, 0, 1], 0).into());
        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }

    struct Running {
        addr: SocketAddr,
        stop: tokio::sync::oneshot::Sender<()>,
        task: tokio::task::JoinHandle<Result<()>>,
    }

    fn start(config: ServerConfig, routes: &[Route]) -> Running {
        let server = Server::new(config, routes)
            .unwrap()
            .bind(([127, 0, 0, 1], 0).into());
        let listener = server.listen().unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve_on(listener, async {
                    let _ = stopped.await;
                })
                .await
        });
        Running { addr, stop, task }
    }

    /// Send one raw HTTP/1.1 request and read until the server closes
    async fn exchange(addr: SocketAddr, method: &str, path: &str, extra: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let raw = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n{extra}\r\n"
        );
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn echo_peer() -> Route {
        Route::new(
            RouteMetadata::new("api", "v1", "peer"),
            MiddlewareChain::new(),
            handler_fn(|req: Request| async move {
                let peer = req.remote_addr.map(|addr| addr.ip().to_string());
                Response::text(format!("{} {}", req.method, peer.unwrap_or_default()))
            }),
        )
    }

    #[tokio::test]
    async fn test_socket_any_method_reaches_handler() {
        let running = start(ServerConfig::default(), &[route("", "info"), echo_peer()]);

        for method in ["POST", "TRACE", "PURGE"] {
            let response = exchange(running.addr, method, "/api/v1/peer", "").await;
            assert!(response.starts_with("HTTP/1.1 200"), "{method}: {response}");
            assert!(response.ends_with(&format!("{method} 127.0.0.1")), "{response}");
        }

        let missing = exchange(running.addr, "PURGE", "/nowhere", "").await;
        assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

        let redirect = exchange(running.addr, "GET", "/api/v1", "").await;
        assert!(redirect.starts_with("HTTP/1.1 301"), "{redirect}");
        assert!(redirect.to_ascii_lowercase().contains("location: /api/v1/"));

        running.stop.send(()).unwrap();
        running.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_socket_rejects_oversized_body() {
        let config = ServerConfig {
            max_body_size: 16,
            ..ServerConfig::default()
        };
        let running = start(config, &[echo_peer()]);

        let response = exchange(running.addr, "POST", "/api/v1/peer", "Content-Length: 64\r\n").await;
        assert!(response.starts_with("HTTP/1.1 413"), "{response}");

        running.stop.send(()).unwrap();
        running.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_keep_alive() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let config = ServerConfig {
            shutdown_timeout: Duration::from_secs(10),
            ..ServerConfig::default()
        };
        let running = start(config, &[route("login", "login")]);

        let mut stream = tokio::net::TcpStream::connect(running.addr).await.unwrap();
        stream
            .write_all(b"POST /api/v1/login HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0_u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(buf[..n].starts_with(b"HTTP/1.1 200"));

        let started = std::time::Instant::now();
        running.stop.send(()).unwrap();
        running.task.await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        // Server side of the idle connection is closed
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }
}
