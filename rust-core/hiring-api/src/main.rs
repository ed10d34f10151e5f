//! Hiring API server
//!
//! Loads configuration from the environment (and `.env`), connects the
//! Postgres pools, binds the routes and serves until Ctrl-C.
//!
//! Environment variables:
//!   RUST_LOG      # Log filter (default: hiring_api=info,hiring_core=info)
//!   LOG_FORMAT    # `json` (default) or `pretty`

use anyhow::{anyhow, Context, Result};
use hiring_core::{Config, Container, PoolSettings, Server, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "hiring_api=info,hiring_core=info";

fn init_tracing() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let pretty =
        std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("pretty"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if pretty {
        builder.compact().try_init()
    } else {
        builder.json().try_init()
    };
    installed.map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = Config::from_env().context("failed to load configuration")?;
    let socket = config.app.socket_str();
    info!(version = %config.app.version, "Starting hiring API");

    let container = Container::init(config, PoolSettings::default())
        .await
        .context("failed to initialize dependencies")?;

    let served = serve(&container, &socket).await;
    container.shutdown().await;
    if let Err(e) = &served {
        error!("Server stopped with error: {:#}", e);
    }
    served
}

async fn serve(container: &Container, socket: &str) -> Result<()> {
    let router = container.router().context("failed to register routes")?;

    let address = tokio::net::lookup_host(socket)
        .await
        .with_context(|| format!("cannot resolve {socket}"))?
        .next()
        .ok_or_else(|| anyhow!("no address for {socket}"))?;

    let server = Server::new(
        ServerConfig {
            address,
            ..ServerConfig::default()
        },
        router.routes(),
    )?;
    server.serve().await?;
    Ok(())
}
