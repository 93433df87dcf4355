//! Demo host for `portal-proxy`.
//!
//! Loads a TOML host configuration, mounts one proxy (identity forwarding
//! hook plus an optional marker template page) and serves until SIGINT or
//! SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use portal_proxy::config::loader::load_host_config;
use portal_proxy::lifecycle::{shutdown_signal, Shutdown};
use portal_proxy::observability::logging::init_logging;
use portal_proxy::{HostConfig, HttpServer, IdentityForwarding, MarkerTemplate, Proxy, ProxyOptions};

#[derive(Debug, Parser)]
#[command(name = "portal-proxy", version, about = "Reverse proxy with template injection")]
struct Cli {
    /// Host configuration file (TOML).
    #[arg(short, long, default_value = "portal-proxy.toml")]
    config: PathBuf,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config: HostConfig = load_host_config(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    init_logging(&config.log_level);

    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        "portal-proxy starting"
    );

    let mut hook = IdentityForwarding::new();
    if let Some(cookie) = &config.session_cookie {
        hook = hook.strip_session_cookie(cookie.clone());
    }

    let mut options = ProxyOptions::new(config.proxy.clone()).before(hook);
    if let Some(page_path) = &config.template_page {
        let page = tokio::fs::read_to_string(page_path).await?;
        tracing::info!(template_page = %page_path.display(), "Template page loaded");
        options = options.template_engine(MarkerTemplate::from_page(page));
    }

    let proxy = Proxy::create(options)?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(proxy);
    let serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    shutdown_signal().await;
    shutdown.trigger();
    serving.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
