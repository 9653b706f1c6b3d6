//! HTTP dashboard for managing an nginx forward-proxy whitelist

use anyhow::{Context, Result};
use clap::Parser;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use whitelist_apply::{CommonArgs, ConfigLoader, WhitelistService};

mod api;

#[derive(Parser, Debug)]
#[command(name = "whitelist-dashboard")]
#[command(about = "REST dashboard for nginx forward-proxy whitelist groups", version)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Address to listen on (overrides settings)
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.common.verbose { "debug" } else { "info" };
    let filter = std::env::var("WHITELIST_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = ConfigLoader::load_or_default(args.common.config.clone())
        .context("Failed to load settings")?;
    if let Some(path) = args.common.nginx_config {
        settings.nginx.config_path = path;
    }
    let listen = args.listen.unwrap_or_else(|| settings.dashboard.listen.clone());
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid listen address {:?}", listen))?;

    let service = Arc::new(
        WhitelistService::from_settings(&settings).context("Failed to set up whitelist service")?,
    );
    tracing::info!(
        "Managing {:?} with the {} scheme, groups in {:?}",
        settings.nginx.config_path,
        settings.rules.scheme,
        settings.dashboard.groups_file
    );

    run_http_server(addr, service).await
}

async fn run_http_server(addr: SocketAddr, service: Arc<WhitelistService>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Dashboard listening on http://{}", addr);

    loop {
        let (socket, peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        };
        tracing::debug!("Client connected: {}", peer_addr);

        let service = service.clone();
        // Spawn a task to handle this connection
        tokio::spawn(async move {
            let handler = service_fn(move |req: Request<Incoming>| api::handle(service.clone(), req));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(socket), handler)
                .await
            {
                tracing::warn!("Error serving {}: {}", peer_addr, e);
            }
        });
    }
}
