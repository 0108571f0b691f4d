//! Two processes talking over one WebSocket connection.
//!
//! ```text
//! cargo run --example ipc_demo -- server --port 5000
//! cargo run --example ipc_demo -- client --url ws://127.0.0.1:5000
//! ```

use chanmux::{
    EventTransport, EventTransportAdapter, LifecycleEvent, Router, WsConfig, WsTransport,
    WsTransportListener,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(about = "Channel router demo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept one client and answer it
    Server {
        #[arg(long, default_value_t = 5000)]
        port: u16,
    },
    /// Connect, send a greeting and call `add`
    Client {
        #[arg(long, default_value = "ws://127.0.0.1:5000")]
        url: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AddRequest {
    a: i64,
    b: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    match Cli::parse().command {
        Command::Server { port } => run_server(port).await,
        Command::Client { url } => run_client(&url).await,
    }
}

async fn run_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = WsTransportListener::bind(addr, WsConfig::default()).await?;
    tracing::info!(%addr, "waiting for a client");

    let transport = listener.accept().await?;
    let router = Router::new(Arc::new(EventTransportAdapter::new(transport)));

    let replies = router.clone();
    router.on("test-channel", move |text: String| {
        tracing::info!(%text, "received on test-channel");
        let replies = replies.clone();
        tokio::spawn(async move {
            if let Err(e) = replies.emit("response-channel", &format!("echo: {}", text)).await {
                tracing::warn!(error = %e, "reply failed");
            }
        });
    });
    router.handle("add", |req: AddRequest| async move { Ok(req.a + req.b) });

    router.serve().await?;
    Ok(())
}

async fn run_client(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let transport = WsTransport::connect(url, WsConfig::default()).await?;
    let router = Router::new(Arc::new(EventTransportAdapter::new(transport)));

    router.on_lifecycle(|event| {
        if let LifecycleEvent::Disconnected { reason } = event {
            tracing::info!(?reason, "server went away");
        }
    });
    router.on("response-channel", |text: String| {
        tracing::info!(%text, "received on response-channel");
    });
    let handle = router.start()?;

    router.emit("test-channel", &"Hello from Rust!").await?;
    let sum: i64 = router.invoke("add", &AddRequest { a: 40, b: 2 }).await?;
    tracing::info!(sum, "add returned");

    router.transport().close().await?;
    handle.join().await?;
    Ok(())
}
