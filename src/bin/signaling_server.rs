//! Standalone signaling server binary

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wsrtc_signaling::{SignalingConfig, SignalingServer, WebRtcEngineFactory};

#[derive(Parser, Debug)]
#[command(name = "signaling_server")]
#[command(about = "WebSocket WebRTC signaling server")]
struct Args {
    /// Address to bind the WebSocket listener to
    #[arg(long, env = "SIGNALING_BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: String,

    /// Port to listen on
    #[arg(long, env = "SIGNALING_PORT", default_value_t = 8080)]
    port: u16,

    /// Comma-separated ICE server URLs
    #[arg(
        long,
        env = "SIGNALING_ICE_SERVERS",
        default_value = "stun:stun.l.google.com:19302",
        value_delimiter = ','
    )]
    ice_servers: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = SignalingConfig {
        bind_addr: args.bind_addr,
        port: args.port,
        ice_servers: args.ice_servers,
    };

    info!(version = %wsrtc_signaling::version(), "starting signaling server");

    let server = SignalingServer::new(config, Arc::new(WebRtcEngineFactory))?;
    let handle = server.start().await?;
    info!("listening on {}", handle.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    handle.shutdown().await;

    Ok(())
}
