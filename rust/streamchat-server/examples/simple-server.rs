//! Minimal CLI to run the streamchat WebSocket server with the mock assistant
//!
//! Usage:
//!   cargo run -p streamchat-server --example simple-server -- [--host 127.0.0.1] [--port 8000]
//!   cargo run -p streamchat-server --example simple-server -- --addr 0.0.0.0:8000 --token secret --chunk-delay-ms 20
//!
//! Notes:
//! - Uses a single-thread Tokio runtime to match crate features.
//! - Without `--token` every handshake is accepted.

use clap::Parser;
use std::{error::Error, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use streamchat_server::{
    serve_incoming_with_config, HandshakeAuthArgs, HandshakeAuthFn, JoinArgs, ServerConfig,
};
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(
    name = "simple-server",
    about = "Streamchat WebSocket server with a mock assistant"
)]
struct Args {
    #[arg(short = 'a', long, value_name = "ADDR", conflicts_with_all = ["host", "port"], help = "Full socket address to bind, e.g. 0.0.0.0:8000")]
    addr: Option<String>,

    #[arg(
        short = 'H',
        long,
        default_value = "127.0.0.1",
        help = "Host to bind when --addr not provided"
    )]
    host: String,

    #[arg(
        short = 'p',
        long,
        default_value_t = 8000,
        help = "Port to bind when --addr not provided"
    )]
    port: u16,

    #[arg(short = 't', long, help = "Only accept handshakes carrying this token")]
    token: Option<String>,

    #[arg(long, default_value_t = 100, help = "Delay before each streamed word")]
    chunk_delay_ms: u64,

    #[arg(long, default_value_t = 1_000, help = "Delay before a complete reply")]
    reply_delay_ms: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();

    let args = Args::parse();
    let addr = args
        .addr
        .unwrap_or_else(|| format!("{}:{}", args.host, args.port));

    let handshake_auth: Option<Arc<HandshakeAuthFn>> = args.token.map(|expected| {
        Arc::new(move |auth: HandshakeAuthArgs<'_>| auth.token == Some(expected.as_str()))
            as Arc<HandshakeAuthFn>
    });

    let cfg = ServerConfig {
        handshake_auth,
        on_join: Some(Arc::new(|join: JoinArgs| {
            info!(conn_id = join.conn_id, room=%join.room, "client joined room");
        })),
        chunk_delay_ms: args.chunk_delay_ms,
        reply_delay_ms: args.reply_delay_ms,
        ..Default::default()
    };

    info!(%addr, "starting streamchat-server");
    info!("Press Ctrl-C to stop.");

    let listener = TcpListener::bind(&addr).await?;
    serve_incoming_with_config(listener, cfg).await
}
