use std::sync::Arc;
use async_trait::async_trait;
use clap::Parser;
use clap_derive::Parser;
use qosnet::config::{ConnectionConfig, QosType};
use qosnet::connection::Connection;
use qosnet::connection_request::ConnectionRequest;
use qosnet::event_listener::EventListener;
use qosnet::listener::Listener;
use qosnet::system_packets::DisconnectReason;
use tracing::{info, warn, Level};

/// Accepts every client and echoes all messages back on the channel they arrived on
struct EchoServer;

#[async_trait]
impl EventListener for EchoServer {
    async fn on_connection_request(&self, request: ConnectionRequest) {
        info!("connection request from {:?}", request.remote_addr());
        if request.accept().await.is_none() {
            warn!("could not accept connection from {:?}", request.remote_addr());
        }
    }

    async fn on_client_connected(&self, connection: Arc<Connection>) {
        info!("client #{} connected from {:?}", connection.connection_id(), connection.remote_addr());
    }

    async fn on_client_disconnected(&self, connection: Arc<Connection>, reason: DisconnectReason) {
        info!("client #{} disconnected: {:?}", connection.connection_id(), reason);
    }

    async fn on_network_receive(&self, connection: Arc<Connection>, data: &[u8], channel_id: u8) {
        info!("received {} bytes from client #{} on channel {}", data.len(), connection.connection_id(), channel_id);
        if let Err(e) = connection.send(channel_id, data).await {
            warn!("echo to client #{} failed: {}", connection.connection_id(), e);
        }
    }
}

#[derive(Parser)]
struct Args {
    #[clap(default_value = "0.0.0.0:8888")]
    bind_address: String,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let config = ConnectionConfig::with_channels(vec![
        QosType::Reliable,
        QosType::Unreliable,
        QosType::UnreliableSequenced,
        QosType::ReliableSequenced,
        QosType::ReliableFragmented,
    ]);

    let mut listener = Listener::bind(args.bind_address.as_str(), config, Arc::new(EchoServer)).await?;
    info!("echo server listening on {:?}", listener.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    listener.stop().await;
    Ok(())
}
