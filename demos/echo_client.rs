//! Echo client driven by the connection's callbacks.
//!
//! Run the echo server first: cargo run --example echo_server
//! Then run: cargo run --example echo_client [address] [port]
//!
//! Set `RUST_LOG=rsconn=trace` to watch the event task.

use std::error::Error;
use std::time::Duration;

use rsconn::{Connection, Dispatcher, Endpoint, Handler};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

enum Event {
    Data(Vec<u8>),
    Disconnected(Option<rsconn::Error>),
}

struct Client {
    events: mpsc::UnboundedSender<Event>,
}

impl Handler for Client {
    fn on_connected(&mut self) -> rsconn::Result<()> {
        info!("connected");
        Ok(())
    }

    fn on_data_received(&mut self, data: &[u8]) -> rsconn::Result<()> {
        let _ = self.events.send(Event::Data(data.to_vec()));
        Ok(())
    }

    fn on_disconnected(&mut self, reason: Option<rsconn::Error>) -> rsconn::Result<()> {
        let _ = self.events.send(Event::Disconnected(reason));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args.next().map(|p| p.parse()).transpose()?.unwrap_or(9001);
    let endpoint = if address.contains(':') {
        Endpoint::ipv6(address, port)
    } else {
        Endpoint::ipv4(address, port)
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = Connection::new(Dispatcher::current()?, Client { events: tx });

    info!(%endpoint, "connecting");
    conn.connect(&endpoint, 5_000)?;

    // Queued until the handshake completes.
    let message = "Hello, TCP!";
    conn.send(message.as_bytes())?;
    conn.wait_connected().await?;

    let mut echoed = Vec::new();
    while echoed.len() < message.len() {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await? {
            Some(Event::Data(chunk)) => echoed.extend(chunk),
            Some(Event::Disconnected(reason)) => {
                return Err(format!("disconnected early: {reason:?}").into());
            }
            None => return Err("connection released".into()),
        }
    }
    info!(echo = %String::from_utf8_lossy(&echoed), "received");

    conn.disconnect(false).await?;
    if let Some(Event::Disconnected(reason)) = rx.recv().await {
        info!(?reason, "disconnected");
    }
    Ok(())
}
