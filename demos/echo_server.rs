//! Plain TCP echo server for trying out the client.
//!
//! Run with: cargo run --example echo_server
//! Then connect with: cargo run --example echo_client

use std::error::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ADDR: &str = "127.0.0.1:9001";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let listener = TcpListener::bind(ADDR).await?;
    info!(addr = ADDR, "echo server listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        info!(%addr, "new connection");

        tokio::spawn(async move {
            match handle_connection(stream).await {
                Ok(bytes) => info!(%addr, bytes, "connection closed"),
                Err(e) => warn!(%addr, error = %e, "connection error"),
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream) -> std::io::Result<usize> {
    let mut buf = vec![0u8; 16 * 1024];
    let mut total = 0;
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        stream.write_all(&buf[..n]).await?;
        total += n;
    }
}
