//! Loopback peers for connection testing.
//!
//! Provides a TestServer that accepts connections on a random port and
//! treats each one according to a [`PeerMode`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

/// How the server treats each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerMode {
    /// Write back everything read; close after the client's FIN.
    Echo,
    /// Read and discard everything.
    Sink,
    /// Accept and hold the connection open without reading or writing.
    Hold,
    /// Close right after accepting.
    Close,
}

pub struct TestServer {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    accepted: Arc<AtomicUsize>,
    received: Arc<AtomicUsize>,
}

impl TestServer {
    /// Spawn an echo server.
    pub async fn spawn() -> (Self, SocketAddr) {
        Self::spawn_with(PeerMode::Echo).await
    }

    pub async fn spawn_with(mode: PeerMode) -> (Self, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let accepted = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));

        let task = {
            let accepted = accepted.clone();
            let received = received.clone();
            tokio::spawn(async move {
                let mut peers = JoinSet::new();
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        result = listener.accept() => {
                            let Ok((stream, _)) = result else { continue };
                            accepted.fetch_add(1, Ordering::Relaxed);
                            peers.spawn(serve(stream, mode, received.clone()));
                        }
                    }
                }
                peers.shutdown().await;
            })
        };

        (
            Self {
                shutdown: Some(shutdown_tx),
                task,
                accepted,
                received,
            },
            addr,
        )
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Bytes read from all clients so far.
    pub fn received(&self) -> usize {
        self.received.load(Ordering::Relaxed)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

/// A listener that never accepts and whose accept queue is already full.
///
/// Further handshakes are dropped by the kernel, so a client connecting to
/// [`Backlogged::addr`] stays in the connecting phase until it gives up.
pub struct Backlogged {
    addr: SocketAddr,
    _listener: Socket,
    _fillers: Vec<Socket>,
}

impl Backlogged {
    pub async fn spawn() -> Self {
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
        listener.bind(&bind.into()).unwrap();
        // A zero backlog still queues one connection.
        listener.listen(0).unwrap();
        let addr = listener.local_addr().unwrap().as_socket().unwrap();

        let fillers = (0..3)
            .map(|_| {
                let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
                socket.set_nonblocking(true).unwrap();
                let _ = socket.connect(&addr.into());
                socket
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            addr,
            _listener: listener,
            _fillers: fillers,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

async fn serve(mut stream: TcpStream, mode: PeerMode, received: Arc<AtomicUsize>) {
    let mut buf = vec![0u8; 64 * 1024];
    match mode {
        PeerMode::Echo => loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    received.fetch_add(n, Ordering::Relaxed);
                    if stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        },
        PeerMode::Sink => loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    received.fetch_add(n, Ordering::Relaxed);
                }
            }
        },
        PeerMode::Hold => std::future::pending::<()>().await,
        PeerMode::Close => drop(stream),
    }
}
