//! Accept loop.
//!
//! Binds the listening socket with an explicit backlog, takes a worker
//! permit before every `accept()`, and spawns one [`ConnectionHandler`] per
//! connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::handler::ConnectionHandler;
use crate::{ACCEPT_ERROR_BACKOFF, ServerError};

/// The fileport TCP server.
pub struct FileServer {
    listener: TcpListener,
    config: ServerConfig,
    local_addr: SocketAddr,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl FileServer {
    /// Creates the storage root and binds the listening socket.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        tokio::fs::create_dir_all(&config.storage_root).await?;

        let socket = if config.bind_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(config.bind_addr)?;
        let listener = socket.listen(config.backlog)?;

        let local_addr = listener.local_addr()?;
        tracing::info!(
            "fileport server listening on {local_addr} (root: {}, max connections: {})",
            config.storage_root.display(),
            config.max_connections
        );

        Ok(Self {
            listener,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
            config,
            local_addr,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops accepting and closes idle connections.
    ///
    /// Transfers already in progress run to completion or until they stall.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the accept loop until shutdown, then waits for every handler.
    pub async fn run(&self) -> Result<(), ServerError> {
        loop {
            // Take a slot first: while all slots are busy, new clients
            // stay queued in the kernel backlog.
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let (stream, peer_addr) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.listener.accept() => match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
            };

            tracing::info!(%peer_addr, "client connected");
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(%peer_addr, "set_nodelay failed: {e}");
            }

            let handler = ConnectionHandler::new(peer_addr, &self.config, self.cancel.clone());
            self.tracker.spawn(async move {
                let _permit = permit;
                let (reader, writer) = stream.into_split();
                if let Err(e) = handler.run(reader, writer).await {
                    tracing::error!(%peer_addr, "connection error: {e}");
                }
            });
        }

        tracing::info!("server shutting down");
        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use fileport_protocol::{GetResponse, Status, read_get_response, read_status};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    fn test_config(root: &std::path::Path) -> ServerConfig {
        ServerConfig {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            storage_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    async fn start(config: ServerConfig) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let server = FileServer::bind(config).await.unwrap();
        let addr = server.local_addr();
        let cancel = server.shutdown_token();
        let handle = tokio::spawn(async move {
            server.run().await.unwrap();
        });
        (addr, cancel, handle)
    }

    #[tokio::test]
    async fn binds_dynamic_port_and_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let server = FileServer::bind(test_config(&root)).await.unwrap();

        assert!(server.local_addr().port() > 0);
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn serves_get_over_tcp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.txt"), b"abc").unwrap();
        let (addr, cancel, handle) = start(test_config(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET report.txt\n").await.unwrap();
        let mut buf = [0u8; 23];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"00000000000000000003abc");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn connections_beyond_the_cap_wait_for_a_slot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let config = ServerConfig {
            max_connections: 1,
            ..test_config(dir.path())
        };
        let (addr, cancel, handle) = start(config).await;

        // Occupies the only slot.
        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(b"GET a.txt\n").await.unwrap();
        let mut buf = [0u8; 21];
        first.read_exact(&mut buf).await.unwrap();

        // Completes the TCP handshake via the backlog but is not served yet.
        let second = TcpStream::connect(addr).await.unwrap();
        let (r, mut w) = second.into_split();
        let mut r = BufReader::new(r);
        w.write_all(b"GET a.txt\n").await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(200), read_get_response(&mut r)).await;
        assert!(waiting.is_err(), "second client served while the cap was reached");

        drop(first);
        let resp = tokio::time::timeout(Duration::from_secs(5), read_get_response(&mut r))
            .await
            .expect("second client never served")
            .unwrap();
        assert_eq!(resp, GetResponse::Data(1));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_uploads_to_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, cancel, handle) = start(test_config(dir.path())).await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            tasks.push(tokio::spawn(async move {
                let stream = TcpStream::connect(addr).await.unwrap();
                let (r, mut w) = stream.into_split();
                let mut r = BufReader::new(r);
                w.write_all(format!("NEW file{i}.txt\n").as_bytes()).await.unwrap();
                assert_eq!(read_status(&mut r).await.unwrap(), Status::Ready);

                let body = format!("content {i}");
                w.write_all(&fileport_protocol::encode_length(body.len() as u64).unwrap())
                    .await
                    .unwrap();
                w.write_all(body.as_bytes()).await.unwrap();
                assert!(matches!(read_status(&mut r).await.unwrap(), Status::Stored(_)));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for i in 0..8 {
            let content = std::fs::read_to_string(dir.path().join(format!("file{i}.txt"))).unwrap();
            assert_eq!(content, format!("content {i}"));
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_idle_clients_and_returns() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, cancel, handle) = start(test_config(dir.path())).await;

        let mut idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap();

        let mut buf = [0u8; 1];
        // Closed by the server: EOF, or a reset if it was never accepted.
        assert!(matches!(idle.read(&mut buf).await, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn run_returns_once_shut_down() {
        let dir = tempfile::tempdir().unwrap();
        let server = FileServer::bind(test_config(dir.path())).await.unwrap();

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), server.run())
            .await
            .expect("server did not stop")
            .unwrap();
    }
}
