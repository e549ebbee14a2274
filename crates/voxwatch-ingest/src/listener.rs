//! Telemetry listener.
//!
//! Binds a stream listener on port `P` and a datagram socket on `P + 1`.
//! Stream clients send newline-delimited records; each datagram is one
//! record. Both transports feed a single [`ListenerEvent`] channel.
//!
//! ## Example
//!
//! ```no_run
//! use voxwatch_core::ListenerConfig;
//! use voxwatch_ingest::{ListenerEvent, TelemetryListener};
//!
//! #[tokio::main]
//! async fn main() -> voxwatch_core::Result<()> {
//!     let (listener, mut rx) = TelemetryListener::bind(&ListenerConfig::default()).await?;
//!
//!     while let Some(event) = rx.recv().await {
//!         if let ListenerEvent::Record(record) = event {
//!             println!("{} bytes from {}", record.bytes.len(), record.peer);
//!         }
//!     }
//!
//!     listener.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use voxwatch_core::{ListenerConfig, Result, VoxError};

/// Default channel buffer size for listener events.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Largest datagram accepted.
const MAX_DATAGRAM_BYTES: usize = 65_535;

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Transport a record arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stream,
    Datagram,
}

/// One raw record, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub transport: Transport,
    pub peer: SocketAddr,
    /// Record bytes with surrounding whitespace trimmed
    pub bytes: Vec<u8>,
}

/// Events emitted by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// A complete record was received.
    Record(RawRecord),

    /// A stream client connected.
    ClientConnected { peer: SocketAddr },

    /// A stream client closed or failed. Other clients are unaffected.
    ClientDisconnected { peer: SocketAddr },
}

/// Running stream and datagram listeners.
pub struct TelemetryListener {
    stream_addr: SocketAddr,
    datagram_addr: SocketAddr,
    active: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl TelemetryListener {
    /// Bind both sockets and start serving.
    ///
    /// A bind failure on either transport is returned to the caller; nothing
    /// is retried.
    pub async fn bind(config: &ListenerConfig) -> Result<(Self, mpsc::Receiver<ListenerEvent>)> {
        let stream_addr = config.stream_addr();
        let tcp = TcpListener::bind(stream_addr)
            .await
            .map_err(|e| VoxError::listener_bind("stream", stream_addr, e))?;

        let datagram_addr = config.datagram_addr();
        let udp = UdpSocket::bind(datagram_addr)
            .await
            .map_err(|e| VoxError::listener_bind("datagram", datagram_addr, e))?;

        let stream_addr = tcp
            .local_addr()
            .map_err(|e| VoxError::listener_bind("stream", stream_addr, e))?;
        let datagram_addr = udp
            .local_addr()
            .map_err(|e| VoxError::listener_bind("datagram", datagram_addr, e))?;

        let (event_tx, event_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let active = Arc::new(AtomicUsize::new(0));

        let tasks = vec![
            tokio::spawn(accept_loop(
                tcp,
                event_tx.clone(),
                Arc::clone(&active),
                config.max_line_bytes,
                shutdown_rx.clone(),
            )),
            tokio::spawn(datagram_loop(udp, event_tx, shutdown_rx)),
        ];

        info!(%stream_addr, %datagram_addr, "telemetry listener started");

        Ok((
            Self {
                stream_addr,
                datagram_addr,
                active,
                shutdown_tx,
                tasks,
            },
            event_rx,
        ))
    }

    /// Bound stream address (resolves port 0).
    pub fn stream_addr(&self) -> SocketAddr {
        self.stream_addr
    }

    /// Bound datagram address (resolves port 0).
    pub fn datagram_addr(&self) -> SocketAddr {
        self.datagram_addr
    }

    /// Number of currently connected stream clients.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Close both sockets and every client connection.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("telemetry listener stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<ListenerEvent>,
    active: Arc<AtomicUsize>,
    max_line_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let guard = ConnectionGuard::new(Arc::clone(&active));
                    info!(%peer, "client connected");
                    if tx.send(ListenerEvent::ClientConnected { peer }).await.is_err() {
                        break;
                    }
                    let tx = tx.clone();
                    connections.spawn(async move {
                        read_records(stream, peer, &tx, max_line_bytes).await;
                        // Count must be settled before observers hear about the disconnect
                        drop(guard);
                        info!(%peer, "client disconnected");
                        let _ = tx.send(ListenerEvent::ClientDisconnected { peer }).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
}

async fn datagram_loop(
    socket: UdpSocket,
    tx: mpsc::Sender<ListenerEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    let bytes = buf[..len].trim_ascii();
                    if bytes.is_empty() {
                        continue;
                    }
                    let record = RawRecord {
                        transport: Transport::Datagram,
                        peer,
                        bytes: bytes.to_vec(),
                    };
                    if tx.send(ListenerEvent::Record(record)).await.is_err() {
                        break;
                    }
                }
                Err(e) => debug!(error = %e, "datagram receive failed"),
            },
        }
    }
}

/// Read newline-delimited records until EOF or an I/O error.
///
/// Only complete lines are forwarded: an unterminated tail at EOF is
/// discarded, and lines longer than `max_line_bytes` are skipped.
pub async fn read_records<R>(
    reader: R,
    peer: SocketAddr,
    tx: &mpsc::Sender<ListenerEvent>,
    max_line_bytes: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let limit = max_line_bytes as u64 + 1;

    loop {
        line.clear();
        let read = (&mut reader).take(limit).read_until(b'\n', &mut line).await;
        match read {
            Ok(0) => break,
            Ok(_) if line.last() != Some(&b'\n') => {
                if line.len() <= max_line_bytes {
                    // EOF in the middle of a line
                    debug!(%peer, bytes = line.len(), "discarding incomplete trailing record");
                    break;
                }
                warn!(%peer, max_line_bytes, "discarding over-long record");
                if !skip_line(&mut reader).await {
                    break;
                }
            }
            Ok(_) => {
                let bytes = line.trim_ascii();
                if bytes.is_empty() {
                    continue;
                }
                let record = RawRecord {
                    transport: Transport::Stream,
                    peer,
                    bytes: bytes.to_vec(),
                };
                if tx.send(ListenerEvent::Record(record)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(%peer, error = %e, "read error");
                break;
            }
        }
    }
}

/// Consume input up to and including the next newline.
///
/// Returns false if the stream ended first.
async fn skip_line<R>(reader: &mut BufReader<R>) -> bool
where
    R: AsyncRead + Unpin,
{
    loop {
        let (consumed, found) = match reader.fill_buf().await {
            Ok([]) | Err(_) => return false,
            Ok(available) => match available.iter().position(|b| *b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            },
        };
        reader.consume(consumed);
        if found {
            return true;
        }
    }
}

/// Keeps the active connection count accurate even when a task is aborted.
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
