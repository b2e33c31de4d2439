//! Connection manager: owns the socket and keeps it alive.
//!
//! Two tasks share one link to the server:
//!
//! ```text
//!             ┌──────────── reader task ────────────┐
//!  socket ──→ │ (re)connect with backoff, read frame │ ──→ Inbound channel
//!             └──────────────────────────────────────┘
//!  Outbox ──→ queue ──→ writer task ──→ current FrameWriter (if any)
//! ```
//!
//! The reader makes sure a connection exists before every read, so a drop
//! is retried without ending the loop. The write path never reconnects:
//! [`Outbox::send`] fails fast with [`SessionError::NotConnected`] while
//! the link is down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parley_backoff::{BackoffConfig, ExpBackoff};
use parley_transport::{
    FrameReader, FrameWriter, FramerConfig, TcpConnection, TransportError, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_FRAME_LEN,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::done::DoneListener;
use crate::SessionError;

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`.
    pub addr: String,
    /// Connect attempts before giving up for good.
    pub max_attempts: u64,
    /// Deadline for each socket read. Expiry is not an error.
    pub read_timeout: Duration,
    /// Deadline for writing one frame. A stalled write drops the link,
    /// and the reader then reconnects.
    pub write_timeout: Duration,
    pub max_frame_len: usize,
    pub backoff: BackoffConfig,
    /// Overrides the per-process peer id.
    pub peer_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8822".to_string(),
            max_attempts: 5,
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            backoff: BackoffConfig::default(),
            peer_id: None,
        }
    }
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    fn framer(&self) -> FramerConfig {
        FramerConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_frame_len: self.max_frame_len,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// What the connection manager reports to the session handler.
#[derive(Debug)]
pub enum Inbound {
    /// One complete frame from the server.
    Frame(Vec<u8>),
    /// The link broke; the reader is already reconnecting.
    Error(SessionError),
    /// A new connection replaced a broken one.
    Reconnected,
    /// Reconnecting failed for good. Nothing more will arrive.
    Fatal(SessionError),
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Sequential connect attempts governed by a backoff.
struct Connector {
    addr: String,
    framer: FramerConfig,
    max_attempts: u64,
    backoff: ExpBackoff,
}

impl Connector {
    fn new(config: &ClientConfig) -> Self {
        Self {
            addr: config.addr.clone(),
            framer: config.framer(),
            max_attempts: config.max_attempts.max(1),
            backoff: ExpBackoff::new(config.backoff.clone()),
        }
    }

    /// Dials until it succeeds or the attempt budget runs out. A success
    /// resets the backoff so the next outage starts from the minimum delay.
    async fn connect(&mut self) -> Result<TcpConnection, SessionError> {
        loop {
            match TcpConnection::connect(&self.addr, self.framer.clone()).await {
                Ok(conn) => {
                    self.backoff.reset();
                    tracing::info!(addr = %self.addr, conn_id = %conn.id(), "connected");
                    return Ok(conn);
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    let attempts = self.backoff.attempts();
                    if attempts >= self.max_attempts {
                        tracing::error!(addr = %self.addr, attempts, error = %e, "giving up");
                        return Err(SessionError::ConnectExhausted {
                            addr: self.addr.clone(),
                            attempts,
                            last: e,
                        });
                    }
                    tracing::warn!(
                        addr = %self.addr,
                        attempt = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "connect failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// The current write half, if connected.
struct Link {
    writer: Mutex<Option<FrameWriter<OwnedWriteHalf>>>,
    connected: AtomicBool,
}

impl Link {
    fn new() -> Self {
        Self {
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    async fn attach(&self, writer: FrameWriter<OwnedWriteHalf>) {
        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::Release);
    }

    async fn detach(&self) {
        self.connected.store(false, Ordering::Release);
        self.writer.lock().await.take();
    }
}

/// Cloneable handle for queueing outbound frames.
#[derive(Clone)]
pub struct Outbox {
    queue: mpsc::UnboundedSender<Vec<u8>>,
    link: Arc<Link>,
}

impl Outbox {
    /// Queues one encoded packet for the writer task. Never blocks on the
    /// network.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.queue.send(frame).map_err(|_| SessionError::Closed)
    }

    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// A live, self-healing connection to the chat server.
pub struct ConnectionManager {
    outbox: Outbox,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Connects (with backoff) and starts the reader and writer tasks.
    ///
    /// Returns the manager plus the channel of [`Inbound`] events. Both
    /// tasks stop once `done` is raised.
    pub async fn start(
        config: ClientConfig,
        done: DoneListener,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Inbound>), SessionError> {
        let mut connector = Connector::new(&config);
        let conn = connector.connect().await?;
        let (reader, writer) = conn.into_split();

        let link = Arc::new(Link::new());
        link.attach(writer).await;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(read_loop(
            connector,
            reader,
            Arc::clone(&link),
            events_tx.clone(),
            done.clone(),
        ));
        let writer_task = tokio::spawn(write_loop(queue_rx, Arc::clone(&link), events_tx, done));

        let manager = Self {
            outbox: Outbox {
                queue: queue_tx,
                link,
            },
            reader_task,
            writer_task,
        };
        Ok((manager, events_rx))
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Waits for both tasks to finish. Call after raising `done`.
    pub async fn join(self) {
        drop(self.outbox);
        if let Err(e) = self.writer_task.await {
            tracing::debug!(error = %e, "writer task ended abnormally");
        }
        if let Err(e) = self.reader_task.await {
            tracing::debug!(error = %e, "reader task ended abnormally");
        }
    }
}

/// Reads frames until `done`, reconnecting whenever the link drops.
async fn read_loop(
    mut connector: Connector,
    first: FrameReader<OwnedReadHalf>,
    link: Arc<Link>,
    events: mpsc::UnboundedSender<Inbound>,
    mut done: DoneListener,
) {
    let mut reader = Some(first);

    loop {
        if done.is_raised() {
            break;
        }

        if reader.is_none() {
            // Raising `done` abandons a reconnect in progress, backoff
            // sleep included, so shutdown never waits on a dead server.
            let conn = tokio::select! {
                result = connector.connect() => result,
                _ = done.wait() => break,
            };
            match conn {
                Ok(conn) => {
                    let (r, w) = conn.into_split();
                    link.attach(w).await;
                    reader = Some(r);
                    let _ = events.send(Inbound::Reconnected);
                }
                Err(e) => {
                    let _ = events.send(Inbound::Fatal(e));
                    break;
                }
            }
        }
        let Some(current) = reader.as_mut() else {
            continue;
        };

        let result = tokio::select! {
            result = current.read_frame() => result,
            _ = done.wait() => break,
        };

        match result {
            Ok(Some(frame)) => {
                if events.send(Inbound::Frame(frame)).is_err() {
                    break;
                }
            }
            Err(TransportError::Timeout) => continue,
            Ok(None) => {
                tracing::warn!("server closed the connection");
                reader = None;
                link.detach().await;
                let _ = events.send(Inbound::Error(SessionError::Transport(
                    TransportError::ConnectionClosed("closed by server".to_string()),
                )));
            }
            Err(e) => {
                tracing::warn!(error = %e, "read failed");
                reader = None;
                link.detach().await;
                let _ = events.send(Inbound::Error(e.into()));
            }
        }
    }
    tracing::debug!("reader task stopped");
}

/// Drains the outbound queue into whichever connection is current.
async fn write_loop(
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    link: Arc<Link>,
    events: mpsc::UnboundedSender<Inbound>,
    mut done: DoneListener,
) {
    loop {
        // Queued frames go out before the done signal is honoured, so a
        // farewell packet sent just before shutdown is not lost.
        let frame = tokio::select! {
            biased;
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = done.wait() => break,
        };

        let mut slot = link.writer.lock().await;
        let Some(writer) = slot.as_mut() else {
            tracing::debug!("dropping queued packet, not connected");
            let _ = events.send(Inbound::Error(SessionError::NotConnected));
            continue;
        };
        if let Err(e) = writer.write_frame(&frame).await {
            tracing::warn!(error = %e, "write failed");
            slot.take();
            link.connected.store(false, Ordering::Release);
            let _ = events.send(Inbound::Error(e.into()));
        }
    }

    if let Some(mut writer) = link.writer.lock().await.take() {
        let _ = writer.shutdown().await;
    }
    link.connected.store(false, Ordering::Release);
    tracing::debug!("writer task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.addr, "127.0.0.1:8822");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.write_timeout, Duration::from_secs(3));
        assert!(config.peer_id.is_none());
    }

    #[test]
    fn test_send_fails_fast_without_connection() {
        let (queue, mut rx) = mpsc::unbounded_channel();
        let outbox = Outbox {
            queue,
            link: Arc::new(Link::new()),
        };

        assert!(matches!(
            outbox.send(b"hi".to_vec()),
            Err(SessionError::NotConnected)
        ));
        assert!(rx.try_recv().is_err(), "nothing queued");
    }

    #[tokio::test]
    async fn test_connector_gives_up_after_max_attempts() {
        // Bind then drop so nothing listens on the port.
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let config = ClientConfig {
            max_attempts: 3,
            backoff: BackoffConfig {
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                factor: 2.0,
                jitter: 0.0,
            },
            ..ClientConfig::new(addr)
        };

        let mut connector = Connector::new(&config);
        match connector.connect().await {
            Err(SessionError::ConnectExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("nothing should be listening"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connector_restarts_backoff_after_success() {
        let dead = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let live = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            max_attempts: 3,
            backoff: BackoffConfig {
                min_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(10),
                factor: 2.0,
                jitter: 0.0,
            },
            ..ClientConfig::new(dead.clone())
        };
        let mut connector = Connector::new(&config);

        // First outage: 100 ms, 200 ms, then give up with the base at 800 ms.
        assert!(connector.connect().await.is_err());
        assert_eq!(connector.backoff.current_base(), Duration::from_millis(800));

        connector.addr = live.local_addr().unwrap().to_string();
        let _conn = connector.connect().await.unwrap();
        assert_eq!(connector.backoff.attempts(), 0);
        assert_eq!(connector.backoff.current_base(), Duration::from_millis(100));

        // Second outage waits 100 + 200 ms again, not 800 + 1600 ms.
        connector.addr = dead;
        let started = tokio::time::Instant::now();
        assert!(connector.connect().await.is_err());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300), "waited {waited:?}");
        assert!(waited < Duration::from_millis(800), "waited {waited:?}");
    }
}
