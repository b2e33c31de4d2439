//! `ChatServer` builder and server loop.
//!
//! This is the entry point for running a Parley chat server. It ties
//! together all the layers: transport → protocol → dispatcher → rooms.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parley_protocol::CborCodec;
use parley_room::{RoomError, RoomRegistry, DEFAULT_ID_ATTEMPTS};
use parley_transport::{
    FramerConfig, TcpTransport, Transport, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FRAME_LEN,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::dispatch::Dispatcher;
use crate::handler::handle_connection;
use crate::ParleyError;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) dispatcher: Dispatcher<CborCodec>,
    /// Connection tasks report unrecoverable errors here.
    pub(crate) fatal: mpsc::UnboundedSender<RoomError>,
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Deadline for each socket read. Expiry only re-checks for shutdown.
    pub read_timeout: Duration,
    /// Deadline for writing one frame to a client. A client that stops
    /// reading is dropped once it passes.
    pub write_timeout: Duration,
    pub max_frame_len: usize,
    /// Fresh room ids tried per `BookRoom` before giving up.
    pub room_id_attempts: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8822".to_string(),
            read_timeout: Duration::from_secs(20),
            write_timeout: Duration::from_secs(20),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            room_id_attempts: DEFAULT_ID_ATTEMPTS,
        }
    }
}

/// Builder for configuring and starting a Parley server.
///
/// # Example
///
/// ```rust,ignore
/// use parley::prelude::*;
///
/// let server = ChatServer::builder()
///     .bind("0.0.0.0:8822")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ChatServerBuilder {
    config: ServerConfig,
    id_generator: Option<Box<dyn Fn() -> String + Send + Sync>>,
}

impl ChatServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            id_generator: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    pub fn room_id_attempts(mut self, attempts: usize) -> Self {
        self.config.room_id_attempts = attempts;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the random room id generator.
    pub fn room_id_generator(
        mut self,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.id_generator = Some(Box::new(generator));
        self
    }

    /// Binds the listener and builds the server.
    pub async fn build(self) -> Result<ChatServer, ParleyError> {
        let framer = FramerConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_frame_len: self.config.max_frame_len,
            read_timeout: self.config.read_timeout,
            write_timeout: self.config.write_timeout,
        };
        let transport = TcpTransport::bind(&self.config.bind_addr, framer).await?;

        let mut registry = RoomRegistry::new().with_id_attempts(self.config.room_id_attempts);
        if let Some(generator) = self.id_generator {
            registry = registry.with_id_generator(generator);
        }

        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let state = Arc::new(ServerState {
            dispatcher: Dispatcher::new(registry, CborCodec),
            fatal: fatal_tx,
        });

        Ok(ChatServer {
            transport,
            state,
            fatal_rx,
        })
    }
}

impl Default for ChatServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Parley chat server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct ChatServer {
    transport: TcpTransport,
    state: Arc<ServerState>,
    fatal_rx: mpsc::UnboundedReceiver<RoomError>,
}

impl ChatServer {
    /// Creates a new builder.
    pub fn builder() -> ChatServerBuilder {
        ChatServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until a fatal error.
    pub async fn run(self) -> Result<(), ParleyError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves or a fatal error.
    ///
    /// On the way out every connection task is told to stop, runs its
    /// normal disconnect cleanup, and is awaited.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ParleyError> {
        tracing::info!("Parley server running");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break Ok(());
                }
                Some(err) = self.fatal_rx.recv() => {
                    tracing::error!(error = %err, "stopping server");
                    break Err(ParleyError::Fatal(err));
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        connections.spawn(handle_connection(
                            conn,
                            Arc::clone(&self.state),
                            stop_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!(error = %e, "connection task failed");
                    }
                }
            }
        };

        stop_tx.send_replace(true);
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "connection task failed");
            }
        }
        tracing::info!("Parley server stopped");
        result
    }
}
