//! Error types for the client session.

use parley_protocol::ProtocolError;
use parley_transport::TransportError;

/// Errors surfaced by the connection manager and session handler.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// There is no live connection right now. Sends fail fast with this
    /// instead of waiting for the reconnect loop.
    #[error("no connection")]
    NotConnected,

    /// Every connect attempt failed. Terminal for the session.
    #[error("gave up on {addr} after {attempts} attempts: {last}")]
    ConnectExhausted {
        addr: String,
        attempts: u64,
        #[source]
        last: TransportError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session has been shut down.
    #[error("session closed")]
    Closed,
}
