//! Unified error type for Parley.

use parley_protocol::ProtocolError;
use parley_room::RoomError;
use parley_session::SessionError;
use parley_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A transport-level error (bind, connect, framing).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A client session error (no connection, reconnect exhausted).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, missing ids).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The server hit a condition it cannot continue from.
    #[error("fatal: {0}")]
    Fatal(#[source] RoomError),
}
