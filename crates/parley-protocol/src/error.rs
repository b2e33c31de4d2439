//! Error types for the protocol layer.
//!
//! Each crate in Parley defines its own error enum. A `ProtocolError`
//! always means the problem is in turning packets into bytes or back,
//! never in networking or room bookkeeping.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a packet into bytes).
    ///
    /// The codec's own error is rendered to a string so callers deal
    /// with one variant no matter which codec produced it.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Deserialization failed (turning bytes into a packet).
    ///
    /// Common causes: truncated frames, corrupted bytes, or a value of
    /// the wrong shape. Never a panic.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The action byte does not name any known [`Action`](crate::Action).
    #[error("protocol action unexpected: {0}")]
    UnknownAction(u8),
}
