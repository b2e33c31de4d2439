/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Connecting to the remote address failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The read deadline passed with no complete frame. Not fatal: the
    /// caller re-checks liveness and reads again.
    #[error("read timed out")]
    Timeout,

    /// The peer announced a frame larger than the configured maximum.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The stream ended in the middle of a frame.
    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    UnexpectedEof { buffered: usize },

    /// A whole frame could not be written before the write deadline,
    /// usually because the peer stopped reading.
    #[error("write timed out")]
    WriteTimeout,
}

impl TransportError {
    /// `true` for a deadline expiry, which callers retry rather than
    /// treat as a broken connection.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
