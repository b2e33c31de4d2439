//! # Parley
//!
//! Real-time chat over TCP. A server multiplexes many connections into
//! ephemeral rooms; a client keeps a resilient connection to it and shows
//! the conversation through a [`View`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn serve() -> Result<(), ParleyError> {
//! let server = ChatServer::builder()
//!     .bind("0.0.0.0:8822")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod console;
mod dispatch;
mod error;
mod handler;
pub mod logging;
mod server;

pub use console::ConsoleView;
pub use dispatch::{Dispatcher, Outcome, ACTION_UNEXPECTED, PEER_ID_MISSING, VERSION_UNSUPPORTED};
pub use error::ParleyError;
pub use server::{ChatServer, ChatServerBuilder, ServerConfig};

/// Commonly used types, re-exported for convenience.
pub mod prelude {
    pub use crate::{ChatServer, ChatServerBuilder, ConsoleView, ParleyError, ServerConfig};
    pub use parley_backoff::{BackoffConfig, ExpBackoff};
    pub use parley_protocol::{
        Action, CborCodec, Codec, DataPacket, Packet, ProtocolError, PROTOCOL_VERSION,
    };
    pub use parley_room::{RoomError, RoomRegistry};
    pub use parley_session::{
        ChatSession, ClientConfig, MessageKind, SessionError, SessionEvent, View,
    };
    pub use parley_transport::{ConnectionId, TransportError};
}
