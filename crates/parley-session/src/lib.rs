//! Client side of Parley chat.
//!
//! This crate keeps a user connected to a chat server and translates
//! between what the user does and what travels on the wire:
//!
//! 1. **Connection manager** ([`ConnectionManager`]): owns the socket,
//!    reconnects with exponential backoff, and exposes an outbound queue
//!    ([`Outbox`]) plus a stream of [`Inbound`] events
//! 2. **Session handler** ([`ChatSession`]): book / join / send intents
//!    become packets, and inbound packets become [`View`] calls
//! 3. **Done signal** ([`DoneTrigger`], [`DoneListener`]): one cooperative
//!    shutdown for every task of a session
//!
//! # How it fits in the stack
//!
//! ```text
//! View (above)            ← console or full-screen UI
//!     ↕
//! Session (this crate)    ← intents, events, reconnect
//!     ↕
//! Transport + Protocol    ← frames and packets
//! ```

mod connection;
mod done;
mod error;
mod handler;
mod peer;
mod view;

pub use connection::{ClientConfig, ConnectionManager, Inbound, Outbox};
pub use done::{done_signal, DoneListener, DoneTrigger};
pub use error::SessionError;
pub use handler::{map_packet, ChatSession, SessionEvent};
pub use peer::{generate_peer_id, process_peer_id};
pub use view::{MessageKind, View};
