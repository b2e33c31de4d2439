//! Wire protocol for Parley.
//!
//! This crate defines the "language" that chat clients and the server
//! speak:
//!
//! - **Types** ([`Packet`], [`Action`], [`DataPacket`]): the messages
//!   that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`CborCodec`], [`JsonCodec`]): how those
//!   messages are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (framed bytes) and the room
//! registry / client session. It knows nothing about sockets or rooms.
//!
//! ```text
//! Transport (frames) → Protocol (Packet) → Dispatcher / Session
//! ```

mod codec;
mod error;
mod types;

pub use codec::{CborCodec, Codec};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{Action, DataPacket, Packet, PacketHeader, PROTOCOL_VERSION};
