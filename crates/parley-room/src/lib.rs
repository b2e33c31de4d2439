//! Room registry for the Parley server.
//!
//! Rooms are ephemeral: one is created by the first `BookRoom`, lives
//! while it has members, and is deleted the moment its last peer leaves.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: the room table plus the connection → room index
//! - [`Delivery`]: an outbound packet addressed to one peer's writer
//! - [`RoomError`]: what can go wrong, including the one fatal case
//!
//! Registry operations never write to the network. They return the list
//! of packets to send, and the caller delivers them after every lock has
//! been released.

mod error;
mod registry;

pub use error::RoomError;
pub use registry::{
    deliver, generate_room_id, Delivery, PeerSender, RoomRegistry, DEFAULT_ID_ATTEMPTS,
    ROOM_ID_BYTES,
};
