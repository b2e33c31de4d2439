//! Error types for the room layer.

/// Errors that can occur during room operations.
///
/// The `Display` text of every variant except [`IdSpaceExhausted`] is sent
/// back to the client verbatim in the error field of the reply.
///
/// [`IdSpaceExhausted`]: RoomError::IdSpaceExhausted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(String),

    /// The request needed a room id and carried none.
    #[error("room number not assigned")]
    MissingRoomId,

    /// The request carried no peer id.
    #[error("peer id not assigned")]
    MissingPeerId,

    /// The peer is not a member of this room.
    #[error("peer {peer_id} not in room {room_id}")]
    NotInRoom { peer_id: String, room_id: String },

    /// Every freshly generated room id collided with a live room. With a
    /// random id space this means the randomness source is broken.
    #[error("room id space exhausted after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },
}

impl RoomError {
    /// `true` for errors the server cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IdSpaceExhausted { .. })
    }
}
