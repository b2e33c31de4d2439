//! Core protocol types for Parley's wire format.
//!
//! Every value here travels "on the wire": the client builds a [`Packet`],
//! the codec turns it into bytes, and the server decodes the same
//! structure on the other side (and vice versa for replies).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The protocol version spoken by this build. Packets carrying any other
/// version are answered with an error reply.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// What a packet asks for (client → server) or reports (server → client).
///
/// On the wire an action is its single discriminant byte, listed below.
/// [`Packet::action`] keeps the raw byte so a packet with an unknown
/// action still decodes and can be answered with an error that echoes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    /// Create a room (or re-create one after a reconnect) and enter it.
    BookRoom = 0,
    /// Enter an existing room.
    JoinRoom = 1,
    /// Deliver a chat line to everyone else in the room.
    SendMsg = 2,
    /// Server → client: the member list of your room changed.
    UpdateRoom = 3,
    /// Leave the room and close the connection.
    LeaveRoom = 4,
}

impl Action {
    /// The wire byte for this action.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Action {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::BookRoom),
            1 => Ok(Self::JoinRoom),
            2 => Ok(Self::SendMsg),
            3 => Ok(Self::UpdateRoom),
            4 => Ok(Self::LeaveRoom),
            other => Err(ProtocolError::UnknownAction(other)),
        }
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        action.as_byte()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BookRoom => "BookRoom",
            Self::JoinRoom => "JoinRoom",
            Self::SendMsg => "SendMsg",
            Self::UpdateRoom => "UpdateRoom",
            Self::LeaveRoom => "LeaveRoom",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// DataPacket
// ---------------------------------------------------------------------------

/// The action-dependent payload of a packet.
///
/// Which fields matter depends on the action; the rest stay empty:
///
/// | Field       | Used by                                   |
/// |-------------|-------------------------------------------|
/// | `room_id`   | Join / Send / Leave / re-book, all replies |
/// | `peer_id`   | every client request                       |
/// | `peer_name` | Book / Join                               |
/// | `message`   | SendMsg                                   |
/// | `sender`    | SendMsg (server → client)                 |
/// | `peers`     | Book / Join / Update replies              |
///
/// `#[serde(default)]` on the struct lets a missing key decode as its
/// empty value, which is what keeps old and new peers compatible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataPacket {
    pub room_id: String,
    pub peer_id: String,
    pub peer_name: String,
    pub message: String,
    pub sender: String,
    /// Display names of the room's members, in the order they joined.
    pub peers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One discrete protocol message, request or reply.
///
/// Packets are built fresh for every message and never mutated after
/// they are handed to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub version: u8,

    /// Raw action byte. Use [`Packet::kind`] for the typed view.
    pub action: u8,

    #[serde(default)]
    pub data: DataPacket,

    /// Set only on replies that report a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Packet {
    /// Builds a packet for the current protocol version.
    pub fn new(action: Action, data: DataPacket) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            action: action.as_byte(),
            data,
            error: None,
        }
    }

    /// Builds an error reply echoing the version and action byte of the
    /// request that failed.
    pub fn error(version: u8, action: u8, message: impl Into<String>) -> Self {
        Self {
            version,
            action,
            data: DataPacket::default(),
            error: Some(message.into()),
        }
    }

    /// The typed action, or `ProtocolError::UnknownAction` for a byte
    /// outside the known range.
    pub fn kind(&self) -> Result<Action, ProtocolError> {
        Action::try_from(self.action)
    }

    /// `true` if this packet reports a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The two leading fields of a packet, decodable even when the rest of
/// the packet is not. Used to address an error reply to a malformed
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    pub version: u8,
    pub action: u8,
}

// =========================================================================
// Tests
// =========================================================================
