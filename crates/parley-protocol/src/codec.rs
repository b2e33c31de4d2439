//! Codec trait and implementations for serializing/deserializing packets.
//!
//! The protocol layer doesn't care HOW packets are serialized: it just
//! needs something that implements the [`Codec`] trait. Servers and
//! clients are generic over it, so swapping formats touches no other
//! code.
//!
//! - [`CborCodec`] (default): compact binary, self-describing. Structs
//!   travel as maps keyed by field name, so a peer built against an older
//!   or newer packet layout still decodes what it understands.
//! - [`JsonCodec`]: human-readable, handy when debugging a capture.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec value is shared by every
/// connection task on the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// CborCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses CBOR (via `ciborium`).
///
/// ## Example
///
/// ```rust
/// use parley_protocol::{Action, CborCodec, Codec, DataPacket, Packet};
///
/// let codec = CborCodec;
/// let packet = Packet::new(
///     Action::SendMsg,
///     DataPacket {
///         room_id: "abc".into(),
///         peer_id: "p-1".into(),
///         message: "hi".into(),
///         ..DataPacket::default()
///     },
/// );
///
/// let bytes = codec.encode(&packet).unwrap();
/// let decoded: Packet = codec.decode(&bytes).unwrap();
/// assert_eq!(packet, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        ciborium::from_reader(data).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Larger on the wire than CBOR, but a captured frame can be read by eye.
/// Behind the `json` feature flag (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
