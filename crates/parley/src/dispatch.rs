//! Dispatcher: one decoded request in, room operation run, replies out.
//!
//! Checks run in a fixed order (version, then peer id, then action) and
//! the first failure becomes an error reply to the sender only. Nothing
//! here writes to a socket; callers deliver the returned packets.

use parley_protocol::{Action, CborCodec, Codec, Packet, PacketHeader, PROTOCOL_VERSION};
use parley_room::{Delivery, PeerSender, RoomError, RoomRegistry};
use parley_transport::ConnectionId;

pub const VERSION_UNSUPPORTED: &str = "protocol version unsupported";
pub const PEER_ID_MISSING: &str = "peer id not assigned";
pub const ACTION_UNEXPECTED: &str = "protocol action unexpected";

/// What the connection should do after a request.
#[derive(Debug)]
pub enum Outcome {
    /// Deliver these and keep reading.
    Continue(Vec<Delivery>),
    /// Deliver these, then close the connection (`LeaveRoom`).
    Close(Vec<Delivery>),
    /// The server cannot go on.
    Fatal(RoomError),
}

/// Routes requests to the [`RoomRegistry`].
pub struct Dispatcher<C: Codec = CborCodec> {
    registry: RoomRegistry,
    codec: C,
}

impl<C: Codec> Dispatcher<C> {
    pub fn new(registry: RoomRegistry, codec: C) -> Self {
        Self { registry, codec }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Handles one frame from `conn`. `sender` is that connection's writer.
    pub async fn dispatch(&self, conn: ConnectionId, sender: &PeerSender, frame: &[u8]) -> Outcome {
        let reject = |version: u8, action: u8, error: &str| {
            Outcome::Continue(vec![Delivery {
                conn,
                to: sender.clone(),
                packet: Packet::error(version, action, error),
            }])
        };

        let packet: Packet = match self.codec.decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                // Address the reply with whatever header survives.
                let (version, action) = match self.codec.decode::<PacketHeader>(frame) {
                    Ok(header) => (header.version, header.action),
                    Err(_) => (PROTOCOL_VERSION, u8::MAX),
                };
                tracing::debug!(conn_id = %conn, error = %e, "undecodable packet");
                return reject(version, action, &e.to_string());
            }
        };

        let (version, action_byte) = (packet.version, packet.action);
        if version != PROTOCOL_VERSION {
            return reject(version, action_byte, VERSION_UNSUPPORTED);
        }
        if packet.data.peer_id.is_empty() {
            return reject(version, action_byte, PEER_ID_MISSING);
        }
        let action = match packet.kind() {
            Ok(Action::UpdateRoom) | Err(_) => {
                return reject(version, action_byte, ACTION_UNEXPECTED);
            }
            Ok(action) => action,
        };

        let data = &packet.data;
        tracing::debug!(conn_id = %conn, %action, peer_id = %data.peer_id, room_id = %data.room_id, "request");

        let result = match action {
            Action::BookRoom => {
                self.registry
                    .book(conn, sender.clone(), &data.room_id, &data.peer_id, &data.peer_name)
                    .await
            }
            Action::JoinRoom => {
                self.registry
                    .join(conn, sender.clone(), &data.room_id, &data.peer_id, &data.peer_name)
                    .await
            }
            Action::SendMsg => {
                self.registry
                    .send_message(&data.room_id, &data.peer_id, &data.message)
                    .await
            }
            Action::LeaveRoom => {
                return match self.registry.check_member(&data.room_id, &data.peer_id).await {
                    Ok(()) => {
                        tracing::info!(conn_id = %conn, peer_id = %data.peer_id, "peer leaving");
                        Outcome::Close(Vec::new())
                    }
                    Err(e) => reject(version, action_byte, &e.to_string()),
                };
            }
            Action::UpdateRoom => return reject(version, action_byte, ACTION_UNEXPECTED),
        };

        match result {
            Ok(deliveries) => Outcome::Continue(deliveries),
            Err(e) if e.is_fatal() => Outcome::Fatal(e),
            Err(e) => {
                tracing::debug!(conn_id = %conn, %action, error = %e, "request rejected");
                reject(version, action_byte, &e.to_string())
            }
        }
    }

    /// Connection-close cleanup.
    pub async fn disconnect(&self, conn: ConnectionId) -> Vec<Delivery> {
        self.registry.disconnect(conn).await
    }
}

#[cfg(test)]
mod tests {
    use parley_protocol::DataPacket;
    use tokio::sync::mpsc;

    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(RoomRegistry::new(), CborCodec)
    }

    fn frame(packet: &Packet) -> Vec<u8> {
        CborCodec.encode(packet).unwrap()
    }

    fn request(action: Action, peer_id: &str, room_id: &str) -> Packet {
        Packet::new(
            action,
            DataPacket {
                peer_id: peer_id.into(),
                peer_name: "A".into(),
                room_id: room_id.into(),
                message: "hi".into(),
                ..DataPacket::default()
            },
        )
    }

    /// Expects a single error reply and returns it.
    fn rejected(outcome: Outcome) -> Packet {
        match outcome {
            Outcome::Continue(mut out) => {
                assert_eq!(out.len(), 1, "one reply expected");
                let packet = out.remove(0).packet;
                assert!(packet.is_error());
                packet
            }
            other => panic!("expected an error reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_version_is_checked_first() {
        let d = dispatcher();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut packet = request(Action::BookRoom, "", "");
        packet.version = 7;
        packet.action = 99;

        let reply = rejected(d.dispatch(ConnectionId::new(1), &tx, &frame(&packet)).await);
        assert_eq!(reply.error.as_deref(), Some(VERSION_UNSUPPORTED));
        assert_eq!(reply.version, 7);
        assert_eq!(reply.action, 99);
    }

    #[tokio::test]
    async fn test_missing_peer_id_before_unknown_action() {
        let d = dispatcher();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut packet = request(Action::BookRoom, "", "");
        packet.action = 99;

        let reply = rejected(d.dispatch(ConnectionId::new(1), &tx, &frame(&packet)).await);
        assert_eq!(reply.error.as_deref(), Some(PEER_ID_MISSING));
    }

    #[tokio::test]
    async fn test_unknown_and_server_only_actions_are_rejected() {
        let d = dispatcher();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut packet = request(Action::BookRoom, "p", "");
        packet.action = 42;
        let reply = rejected(d.dispatch(ConnectionId::new(1), &tx, &frame(&packet)).await);
        assert_eq!(reply.error.as_deref(), Some(ACTION_UNEXPECTED));
        assert_eq!(reply.action, 42);

        let packet = request(Action::UpdateRoom, "p", "abc");
        let reply = rejected(d.dispatch(ConnectionId::new(1), &tx, &frame(&packet)).await);
        assert_eq!(reply.error.as_deref(), Some(ACTION_UNEXPECTED));
    }

    #[tokio::test]
    async fn test_garbage_frame_gets_error_reply() {
        let d = dispatcher();
        let (tx, _rx) = mpsc::unbounded_channel();
        let reply = rejected(d.dispatch(ConnectionId::new(1), &tx, &[0xff, 0x00, 0x13]).await);
        assert_eq!(reply.version, PROTOCOL_VERSION);
        assert!(reply.error.is_some());
    }

    #[tokio::test]
    async fn test_room_errors_become_replies() {
        let d = dispatcher();
        let (tx, _rx) = mpsc::unbounded_channel();

        let reply = rejected(
            d.dispatch(ConnectionId::new(1), &tx, &frame(&request(Action::JoinRoom, "p", "")))
                .await,
        );
        assert_eq!(reply.error.as_deref(), Some("room number not assigned"));
        assert_eq!(reply.action, Action::JoinRoom.as_byte());

        let reply = rejected(
            d.dispatch(ConnectionId::new(1), &tx, &frame(&request(Action::SendMsg, "p", "zz")))
                .await,
        );
        assert_eq!(reply.error.as_deref(), Some("room zz not found"));
    }

    #[tokio::test]
    async fn test_leave_closes_only_for_members() {
        let d = dispatcher();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = ConnectionId::new(1);

        let outcome = d
            .dispatch(conn, &tx, &frame(&request(Action::BookRoom, "p", "")))
            .await;
        let Outcome::Continue(out) = outcome else {
            panic!("book should succeed");
        };
        let room_id = out[0].packet.data.room_id.clone();

        let reply = rejected(
            d.dispatch(conn, &tx, &frame(&request(Action::LeaveRoom, "q", &room_id)))
                .await,
        );
        assert_eq!(reply.error, Some(format!("peer q not in room {room_id}")));

        let outcome = d
            .dispatch(conn, &tx, &frame(&request(Action::LeaveRoom, "p", &room_id)))
            .await;
        assert!(matches!(outcome, Outcome::Close(_)));
    }

    #[tokio::test]
    async fn test_id_exhaustion_is_fatal() {
        let d = Dispatcher::new(
            RoomRegistry::new()
                .with_id_attempts(2)
                .with_id_generator(|| "same".to_string()),
            CborCodec,
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = d
            .dispatch(ConnectionId::new(1), &tx, &frame(&request(Action::BookRoom, "p1", "")))
            .await;
        assert!(matches!(first, Outcome::Continue(_)));

        let second = d
            .dispatch(ConnectionId::new(2), &tx, &frame(&request(Action::BookRoom, "p2", "")))
            .await;
        assert!(matches!(
            second,
            Outcome::Fatal(RoomError::IdSpaceExhausted { attempts: 2 })
        ));
    }
}
