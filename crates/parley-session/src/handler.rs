//! Session handler: user intents in, view calls out.

use std::sync::Arc;

use parley_protocol::{Action, CborCodec, Codec, DataPacket, Packet, PROTOCOL_VERSION};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::connection::{ClientConfig, ConnectionManager, Inbound, Outbox};
use crate::done::{done_signal, DoneListener, DoneTrigger};
use crate::peer::process_peer_id;
use crate::view::{MessageKind, View};
use crate::SessionError;

/// What an inbound packet means to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RoomBooked { room_id: String, peers: Vec<String> },
    RoomJoined { room_id: String, peers: Vec<String> },
    MessageReceived { sender: String, message: String },
    RoomUpdated { peers: Vec<String> },
    Error(String),
}

/// Interprets one packet from the server.
pub fn map_packet(packet: Packet) -> SessionEvent {
    if packet.version != PROTOCOL_VERSION {
        return SessionEvent::Error("protocol version unsupported".to_string());
    }
    if let Some(error) = packet.error {
        return SessionEvent::Error(error);
    }
    let data = packet.data;
    match Action::try_from(packet.action) {
        Ok(Action::BookRoom) => SessionEvent::RoomBooked {
            room_id: data.room_id,
            peers: data.peers,
        },
        Ok(Action::JoinRoom) => SessionEvent::RoomJoined {
            room_id: data.room_id,
            peers: data.peers,
        },
        Ok(Action::SendMsg) => SessionEvent::MessageReceived {
            sender: data.sender,
            message: data.message,
        },
        Ok(Action::UpdateRoom) => SessionEvent::RoomUpdated { peers: data.peers },
        Ok(Action::LeaveRoom) | Err(_) => {
            SessionEvent::Error("protocol action unexpected".to_string())
        }
    }
}

/// Identity and room state shared with the processor task.
struct Shared {
    peer_id: String,
    peer_name: String,
    room_id: RwLock<Option<String>>,
    outbox: Outbox,
    codec: CborCodec,
}

impl Shared {
    fn send(&self, action: Action, data: DataPacket) -> Result<(), SessionError> {
        let bytes = self.codec.encode(&Packet::new(action, data))?;
        self.outbox.send(bytes)
    }

    fn book(&self, room_id: String) -> Result<(), SessionError> {
        self.send(
            Action::BookRoom,
            DataPacket {
                room_id,
                peer_id: self.peer_id.clone(),
                peer_name: self.peer_name.clone(),
                ..DataPacket::default()
            },
        )
    }
}

/// A connected chat client.
///
/// ```rust,ignore
/// let session = ChatSession::connect(ClientConfig::new(addr), "ann", view).await?;
/// session.book_room()?;
/// session.send_message("hello").await?;
/// session.shutdown().await;
/// ```
pub struct ChatSession<V: View> {
    shared: Arc<Shared>,
    view: Arc<V>,
    manager: ConnectionManager,
    processor: JoinHandle<()>,
    done: DoneTrigger,
}

impl<V: View> ChatSession<V> {
    /// Connects to the server and starts the reader, writer and processor
    /// tasks. Fails with [`SessionError::ConnectExhausted`] if the server
    /// cannot be reached within the attempt budget.
    pub async fn connect(
        config: ClientConfig,
        peer_name: &str,
        view: Arc<V>,
    ) -> Result<Self, SessionError> {
        let peer_id = config
            .peer_id
            .clone()
            .unwrap_or_else(|| process_peer_id().to_string());
        let (done, listener) = done_signal();

        let (manager, inbound) = ConnectionManager::start(config, listener.clone()).await?;

        let shared = Arc::new(Shared {
            peer_id,
            peer_name: peer_name.to_string(),
            room_id: RwLock::new(None),
            outbox: manager.outbox(),
            codec: CborCodec,
        });
        let processor = tokio::spawn(process(
            inbound,
            Arc::clone(&shared),
            Arc::clone(&view),
            listener,
        ));

        tracing::info!(peer_id = %shared.peer_id, "session started");
        Ok(Self {
            shared,
            view,
            manager,
            processor,
            done,
        })
    }

    /// Asks the server for a fresh room.
    pub fn book_room(&self) -> Result<(), SessionError> {
        self.shared.book(String::new())
    }

    /// Asks to join an existing room.
    pub fn join_room(&self, room_id: &str) -> Result<(), SessionError> {
        self.shared.send(
            Action::JoinRoom,
            DataPacket {
                room_id: room_id.to_string(),
                peer_id: self.shared.peer_id.clone(),
                peer_name: self.shared.peer_name.clone(),
                ..DataPacket::default()
            },
        )
    }

    /// Sends a chat line to the current room.
    pub async fn send_message(&self, text: &str) -> Result<(), SessionError> {
        let room_id = self.room_id().await.unwrap_or_default();
        self.shared.send(
            Action::SendMsg,
            DataPacket {
                room_id,
                peer_id: self.shared.peer_id.clone(),
                message: text.to_string(),
                ..DataPacket::default()
            },
        )
    }

    /// The room the server last confirmed, if any.
    pub async fn room_id(&self) -> Option<String> {
        self.shared.room_id.read().await.clone()
    }

    pub fn peer_id(&self) -> &str {
        &self.shared.peer_id
    }

    pub fn view(&self) -> &Arc<V> {
        &self.view
    }

    pub fn is_connected(&self) -> bool {
        self.shared.outbox.is_connected()
    }

    /// Leaves the current room, stops every task and waits for them.
    pub async fn shutdown(self) {
        if let Some(room_id) = self.room_id().await {
            let leave = self.shared.send(
                Action::LeaveRoom,
                DataPacket {
                    room_id,
                    peer_id: self.shared.peer_id.clone(),
                    ..DataPacket::default()
                },
            );
            if let Err(e) = leave {
                tracing::debug!(error = %e, "could not send leave");
            }
        }

        self.done.raise();
        self.manager.join().await;
        if let Err(e) = self.processor.await {
            tracing::debug!(error = %e, "processor task ended abnormally");
        }
        tracing::info!(peer_id = %self.shared.peer_id, "session closed");
    }
}

/// Turns inbound frames and link events into view calls.
async fn process<V: View>(
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    shared: Arc<Shared>,
    view: Arc<V>,
    mut done: DoneListener,
) {
    loop {
        let next = tokio::select! {
            next = inbound.recv() => next,
            _ = done.wait() => break,
        };
        let Some(next) = next else { break };

        match next {
            Inbound::Frame(bytes) => match shared.codec.decode::<Packet>(&bytes) {
                Ok(packet) => apply(map_packet(packet), &shared, view.as_ref()).await,
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable packet");
                    view.view_message(MessageKind::Error, "", &e.to_string());
                }
            },
            Inbound::Error(e) => {
                view.view_message(MessageKind::Error, "", &e.to_string());
            }
            Inbound::Reconnected => {
                view.view_message(MessageKind::Info, "", "reconnected");
                let room_id = shared.room_id.read().await.clone();
                if let Some(room_id) = room_id {
                    tracing::info!(%room_id, "rebooking room after reconnect");
                    if let Err(e) = shared.book(room_id) {
                        view.view_message(MessageKind::Error, "", &e.to_string());
                    }
                }
            }
            Inbound::Fatal(e) => {
                view.view_message(MessageKind::Error, "", &format!("unable to connect: {e}"));
                view.quit();
                break;
            }
        }
    }
    tracing::debug!("processor task stopped");
}

async fn apply<V: View>(event: SessionEvent, shared: &Shared, view: &V) {
    match event {
        SessionEvent::RoomBooked { room_id, peers } | SessionEvent::RoomJoined { room_id, peers } => {
            view.view_room(&room_id);
            view.update_peers(&peers);
            *shared.room_id.write().await = Some(room_id);
        }
        SessionEvent::MessageReceived { sender, message } => {
            view.view_message(MessageKind::Chat, &sender, &message);
        }
        SessionEvent::RoomUpdated { peers } => view.update_peers(&peers),
        SessionEvent::Error(error) => view.view_message(MessageKind::Error, "", &error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(action: Action, data: DataPacket) -> Packet {
        Packet::new(action, data)
    }

    #[test]
    fn test_map_book_reply() {
        let event = map_packet(reply(
            Action::BookRoom,
            DataPacket {
                room_id: "abc".into(),
                peers: vec!["A".into()],
                ..DataPacket::default()
            },
        ));
        assert_eq!(
            event,
            SessionEvent::RoomBooked {
                room_id: "abc".into(),
                peers: vec!["A".into()]
            }
        );
    }

    #[test]
    fn test_map_message_and_update() {
        let event = map_packet(reply(
            Action::SendMsg,
            DataPacket {
                sender: "A".into(),
                message: "hi".into(),
                ..DataPacket::default()
            },
        ));
        assert_eq!(
            event,
            SessionEvent::MessageReceived {
                sender: "A".into(),
                message: "hi".into()
            }
        );

        let event = map_packet(reply(
            Action::UpdateRoom,
            DataPacket {
                peers: vec!["A".into(), "B".into()],
                ..DataPacket::default()
            },
        ));
        assert_eq!(
            event,
            SessionEvent::RoomUpdated {
                peers: vec!["A".into(), "B".into()]
            }
        );
    }

    #[test]
    fn test_map_error_reply() {
        let packet = Packet::error(PROTOCOL_VERSION, 1, "room abc not found");
        assert_eq!(
            map_packet(packet),
            SessionEvent::Error("room abc not found".into())
        );
    }

    #[test]
    fn test_map_rejects_wrong_version_and_unknown_action() {
        let mut packet = reply(Action::SendMsg, DataPacket::default());
        packet.version = 9;
        assert_eq!(
            map_packet(packet),
            SessionEvent::Error("protocol version unsupported".into())
        );

        let mut packet = reply(Action::SendMsg, DataPacket::default());
        packet.action = 42;
        assert_eq!(
            map_packet(packet),
            SessionEvent::Error("protocol action unexpected".into())
        );
    }
}
