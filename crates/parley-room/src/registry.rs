//! The room table and the connection → room index.
//!
//! Both tables live behind their own `Mutex`. Operations that touch both
//! always lock `rooms` first and `connections` second.

use std::collections::HashMap;

use parley_protocol::{Action, DataPacket, Packet};
use parley_transport::ConnectionId;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};

use crate::RoomError;

/// Random bytes in a generated room id (hex encoded, so twice as many
/// characters).
pub const ROOM_ID_BYTES: usize = 5;

/// How many fresh ids `BookRoom` tries before giving up.
pub const DEFAULT_ID_ATTEMPTS: usize = 10;

/// The write side of a peer's connection. Each connection has exactly one
/// writer task draining the matching receiver, which keeps per-connection
/// packet order FIFO.
pub type PeerSender = mpsc::UnboundedSender<Packet>;

type IdGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// One outbound packet addressed to one connection.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub conn: ConnectionId,
    pub to: PeerSender,
    pub packet: Packet,
}

/// Hands every packet to its connection's writer. A writer that is
/// already gone means that connection is closing; its packets are
/// dropped.
pub fn deliver(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        if delivery.to.send(delivery.packet).is_err() {
            tracing::debug!(conn_id = %delivery.conn, "writer gone, dropping packet");
        }
    }
}

/// A fresh random room id: [`ROOM_ID_BYTES`] bytes as lowercase hex.
pub fn generate_room_id() -> String {
    let bytes: [u8; ROOM_ID_BYTES] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

struct Peer {
    id: String,
    name: String,
    conn: ConnectionId,
    sender: PeerSender,
}

/// A room keeps its peers in join order so member lists are stable.
struct Room {
    id: String,
    peers: Vec<Peer>,
}

impl Room {
    fn member(&self, peer_id: &str) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == peer_id)
    }

    fn names(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.name.clone()).collect()
    }

    fn packet(&self, action: Action) -> Packet {
        Packet::new(
            action,
            DataPacket {
                room_id: self.id.clone(),
                peers: self.names(),
                ..DataPacket::default()
            },
        )
    }

    /// `UpdateRoom` with the current member list for every peer except
    /// `skip`.
    fn updates(&self, skip: Option<&str>) -> Vec<Delivery> {
        let packet = self.packet(Action::UpdateRoom);
        self.peers
            .iter()
            .filter(|p| Some(p.id.as_str()) != skip)
            .map(|p| Delivery {
                conn: p.conn,
                to: p.sender.clone(),
                packet: packet.clone(),
            })
            .collect()
    }
}

type Rooms = HashMap<String, Room>;
type Connections = HashMap<ConnectionId, String>;

/// Who is sitting down: one connection speaking for one peer.
struct Seat {
    conn: ConnectionId,
    sender: PeerSender,
    peer_id: String,
    name: String,
}

/// All live rooms, and which room each connection is in.
///
/// Invariants held after every operation:
/// - room ids are unique among live rooms
/// - a peer id sits in at most one room
/// - a connection is indexed to at most one room, and that room exists
/// - no room is empty
pub struct RoomRegistry {
    rooms: Mutex<Rooms>,
    connections: Mutex<Connections>,
    id_attempts: usize,
    id_generator: IdGenerator,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            id_attempts: DEFAULT_ID_ATTEMPTS,
            id_generator: Box::new(generate_room_id),
        }
    }

    /// Sets how many fresh ids `book` tries before failing (minimum 1).
    pub fn with_id_attempts(mut self, attempts: usize) -> Self {
        self.id_attempts = attempts.max(1);
        self
    }

    /// Replaces the room id generator.
    pub fn with_id_generator(
        mut self,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.id_generator = Box::new(generator);
        self
    }

    /// Books a room for the peer on `conn`.
    ///
    /// With an empty `room_id` a fresh id is generated. A supplied id that
    /// is not live re-creates the room under that id, which is how a
    /// reconnecting client recovers a room that emptied while it was away.
    /// A supplied id that IS live is handled as a join, and the reply
    /// carries `JoinRoom`.
    ///
    /// The requester gets a `BookRoom` reply with the room id and member
    /// list.
    pub async fn book(
        &self,
        conn: ConnectionId,
        sender: PeerSender,
        room_id: &str,
        peer_id: &str,
        peer_name: &str,
    ) -> Result<Vec<Delivery>, RoomError> {
        if peer_id.is_empty() {
            return Err(RoomError::MissingPeerId);
        }
        let seat = Seat {
            conn,
            sender,
            peer_id: peer_id.to_string(),
            name: peer_name.to_string(),
        };

        let mut rooms = self.rooms.lock().await;
        let mut connections = self.connections.lock().await;

        if !room_id.is_empty() && rooms.contains_key(room_id) {
            tracing::debug!(%room_id, peer_id, "rebook of a live room, joining");
            return join_locked(&mut rooms, &mut connections, room_id, seat, Action::JoinRoom);
        }

        // Pick the id before touching anything so exhaustion leaves the
        // tables as they were.
        let id = if room_id.is_empty() {
            self.fresh_id(&rooms)?
        } else {
            room_id.to_string()
        };

        let mut out = detach_connection(&mut rooms, &mut connections, conn);
        out.extend(detach_peer(&mut rooms, &mut connections, peer_id, None));

        let room = Room {
            id: id.clone(),
            peers: vec![Peer {
                id: seat.peer_id,
                name: seat.name,
                conn,
                sender: seat.sender.clone(),
            }],
        };
        out.push(Delivery {
            conn,
            to: seat.sender,
            packet: room.packet(Action::BookRoom),
        });
        rooms.insert(id.clone(), room);
        connections.insert(conn, id.clone());

        tracing::info!(room_id = %id, peer_id, conn_id = %conn, "room booked");
        Ok(out)
    }

    /// Seats the peer on `conn` in an existing room.
    ///
    /// A peer id already in the room keeps its place: its display name is
    /// updated and it is rebound to `conn`. The joiner gets a `JoinRoom`
    /// reply; every other member gets `UpdateRoom`.
    pub async fn join(
        &self,
        conn: ConnectionId,
        sender: PeerSender,
        room_id: &str,
        peer_id: &str,
        peer_name: &str,
    ) -> Result<Vec<Delivery>, RoomError> {
        if room_id.is_empty() {
            return Err(RoomError::MissingRoomId);
        }
        if peer_id.is_empty() {
            return Err(RoomError::MissingPeerId);
        }
        let seat = Seat {
            conn,
            sender,
            peer_id: peer_id.to_string(),
            name: peer_name.to_string(),
        };

        let mut rooms = self.rooms.lock().await;
        let mut connections = self.connections.lock().await;
        join_locked(&mut rooms, &mut connections, room_id, seat, Action::JoinRoom)
    }

    /// A `SendMsg` for every member of the room except the sender,
    /// carrying the sender's display name.
    pub async fn send_message(
        &self,
        room_id: &str,
        peer_id: &str,
        message: &str,
    ) -> Result<Vec<Delivery>, RoomError> {
        if room_id.is_empty() {
            return Err(RoomError::MissingRoomId);
        }
        if peer_id.is_empty() {
            return Err(RoomError::MissingPeerId);
        }

        let rooms = self.rooms.lock().await;
        let room = rooms
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;
        let from = room.member(peer_id).ok_or_else(|| RoomError::NotInRoom {
            peer_id: peer_id.to_string(),
            room_id: room_id.to_string(),
        })?;

        let packet = Packet::new(
            Action::SendMsg,
            DataPacket {
                room_id: room_id.to_string(),
                peer_id: peer_id.to_string(),
                sender: from.name.clone(),
                message: message.to_string(),
                ..DataPacket::default()
            },
        );
        Ok(room
            .peers
            .iter()
            .filter(|p| p.id != peer_id)
            .map(|p| Delivery {
                conn: p.conn,
                to: p.sender.clone(),
                packet: packet.clone(),
            })
            .collect())
    }

    /// Checks that `peer_id` is a member of `room_id`. `LeaveRoom` uses
    /// this before closing the connection; the removal itself happens in
    /// [`disconnect`](Self::disconnect).
    pub async fn check_member(&self, room_id: &str, peer_id: &str) -> Result<(), RoomError> {
        if room_id.is_empty() {
            return Err(RoomError::MissingRoomId);
        }
        if peer_id.is_empty() {
            return Err(RoomError::MissingPeerId);
        }
        let rooms = self.rooms.lock().await;
        let room = rooms
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;
        match room.member(peer_id) {
            Some(_) => Ok(()),
            None => Err(RoomError::NotInRoom {
                peer_id: peer_id.to_string(),
                room_id: room_id.to_string(),
            }),
        }
    }

    /// Removes whatever peer `conn` was seated as. An emptied room is
    /// deleted; otherwise the remaining members get `UpdateRoom`.
    /// Unknown connections are a no-op.
    pub async fn disconnect(&self, conn: ConnectionId) -> Vec<Delivery> {
        let mut rooms = self.rooms.lock().await;
        let mut connections = self.connections.lock().await;
        detach_connection(&mut rooms, &mut connections, conn)
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Display names of a room's members in join order, or `None` if the
    /// room doesn't exist.
    pub async fn room_peers(&self, room_id: &str) -> Option<Vec<String>> {
        self.rooms.lock().await.get(room_id).map(Room::names)
    }

    /// The room `conn` is seated in.
    pub async fn room_of(&self, conn: ConnectionId) -> Option<String> {
        self.connections.lock().await.get(&conn).cloned()
    }

    /// The room `peer_id` is a member of.
    pub async fn peer_room(&self, peer_id: &str) -> Option<String> {
        self.rooms
            .lock()
            .await
            .values()
            .find(|room| room.member(peer_id).is_some())
            .map(|room| room.id.clone())
    }

    fn fresh_id(&self, rooms: &Rooms) -> Result<String, RoomError> {
        for attempt in 1..=self.id_attempts {
            let id = (self.id_generator)();
            if !rooms.contains_key(&id) {
                return Ok(id);
            }
            tracing::warn!(attempt, room_id = %id, "room id collision");
        }
        tracing::error!(attempts = self.id_attempts, "room id space exhausted");
        Err(RoomError::IdSpaceExhausted {
            attempts: self.id_attempts,
        })
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn join_locked(
    rooms: &mut Rooms,
    connections: &mut Connections,
    room_id: &str,
    seat: Seat,
    reply: Action,
) -> Result<Vec<Delivery>, RoomError> {
    if !rooms.contains_key(room_id) {
        return Err(RoomError::NotFound(room_id.to_string()));
    }

    let mut out = Vec::new();
    if connections.get(&seat.conn).is_none_or(|current| current != room_id) {
        out.extend(detach_connection(rooms, connections, seat.conn));
    }
    out.extend(detach_peer(rooms, connections, &seat.peer_id, Some(room_id)));

    let room = rooms
        .get_mut(room_id)
        .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;

    // A connection speaks for one peer.
    room.peers
        .retain(|p| p.conn != seat.conn || p.id == seat.peer_id);

    match room.peers.iter_mut().find(|p| p.id == seat.peer_id) {
        Some(peer) => {
            if peer.conn != seat.conn {
                tracing::debug!(
                    %room_id,
                    peer_id = %seat.peer_id,
                    old = %peer.conn,
                    new = %seat.conn,
                    "peer rebound to new connection"
                );
                if connections.get(&peer.conn).is_some_and(|r| r == room_id) {
                    connections.remove(&peer.conn);
                }
            }
            peer.name = seat.name;
            peer.conn = seat.conn;
            peer.sender = seat.sender.clone();
        }
        None => {
            tracing::info!(%room_id, peer_id = %seat.peer_id, conn_id = %seat.conn, "peer joined");
            room.peers.push(Peer {
                id: seat.peer_id.clone(),
                name: seat.name,
                conn: seat.conn,
                sender: seat.sender.clone(),
            });
        }
    }
    connections.insert(seat.conn, room_id.to_string());

    out.push(Delivery {
        conn: seat.conn,
        to: seat.sender,
        packet: room.packet(reply),
    });
    out.extend(room.updates(Some(seat.peer_id.as_str())));
    Ok(out)
}

/// Unseats every peer bound to `conn` and drops its index entry.
fn detach_connection(
    rooms: &mut Rooms,
    connections: &mut Connections,
    conn: ConnectionId,
) -> Vec<Delivery> {
    let Some(room_id) = connections.remove(&conn) else {
        return Vec::new();
    };
    let Some(room) = rooms.get_mut(&room_id) else {
        return Vec::new();
    };
    room.peers.retain(|p| p.conn != conn);
    tracing::debug!(%room_id, conn_id = %conn, "connection left room");
    settle(rooms, &room_id)
}

/// Removes `peer_id` from whichever room holds it, other than `keep`.
fn detach_peer(
    rooms: &mut Rooms,
    connections: &mut Connections,
    peer_id: &str,
    keep: Option<&str>,
) -> Vec<Delivery> {
    let Some(room_id) = rooms
        .values()
        .find(|room| Some(room.id.as_str()) != keep && room.member(peer_id).is_some())
        .map(|room| room.id.clone())
    else {
        return Vec::new();
    };
    let Some(room) = rooms.get_mut(&room_id) else {
        return Vec::new();
    };
    if let Some(pos) = room.peers.iter().position(|p| p.id == peer_id) {
        let peer = room.peers.remove(pos);
        let conn_still_seated = room.peers.iter().any(|p| p.conn == peer.conn);
        if !conn_still_seated && connections.get(&peer.conn).is_some_and(|r| *r == room_id) {
            connections.remove(&peer.conn);
        }
        tracing::debug!(%room_id, peer_id, "peer moved out of room");
    }
    settle(rooms, &room_id)
}

/// Deletes the room if it is empty, otherwise tells the remaining
/// members who is left.
fn settle(rooms: &mut Rooms, room_id: &str) -> Vec<Delivery> {
    match rooms.get(room_id) {
        Some(room) if room.peers.is_empty() => {
            rooms.remove(room_id);
            tracing::info!(%room_id, "room closed");
            Vec::new()
        }
        Some(room) => room.updates(None),
        None => Vec::new(),
    }
}
