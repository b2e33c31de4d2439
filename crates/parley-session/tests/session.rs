//! Integration tests for the client session against a scripted server.
//!
//! The "server" here is a bare `TcpTransport` driven by the test itself,
//! so each test controls exactly what the client sees and when the link
//! drops.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_backoff::BackoffConfig;
use parley_protocol::{Action, CborCodec, Codec, DataPacket, Packet, PROTOCOL_VERSION};
use parley_session::{ChatSession, ClientConfig, MessageKind, SessionError, View};
use parley_transport::{
    FrameReader, FrameWriter, FramerConfig, TcpTransport, Transport, TransportError,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;

// =========================================================================
// Recording view
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Room(String),
    Message(MessageKind, String, String),
    Peers(Vec<String>),
}

struct RecordingView {
    seen: Mutex<Vec<Seen>>,
    quit: watch::Sender<bool>,
}

impl RecordingView {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            quit: watch::channel(false).0,
        })
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn has_quit(&self) -> bool {
        *self.quit.borrow()
    }

    /// Polls until `pred` holds for what the view has seen.
    async fn wait_for(&self, what: &str, pred: impl Fn(&[Seen]) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !pred(&self.seen()) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what}; saw {:?}",
                self.seen()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl View for RecordingView {
    fn view_room(&self, room_id: &str) {
        self.seen.lock().unwrap().push(Seen::Room(room_id.to_string()));
    }

    fn view_message(&self, kind: MessageKind, from: &str, text: &str) {
        self.seen
            .lock()
            .unwrap()
            .push(Seen::Message(kind, from.to_string(), text.to_string()));
    }

    fn update_peers(&self, peers: &[String]) {
        self.seen.lock().unwrap().push(Seen::Peers(peers.to_vec()));
    }

    fn show(&self) -> impl Future<Output = ()> + Send {
        let mut rx = self.quit.subscribe();
        async move {
            let _ = rx.wait_for(|quit| *quit).await;
        }
    }

    fn quit(&self) {
        self.quit.send_replace(true);
    }
}

// =========================================================================
// Scripted server
// =========================================================================

struct ServerSide {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl ServerSide {
    async fn accept(transport: &mut TcpTransport) -> Self {
        let conn = tokio::time::timeout(Duration::from_secs(5), transport.accept())
            .await
            .expect("client should connect")
            .expect("accept should succeed");
        let (reader, writer) = conn.into_split();
        Self { reader, writer }
    }

    async fn recv(&mut self) -> Packet {
        loop {
            match self.reader.read_frame().await {
                Ok(Some(frame)) => return CborCodec.decode(&frame).unwrap(),
                Ok(None) => panic!("client closed the connection"),
                Err(TransportError::Timeout) => continue,
                Err(e) => panic!("read failed: {e}"),
            }
        }
    }

    async fn send(&mut self, packet: Packet) {
        let bytes = CborCodec.encode(&packet).unwrap();
        self.writer.write_frame(&bytes).await.unwrap();
    }
}

async fn bind() -> (TcpTransport, String) {
    let transport = TcpTransport::bind(
        "127.0.0.1:0",
        FramerConfig::with_read_timeout(Duration::from_millis(500)),
    )
    .await
    .unwrap();
    let addr = transport.local_addr().unwrap().to_string();
    (transport, addr)
}

fn config(addr: &str, peer_id: &str) -> ClientConfig {
    ClientConfig {
        max_attempts: 3,
        read_timeout: Duration::from_millis(200),
        backoff: BackoffConfig {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            factor: 2.0,
            jitter: 0.0,
        },
        peer_id: Some(peer_id.to_string()),
        ..ClientConfig::new(addr)
    }
}

fn room_reply(action: Action, room_id: &str, peers: &[&str]) -> Packet {
    Packet::new(
        action,
        DataPacket {
            room_id: room_id.to_string(),
            peers: peers.iter().map(|p| p.to_string()).collect(),
            ..DataPacket::default()
        },
    )
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_book_chat_and_leave() {
    let (mut transport, addr) = bind().await;
    let view = RecordingView::new();

    let session = ChatSession::connect(config(&addr, "peer-ann"), "ann", Arc::clone(&view))
        .await
        .unwrap();
    let mut server = ServerSide::accept(&mut transport).await;
    assert!(session.is_connected());

    // Book.
    session.book_room().unwrap();
    let request = server.recv().await;
    assert_eq!(request.kind().unwrap(), Action::BookRoom);
    assert_eq!(request.version, PROTOCOL_VERSION);
    assert_eq!(request.data.peer_id, "peer-ann");
    assert_eq!(request.data.peer_name, "ann");
    assert!(request.data.room_id.is_empty());

    server.send(room_reply(Action::BookRoom, "abc", &["ann"])).await;
    view.wait_for("room view", |seen| seen.contains(&Seen::Room("abc".into())))
        .await;
    assert!(view.seen().contains(&Seen::Peers(vec!["ann".into()])));
    assert_eq!(session.room_id().await.as_deref(), Some("abc"));

    // Inbound chat and member updates.
    server
        .send(Packet::new(
            Action::SendMsg,
            DataPacket {
                sender: "bob".into(),
                message: "hey".into(),
                ..DataPacket::default()
            },
        ))
        .await;
    server.send(room_reply(Action::UpdateRoom, "abc", &["ann", "bob"])).await;
    view.wait_for("chat line and update", |seen| {
        seen.contains(&Seen::Message(MessageKind::Chat, "bob".into(), "hey".into()))
            && seen.contains(&Seen::Peers(vec!["ann".into(), "bob".into()]))
    })
    .await;

    // Outbound chat carries the room id.
    session.send_message("yo").await.unwrap();
    let request = server.recv().await;
    assert_eq!(request.kind().unwrap(), Action::SendMsg);
    assert_eq!(request.data.room_id, "abc");
    assert_eq!(request.data.message, "yo");

    // Error replies become error lines.
    server
        .send(Packet::error(PROTOCOL_VERSION, 2, "room zzz not found"))
        .await;
    view.wait_for("error line", |seen| {
        seen.contains(&Seen::Message(
            MessageKind::Error,
            String::new(),
            "room zzz not found".into(),
        ))
    })
    .await;

    // Shutdown says goodbye first.
    session.shutdown().await;
    let request = server.recv().await;
    assert_eq!(request.kind().unwrap(), Action::LeaveRoom);
    assert_eq!(request.data.room_id, "abc");
    assert_eq!(request.data.peer_id, "peer-ann");
}

#[tokio::test]
async fn test_join_sends_room_id() {
    let (mut transport, addr) = bind().await;
    let view = RecordingView::new();
    let session = ChatSession::connect(config(&addr, "peer-b"), "bob", Arc::clone(&view))
        .await
        .unwrap();
    let mut server = ServerSide::accept(&mut transport).await;

    session.join_room("abc").unwrap();
    let request = server.recv().await;
    assert_eq!(request.kind().unwrap(), Action::JoinRoom);
    assert_eq!(request.data.room_id, "abc");
    assert_eq!(request.data.peer_name, "bob");

    server.send(room_reply(Action::JoinRoom, "abc", &["ann", "bob"])).await;
    view.wait_for("join", |seen| seen.contains(&Seen::Room("abc".into())))
        .await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_rebooks_known_room() {
    let (mut transport, addr) = bind().await;
    let view = RecordingView::new();
    let session = ChatSession::connect(config(&addr, "peer-ann"), "ann", Arc::clone(&view))
        .await
        .unwrap();

    let mut server = ServerSide::accept(&mut transport).await;
    session.book_room().unwrap();
    server.recv().await;
    server.send(room_reply(Action::BookRoom, "abc", &["ann"])).await;
    view.wait_for("booked", |seen| seen.contains(&Seen::Room("abc".into())))
        .await;

    // Drop the link; the client should come back on its own.
    drop(server);
    let mut server = ServerSide::accept(&mut transport).await;

    let request = server.recv().await;
    assert_eq!(request.kind().unwrap(), Action::BookRoom);
    assert_eq!(request.data.room_id, "abc");
    assert_eq!(request.data.peer_id, "peer-ann");

    view.wait_for("reconnect notice", |seen| {
        seen.contains(&Seen::Message(
            MessageKind::Info,
            String::new(),
            "reconnected".into(),
        ))
    })
    .await;
    assert!(view
        .seen()
        .iter()
        .any(|s| matches!(s, Seen::Message(MessageKind::Error, _, _))));

    session.shutdown().await;
}

#[tokio::test]
async fn test_exhausted_reconnect_ends_the_session() {
    let (mut transport, addr) = bind().await;
    let view = RecordingView::new();
    let session = ChatSession::connect(config(&addr, "peer-ann"), "ann", Arc::clone(&view))
        .await
        .unwrap();

    let server = ServerSide::accept(&mut transport).await;
    // Close the connection and stop listening.
    drop(server);
    drop(transport);

    view.wait_for("quit", |_| view.has_quit()).await;
    let fatal = view.seen().into_iter().any(|s| match s {
        Seen::Message(MessageKind::Error, _, text) => text.starts_with("unable to connect: "),
        _ => false,
    });
    assert!(fatal, "saw {:?}", view.seen());
    assert!(!session.is_connected());
    assert!(matches!(
        session.send_message("anyone?").await,
        Err(SessionError::NotConnected)
    ));

    session.shutdown().await;
}

#[tokio::test]
async fn test_stalled_write_drops_link_and_shutdown_still_finishes() {
    let (mut transport, addr) = bind().await;
    let view = RecordingView::new();
    let session = ChatSession::connect(
        ClientConfig {
            write_timeout: Duration::from_millis(200),
            ..config(&addr, "peer-ann")
        },
        "ann",
        Arc::clone(&view),
    )
    .await
    .unwrap();
    // Accepted but never read from.
    let _server = ServerSide::accept(&mut transport).await;

    let line = "w".repeat(50_000);
    for _ in 0..400 {
        if session.send_message(&line).await.is_err() {
            break;
        }
    }

    view.wait_for("write timeout", |seen| {
        seen.iter().any(|s| match s {
            Seen::Message(MessageKind::Error, _, text) => text.contains("write timed out"),
            _ => false,
        })
    })
    .await;

    tokio::time::timeout(Duration::from_secs(5), session.shutdown())
        .await
        .expect("shutdown should not wait on the stalled socket");
}

#[tokio::test]
async fn test_connect_fails_when_nobody_listens() {
    let addr = {
        let (transport, addr) = bind().await;
        drop(transport);
        addr
    };

    let result = ChatSession::connect(config(&addr, "peer-x"), "x", RecordingView::new()).await;
    assert!(matches!(
        result,
        Err(SessionError::ConnectExhausted { attempts: 3, .. })
    ));
}
