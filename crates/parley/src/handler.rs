//! Per-connection handler: read frames, dispatch, write replies.
//!
//! Each accepted connection gets its own reader loop (this function) and
//! a dedicated writer task. Everything addressed to the connection, from
//! its own replies to broadcasts triggered by other peers, goes through
//! one unbounded channel to that writer, so packets leave in the order
//! they were produced.
//!
//! The flow is:
//!   1. Loop: read frame → dispatch → deliver
//!   2. On close, error, `LeaveRoom`, a dead writer or server shutdown:
//!      disconnect cleanup, then let the writer drain and close the socket
//!
//! The writer gives up on a client that stops reading once the write
//! deadline passes, and stops mid-write when the server shuts down.

use std::sync::Arc;

use parley_protocol::{CborCodec, Codec, Packet};
use parley_room::deliver;
use parley_transport::{ConnectionId, FrameWriter, TcpConnection, TransportError};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};

use crate::dispatch::Outcome;
use crate::server::ServerState;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: TcpConnection,
    state: Arc<ServerState>,
    mut stop: watch::Receiver<bool>,
) {
    let conn_id = conn.id();
    let peer_addr = conn.peer_addr();
    tracing::info!(%conn_id, %peer_addr, "connection opened");

    let (mut reader, writer) = conn.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_loop(
        conn_id,
        writer,
        rx,
        *state.dispatcher.codec(),
        stop.clone(),
    ));

    loop {
        if *stop.borrow() {
            tracing::debug!(%conn_id, "server stopping");
            break;
        }

        let frame = tokio::select! {
            frame = reader.read_frame() => frame,
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = tx.closed() => {
                tracing::debug!(%conn_id, "writer gone");
                break;
            }
        };

        match frame {
            Ok(Some(bytes)) => match state.dispatcher.dispatch(conn_id, &tx, &bytes).await {
                Outcome::Continue(deliveries) => deliver(deliveries),
                Outcome::Close(deliveries) => {
                    deliver(deliveries);
                    break;
                }
                Outcome::Fatal(err) => {
                    tracing::error!(%conn_id, error = %err, "fatal room error");
                    let _ = state.fatal.send(err);
                    break;
                }
            },
            Ok(None) => {
                tracing::debug!(%conn_id, "closed by peer");
                break;
            }
            Err(TransportError::Timeout) => continue,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "read failed");
                break;
            }
        }
    }

    deliver(state.dispatcher.disconnect(conn_id).await);
    drop(tx);
    if let Err(e) = writer_task.await {
        tracing::debug!(%conn_id, error = %e, "writer task ended abnormally");
    }
    tracing::info!(%conn_id, "connection closed");
}

/// Encodes and writes every packet queued for this connection. Ends when
/// every sender is gone, the socket breaks, a write misses its deadline or
/// the server stops.
async fn write_loop(
    conn_id: ConnectionId,
    mut writer: FrameWriter<OwnedWriteHalf>,
    mut rx: mpsc::UnboundedReceiver<Packet>,
    codec: CborCodec,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let packet = tokio::select! {
            biased;
            packet = rx.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
            _ = stop.wait_for(|stopped| *stopped) => return,
        };
        let bytes = match codec.encode(&packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "encode failed, dropping packet");
                continue;
            }
        };
        let written = tokio::select! {
            written = writer.write_frame(&bytes) => written,
            _ = stop.wait_for(|stopped| *stopped) => return,
        };
        if let Err(e) = written {
            if matches!(e, TransportError::WriteTimeout) {
                tracing::warn!(%conn_id, "client stopped reading, dropping connection");
            } else {
                tracing::debug!(%conn_id, error = %e, "write failed");
            }
            return;
        }
    }
    let _ = writer.shutdown().await;
}
