use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::config::KeepaliveConfig;
use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::ConnectionHandle;

/// How long a close frame queued by the keepalive gets to reach the peer.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Run the actor-per-connection pattern for a streaming socket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: decodes incoming frames and dispatches them to the relay
///
/// The relay keeps a clone of the channel sender (inside the
/// [`ConnectionHandle`]) so it can push events to this client. When the reader
/// loop ends for any reason, the relay's disconnect cleanup runs.
pub async fn run_connection(socket: WebSocket, state: AppState, remote_addr: SocketAddr) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let handle = ConnectionHandle::new(tx.clone());

    tracing::info!(
        handle_id = %handle.id(),
        remote_addr = %remote_addr,
        "Streaming actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();

    // Ends when a pong is late or the writer is gone; either way the socket is dead
    let mut ping_handle = tokio::spawn(ping_task(tx.clone(), pong_rx, state.keepalive.clone()));

    // Set when the keepalive gave up and queued a close frame
    let mut close_queued = false;

    // Reader loop: process incoming WebSocket messages
    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        protocol::handle_text_message(text.as_str(), &handle, &state);
                    }
                    Message::Binary(data) => {
                        tracing::debug!(
                            handle_id = %handle.id(),
                            bytes = data.len(),
                            "Ignoring binary frame"
                        );
                    }
                    Message::Pong(_) => {
                        // Pong received — notify the ping task
                        let _ = pong_tx.send(());
                    }
                    Message::Ping(data) => {
                        let _ = tx.send(Message::Pong(data));
                    }
                    Message::Close(frame) => {
                        tracing::info!(
                            handle_id = %handle.id(),
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(
                        handle_id = %handle.id(),
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    // Stream ended — client disconnected
                    tracing::info!(handle_id = %handle.id(), "WebSocket stream ended");
                    break;
                }
            },
            _ = &mut ping_handle => {
                tracing::info!(handle_id = %handle.id(), "Keepalive ended, dropping connection");
                close_queued = true;
                break;
            }
        }
    }

    // Cleanup: stop pinging, let a pending close frame go out, then stop the writer
    ping_handle.abort();
    if close_queued && timeout(CLOSE_FLUSH_TIMEOUT, &mut writer_handle).await.is_err() {
        tracing::debug!(handle_id = %handle.id(), "Close frame not flushed in time");
    }
    writer_handle.abort();

    let removed = state.relay.on_disconnect(handle.id());

    tracing::info!(
        handle_id = %handle.id(),
        sessions_removed = removed.len(),
        "Streaming actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}

/// Ping task: sends periodic pings and closes the socket when a pong is late.
async fn ping_task(
    tx: mpsc::UnboundedSender<Message>,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    keepalive: KeepaliveConfig,
) {
    let mut ping_timer = interval(keepalive.ping_interval());
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Writer task has died — connection is gone
            break;
        }

        match timeout(keepalive.pong_timeout(), pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!("Pong timeout, closing connection");
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                break;
            }
        }
    }
}
