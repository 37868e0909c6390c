//! Per-connection task.
//!
//! Each accepted socket gets a reader loop (this task) and a writer task
//! draining the connection's outbound queue. The registry only ever talks
//! to the queue, so a slow socket never blocks routing for other clients.

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use hushroom_crypto::respond_to_client;
use hushroom_proto::frames::PONG;
use hushroom_proto::{HandshakeReply, InboundFrame, ServerAction, classify};

use super::state::RelayState;
use crate::error::RelayError;
use crate::registry::{Outbound, OutboundTx};

pub(super) async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<RelayState>,
) -> Result<(), RelayError> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(Box::new)?;
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let id = match state.registry.accept(tx.clone(), Instant::now()).await {
        Ok(id) => id,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Rejecting connection");
            let _ = sink.send(Message::Close(None)).await;
            return Err(e.into());
        }
    };
    debug!(client_id = %id, peer = %peer, "WebSocket accepted");
    queue(&tx, state.announcement().to_string());

    let mut writer = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let writer_done = loop {
        tokio::select! {
            _ = &mut writer => break true,
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if handle_frame(&state, &id, &tx, &text).await.is_break() {
                        break false;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break false,
                // ping/pong at the WebSocket level are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client_id = %id, error = %e, "Read failed");
                    break false;
                }
            },
        }
    };

    state.registry.disconnect(&id).await;
    if !writer_done {
        let _ = tx.send(Outbound::Close);
    }
    info!(client_id = %id, peer = %peer, "Connection closed");
    Ok(())
}

fn queue(tx: &OutboundTx, frame: String) {
    let _ = tx.send(Outbound::Text(frame));
}

/// Handle one text frame. `Break` closes the connection.
async fn handle_frame(
    state: &RelayState,
    id: &str,
    tx: &OutboundTx,
    text: &str,
) -> ControlFlow<()> {
    state.registry.touch(id, Instant::now()).await;
    let key = state.registry.shared_key(id).await;

    match classify(text, key.is_some(), state.max_frame_bytes()) {
        InboundFrame::Ping => queue(tx, PONG.to_string()),
        InboundFrame::Pong => {}
        InboundFrame::Handshake(client_hex) => return handshake(state, id, tx, client_hex).await,
        InboundFrame::Encrypted(frame) => {
            let Some(key) = key else {
                return ControlFlow::Continue(());
            };
            match key.decrypt::<ServerAction>(frame) {
                Ok(action) => {
                    let outcome = state.router.dispatch(id, action).await;
                    debug!(client_id = %id, ?outcome, "Action routed");
                }
                Err(e) => debug!(client_id = %id, error = %e, "Undecryptable frame dropped"),
            }
        }
        InboundFrame::Oversize => {
            debug!(client_id = %id, len = text.len(), "Frame outside size limits dropped");
        }
    }
    ControlFlow::Continue(())
}

async fn handshake(
    state: &RelayState,
    id: &str,
    tx: &OutboundTx,
    client_hex: &str,
) -> ControlFlow<()> {
    let handshake = match respond_to_client(client_hex, state.signing_key()) {
        Ok(h) => h,
        Err(e) => {
            warn!(client_id = %id, error = %e, "Handshake failed, closing");
            return ControlFlow::Break(());
        }
    };
    let reply = HandshakeReply {
        public_key_hex: handshake.public_key_hex,
        signature_b64: handshake.signature_b64,
    };
    if let Err(e) = state.registry.set_shared_key(id, handshake.server_key).await {
        warn!(client_id = %id, error = %e, "Could not install server key, closing");
        return ControlFlow::Break(());
    }
    queue(tx, reply.to_string());
    info!(client_id = %id, "Handshake complete");
    ControlFlow::Continue(())
}
