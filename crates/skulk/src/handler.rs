//! Per-connection gateway.
//!
//! Each accepted connection is split in two:
//!   1. a writer task drains the connection's outbound queue, encoding each
//!      event as a text frame;
//!   2. the handler itself reads frames, decodes them into
//!      [`ClientMessage`]s, and forwards them to the orchestrator.
//!
//! The orchestrator holds the only other sender for the queue, so the writer
//! stops once the connection's record is removed on disconnect.

use skulk_protocol::{ClientMessage, Codec, ServerMessage};
use skulk_room::OrchestratorHandle;
use skulk_transport::{Connection, ConnectionId, FrameReceiver, FrameSender};
use tokio::sync::mpsc;

use crate::SkulkError;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, K>(
    conn: C,
    orchestrator: OrchestratorHandle,
    codec: K,
) -> Result<(), SkulkError>
where
    C: Connection,
    K: Codec + Clone,
{
    let conn_id = conn.id();
    let (sender, mut receiver) = conn.split();
    let (outbound, queue) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(conn_id, sender, queue, codec.clone()));
    tracing::info!(%conn_id, "connection accepted");

    orchestrator.connect(conn_id, outbound).await?;
    let result = read_loop(conn_id, &mut receiver, &orchestrator, &codec).await;

    // Runs on every exit path, error or not.
    if let Err(e) = orchestrator.disconnect(conn_id).await {
        tracing::warn!(%conn_id, error = %e, "disconnect not delivered");
    }
    if let Err(e) = writer.await {
        tracing::warn!(%conn_id, error = %e, "writer task failed");
    }
    result
}

async fn read_loop<R, K>(
    conn_id: ConnectionId,
    receiver: &mut R,
    orchestrator: &OrchestratorHandle,
    codec: &K,
) -> Result<(), SkulkError>
where
    R: FrameReceiver,
    K: Codec,
{
    loop {
        let data = match receiver.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Ok(());
            }
        };

        match codec.decode::<ClientMessage>(&data) {
            Ok(msg) => orchestrator.submit(conn_id, msg).await?,
            Err(e) => orchestrator.reject(conn_id, e.to_string()).await?,
        }
    }
}

async fn write_loop<S, K>(
    conn_id: ConnectionId,
    mut sender: S,
    mut queue: mpsc::UnboundedReceiver<ServerMessage>,
    codec: K,
) where
    S: FrameSender,
    K: Codec,
{
    while let Some(msg) = queue.recv().await {
        let text = match codec.encode(&msg) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(%conn_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = sender.send_text(&text).await {
            tracing::debug!(%conn_id, error = %e, "send failed, writer stopping");
            break;
        }
    }
    // Best effort; the peer may already be gone.
    let _ = sender.close().await;
    tracing::trace!(%conn_id, "writer stopped");
}
