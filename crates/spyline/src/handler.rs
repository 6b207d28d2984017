//! Per-connection handler: decode inbound frames, forward them to the
//! gateway, and write the gateway's events back out.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`], plus a writer task draining the connection's
//! outbox. Reads and writes proceed independently.

use std::sync::Arc;

use spyline_protocol::{ClientAction, Codec, ConnectionId, ErrorReason, ServerEvent};
use spyline_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::gateway::Outbox;
use crate::{GatewayHandle, SpylineError};

/// Drop guard that disconnects the connection from the gateway when the
/// handler exits, however it exits.
///
/// `Drop` is synchronous, so the disconnect is sent from a spawned task.
struct DisconnectGuard {
    conn_id: ConnectionId,
    gateway: GatewayHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway.disconnect(conn_id).await {
                tracing::debug!(%conn_id, error = %e, "disconnect after close failed");
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C>(
    conn: WebSocketConnection,
    gateway: GatewayHandle,
    codec: C,
) -> Result<(), SpylineError>
where
    C: Codec + Clone,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let (outbox, inbox) = mpsc::unbounded_channel();
    gateway.attach(conn_id, outbox.clone()).await?;
    let _guard = DisconnectGuard {
        conn_id,
        gateway: gateway.clone(),
    };

    let writer = tokio::spawn(write_events(Arc::clone(&conn), inbox, codec.clone()));
    let result = read_actions(&conn, &gateway, &codec, &outbox).await;

    writer.abort();
    // _guard drops here → gateway disconnect fires.
    result
}

/// Reads frames until the peer closes. Undecodable frames are answered
/// with an `invalidMessage` error and otherwise ignored.
async fn read_actions<C: Codec>(
    conn: &WebSocketConnection,
    gateway: &GatewayHandle,
    codec: &C,
    outbox: &Outbox,
) -> Result<(), SpylineError> {
    let conn_id = conn.id();
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Err(e.into());
            }
        };

        let action: ClientAction = match codec.decode(&data) {
            Ok(action) => action,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode action");
                report_invalid(outbox, conn_id, e.to_string());
                continue;
            }
        };

        tracing::trace!(%conn_id, ?action, "action received");
        gateway.act(conn_id, action).await?;
    }
}

/// Queues an `invalidMessage` error for `conn_id`. Returns `false` if the
/// outbox is already closed.
fn report_invalid(outbox: &Outbox, conn_id: ConnectionId, message: String) -> bool {
    let event = ServerEvent::ActionError {
        reason: ErrorReason::InvalidMessage,
        message,
    };
    if outbox.send(event).is_err() {
        tracing::trace!(%conn_id, "outbox closed, dropping invalidMessage error");
        return false;
    }
    true
}

/// Drains the outbox onto the wire until the outbox closes or a send fails.
async fn write_events<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut inbox: mpsc::UnboundedReceiver<ServerEvent>,
    codec: C,
) {
    let conn_id = conn.id();
    while let Some(event) = inbox.recv().await {
        let bytes = match codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
}
