//! Outbound command path.
//!
//! Commands are fire-and-forget with a failure signal: no queueing, no
//! retries. Each call writes one whole frame under the writer mutex, so
//! concurrent senders can never interleave partial frames.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error};
use vaclink_proto::encode_frame;
use vaclink_types::{BridgeError, CommandEnvelope};

use crate::state::StateStore;

/// The supervisor installs a writer here while connected and clears it on
/// teardown; an empty slot means `NotConnected`.
pub(crate) type WriterSlot = Arc<Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>;

/// Builds command envelopes and writes them through the active connection.
#[derive(Clone)]
pub struct CommandSender {
    writer: WriterSlot,
    store: StateStore,
}

impl CommandSender {
    pub(crate) fn new(writer: WriterSlot, store: StateStore) -> Self {
        Self { writer, store }
    }

    /// Send `{origin: "ha", infoType, sn, data}` as one framed message.
    ///
    /// Fails fast with [`BridgeError::NotConnected`] when no connection is
    /// established; a broken write surfaces as [`BridgeError::WriteFailed`]
    /// and is otherwise swallowed here — the read loop detects the dead
    /// connection on its own and drives the reconnect.
    pub async fn send(&self, info_type: u32, data: Value) -> Result<(), BridgeError> {
        let envelope = CommandEnvelope::new(info_type, self.store.serial(), data);
        let frame = encode_frame(&envelope)?;

        let mut slot = self.writer.lock().await;
        let Some(writer) = slot.as_mut() else {
            debug!(info_type, "command dropped, not connected to proxy");
            return Err(BridgeError::NotConnected);
        };

        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                debug!(info_type, "command sent");
                Ok(())
            }
            Err(e) => {
                error!(info_type, error = %e, "command write failed");
                Err(BridgeError::WriteFailed(e))
            }
        }
    }
}
