//! Messages exchanged with the remote runtime and the outbound seam.
//!
//! The wire encoding belongs to the message channel; these types only fix
//! the fields and derive `serde` so the channel can encode them as it likes.

use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::TransferId;

/// Reference to the object on the remote side that holds the payload.
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(pub u64);

/// Asks the remote runtime to start sending `source` as chunk
/// notifications tagged with `transfer_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendStreamRequest {
    pub transfer_id: TransferId,
    pub source: SourceRef,
    /// Most bytes the remote may pack into one chunk notification.
    pub max_chunk_size: u64,
}

/// One chunk notification as delivered by the remote runtime. Exactly one
/// of `data` and `error` is expected to be set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkNotification {
    /// Kept as text so a malformed id is reported as an unknown transfer
    /// rather than a decoding failure.
    pub transfer_id: String,
    #[serde(default)]
    pub data: Option<Vec<u8>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChunkNotification {
    pub fn data(transfer_id: TransferId, data: impl Into<Vec<u8>>) -> Self {
        Self {
            transfer_id: transfer_id.to_string(),
            data: Some(data.into()),
            error: None,
        }
    }

    pub fn error(transfer_id: TransferId, error: impl Into<String>) -> Self {
        Self {
            transfer_id: transfer_id.to_string(),
            data: None,
            error: Some(error.into()),
        }
    }

    pub(crate) fn into_parts(self) -> (Option<Bytes>, Option<String>) {
        (self.data.map(Bytes::from), self.error)
    }
}

/// Outbound side of the persistent message channel.
pub trait RemoteChannel: Send + Sync {
    fn send_stream_request(
        &self,
        request: SendStreamRequest,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl RemoteChannel for mpsc::Sender<SendStreamRequest> {
    async fn send_stream_request(&self, request: SendStreamRequest) -> anyhow::Result<()> {
        self.send(request).await.map_err(|_| anyhow::anyhow!("remote channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_fields_are_optional_on_the_wire() {
        let id = TransferId::new();
        let json = format!(r#"{{"transfer_id":"{}","error":"gone"}}"#, id);
        let notification: ChunkNotification = serde_json::from_str(&json).unwrap();
        assert_eq!(notification, ChunkNotification::error(id, "gone"));
    }

    #[test]
    fn request_serializes_plain_ids() {
        let id = TransferId::new();
        let request = SendStreamRequest {
            transfer_id: id,
            source: SourceRef(7),
            max_chunk_size: 1024,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["transfer_id"], id.to_string());
        assert_eq!(value["source"], 7);
        assert_eq!(value["max_chunk_size"], 1024);
    }
}
