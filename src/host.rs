//! Entry points used by the rest of the server.
//!
//! A [`StreamHost`] owns the registry of live transfers for one message
//! channel. [`StreamHost::start`] opens a transfer and asks the remote to
//! begin sending; [`StreamHost::dispatch`] is called by the channel layer for
//! every chunk notification it receives.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChunkNotification, RemoteChannel, SendStreamRequest, SourceRef};
use crate::session::{Chunk, SessionState, TransferSession};
use crate::{Result, SessionRegistry, StreamConfig, StreamError, TransferId, TransferStream};

const LOG_PREFIX: &str = "[stream-host]";

pub struct StreamHost<C> {
    channel: C,
    config: StreamConfig,
    registry: Arc<SessionRegistry<TransferSession>>,
}

impl<C: RemoteChannel> StreamHost<C> {
    pub fn new(channel: C, config: StreamConfig) -> Self {
        Self {
            channel,
            config,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Opens a transfer using the host configuration, refusing payloads
    /// larger than `max_allowed_size` before anything is sent.
    pub async fn open(
        &self,
        source: SourceRef,
        total_len: u64,
        cancellation: CancellationToken,
    ) -> Result<TransferStream> {
        if total_len > self.config.max_allowed_size {
            return Err(StreamError::TooLarge {
                declared: total_len,
                limit: self.config.max_allowed_size,
            });
        }
        self.start(
            source,
            total_len,
            self.config.max_buffer_size,
            self.config.max_chunk_size,
            cancellation,
        )
        .await
    }

    /// Registers a new transfer of `total_len` bytes and asks the remote to
    /// stream `source` in chunks of at most `chunk_size_hint` bytes.
    ///
    /// Returns as soon as the request is sent; the first read on the stream
    /// waits for data. If `cancellation` fires before the request is sent
    /// the transfer is discarded and [`StreamError::Cancelled`] returned.
    /// A zero `buffer_capacity` is refused with [`StreamError::ZeroCapacity`].
    pub async fn start(
        &self,
        source: SourceRef,
        total_len: u64,
        buffer_capacity: usize,
        chunk_size_hint: u64,
        cancellation: CancellationToken,
    ) -> Result<TransferStream> {
        if buffer_capacity == 0 {
            return Err(StreamError::ZeroCapacity);
        }

        let id = TransferId::new();
        let session = TransferSession::new(
            id,
            total_len,
            buffer_capacity,
            cancellation.clone(),
            self.registry.clone(),
        );
        let stream = TransferStream::new(session.clone());

        if total_len == 0 {
            log::debug!("{} {} is empty, nothing to request", LOG_PREFIX, id);
            return Ok(stream);
        }

        self.registry.add(id, &session);
        log::debug!(
            "{} starting {} for {:?}: {} bytes, {} byte buffer, {} byte chunks",
            LOG_PREFIX,
            id,
            source,
            total_len,
            buffer_capacity,
            chunk_size_hint
        );

        let request = SendStreamRequest {
            transfer_id: id,
            source,
            max_chunk_size: chunk_size_hint,
        };
        let sent = tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(StreamError::Cancelled),
            sent = self.channel.send_stream_request(request) => sent.map_err(StreamError::from),
        };
        sent?;

        Ok(stream)
    }

    /// Routes one chunk notification to its transfer.
    ///
    /// Returns false when no live transfer has this id, which tells the
    /// remote to stop sending. Everything else, including protocol
    /// violations, is reported to the transfer's reader instead.
    pub async fn dispatch(
        &self,
        id: TransferId,
        data: Option<Bytes>,
        error: Option<String>,
    ) -> bool {
        let Some(session) = self.registry.try_get(&id) else {
            log::debug!("{} no live transfer for {}", LOG_PREFIX, id);
            return false;
        };
        session.supply(Chunk::from_parts(data, error)).await;
        true
    }

    /// Decodes the id of `notification` and dispatches it. Ids that do not
    /// parse are treated as unknown.
    pub async fn dispatch_notification(&self, notification: ChunkNotification) -> bool {
        let id = match notification.transfer_id.parse::<TransferId>() {
            Ok(id) => id,
            Err(e) => {
                log::warn!(
                    "{} malformed transfer id {:?}: {}",
                    LOG_PREFIX,
                    notification.transfer_id,
                    e
                );
                return false;
            }
        };
        let (data, error) = notification.into_parts();
        self.dispatch(id, data, error).await
    }

    /// Ids of transfers still waiting for data. Faulted transfers stay
    /// registered until their reader lets go but are not listed here.
    pub fn active_transfers(&self) -> Vec<TransferId> {
        self.registry
            .ids()
            .into_iter()
            .filter(|id| {
                self.registry
                    .try_get(id)
                    .is_some_and(|session| session.state() == SessionState::Active)
            })
            .collect()
    }
}
