//! Per-transfer reassembly state.
//!
//! A [`TransferSession`] validates each inbound chunk against the declared
//! total length and feeds the admitted bytes into its [`BoundedRelay`]. Every
//! path through [`TransferSession::supply`] leaves the relay either open for
//! more data or ended, so a reader is never left waiting on a transfer that
//! can no longer make progress.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::relay::{BoundedRelay, Completion};
use crate::{Result, SessionRegistry, StreamError, TransferId};

const LOG_PREFIX: &str = "[session]";

/// One inbound notification for a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data(Bytes),
    Error(String),
}

impl Chunk {
    /// Builds a chunk from the optional parts of a notification. A non-empty
    /// error wins over data; missing data is an empty chunk.
    pub fn from_parts(data: Option<Bytes>, error: Option<String>) -> Self {
        match error {
            Some(message) if !message.is_empty() => Chunk::Error(message),
            _ => Chunk::Data(data.unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Completed,
    Faulted,
    Disposed,
}

pub struct TransferSession {
    id: TransferId,
    total_len: u64,
    bytes_received: AtomicU64,
    relay: BoundedRelay,
    cancellation: CancellationToken,
    registry: Arc<SessionRegistry<TransferSession>>,
    // Serializes `supply` in case the channel layer overlaps deliveries.
    supply_lock: tokio::sync::Mutex<()>,
    disposed: AtomicBool,
}

impl TransferSession {
    pub fn new(
        id: TransferId,
        total_len: u64,
        buffer_capacity: usize,
        cancellation: CancellationToken,
        registry: Arc<SessionRegistry<TransferSession>>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            id,
            total_len,
            bytes_received: AtomicU64::new(0),
            relay: BoundedRelay::new(buffer_capacity),
            cancellation,
            registry,
            supply_lock: tokio::sync::Mutex::new(()),
            disposed: AtomicBool::new(false),
        });
        if total_len == 0 {
            session.relay.complete();
        }
        session
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Acquire)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn relay(&self) -> &BoundedRelay {
        &self.relay
    }

    pub fn state(&self) -> SessionState {
        if self.disposed.load(Ordering::Acquire) {
            return SessionState::Disposed;
        }
        match self.relay.completion() {
            Completion::Open => SessionState::Active,
            Completion::Completed => SessionState::Completed,
            Completion::Faulted(_) => SessionState::Faulted,
        }
    }

    /// Applies one inbound notification. Violations fault the relay instead
    /// of being returned, so every reader observes them.
    pub async fn supply(&self, chunk: Chunk) {
        let _serial = self.supply_lock.lock().await;

        if let Completion::Faulted(_) | Completion::Completed = self.relay.completion() {
            log::debug!("{} {} already ended, rejecting notification", LOG_PREFIX, self.id);
            return;
        }

        let data = match chunk {
            Chunk::Error(message) => {
                self.fault(StreamError::RemoteReported(message));
                return;
            }
            Chunk::Data(data) if data.is_empty() => {
                self.fault(StreamError::EmptyChunk);
                return;
            }
            Chunk::Data(data) => data,
        };

        if let Err(e) = self.admit(data).await {
            self.fault(e);
        }
    }

    async fn admit(&self, data: Bytes) -> Result<()> {
        let observed = self.bytes_received().saturating_add(data.len() as u64);
        if observed > self.total_len {
            return Err(StreamError::LengthExceeded { declared: self.total_len, observed });
        }

        let written = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(StreamError::Cancelled),
            written = self.relay.write(data) => written,
        };
        if let Err(e) = written {
            // An aborted write may have admitted part of the chunk.
            self.bytes_received.store(self.relay.written(), Ordering::Release);
            return Err(e);
        }
        self.bytes_received.store(observed, Ordering::Release);

        log::trace!("{} {} received {}/{} bytes", LOG_PREFIX, self.id, observed, self.total_len);

        if observed == self.total_len {
            self.relay.complete();
            self.registry.remove(&self.id);
            log::debug!("{} {} completed after {} bytes", LOG_PREFIX, self.id, observed);
        }
        Ok(())
    }

    fn fault(&self, reason: StreamError) {
        log::warn!("{} {} faulted: {}", LOG_PREFIX, self.id, reason);
        self.relay.fault(reason);
    }

    /// Unregisters the transfer and detaches its consumer. Later calls are
    /// no-ops.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.remove(&self.id);
        self.relay.close_reader();
        log::debug!("{} {} disposed", LOG_PREFIX, self.id);
    }
}
