//! Consumer side of a transfer.
//!
//! [`TransferStream`] reads straight from the session's relay and has no
//! buffer of its own. It is read-only and strictly sequential: seeking,
//! writing, resizing and blocking reads are refused immediately, since any
//! of them would either desynchronize from the relay or park a thread for
//! as long as the remote takes to send.

use std::future::Future;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::cancel::MergedCancellation;
use crate::session::{SessionState, TransferSession};
use crate::{Result, StreamError, TransferId};

pub struct TransferStream {
    session: Arc<TransferSession>,
    // Wakes a pending `poll_read` when the session token fires.
    session_cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl TransferStream {
    pub(crate) fn new(session: Arc<TransferSession>) -> Self {
        let session_cancelled = Box::pin(session.cancellation().clone().cancelled_owned());
        Self { session, session_cancelled }
    }

    pub fn id(&self) -> TransferId {
        self.session.id()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Length the remote declared for the whole payload.
    pub fn total_len(&self) -> u64 {
        self.session.total_len()
    }

    pub fn bytes_received(&self) -> u64 {
        self.session.bytes_received()
    }

    pub fn can_read(&self) -> bool {
        true
    }

    pub fn can_seek(&self) -> bool {
        false
    }

    pub fn can_write(&self) -> bool {
        false
    }

    /// Bytes that have reached this stream so far, read or not. This grows
    /// as chunks arrive and only matches [`Self::total_len`] once the
    /// transfer has completed.
    pub fn len(&self) -> u64 {
        self.session.relay().written()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes already handed to the reader.
    pub fn position(&self) -> u64 {
        self.session.relay().drained()
    }

    /// Reads up to `buf.len()` bytes, returning 0 at the end of the payload.
    /// Aborted with [`StreamError::Cancelled`] if the session's cancellation
    /// fires first.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_with_cancel(buf, &CancellationToken::new()).await
    }

    /// Like [`Self::read`], additionally aborted by `cancel`. Cancelling only
    /// ends this read; the transfer keeps running.
    pub async fn read_with_cancel(
        &mut self,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let cancellation = MergedCancellation::new(self.session.cancellation(), cancel);
        if cancellation.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(StreamError::Cancelled),
            read = self.session.relay().read(buf) => read,
        }
    }

    /// Drains the rest of the payload into `out`.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut buf = vec![0u8; READ_TO_END_BUFFER];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    pub fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Err(StreamError::Unsupported("seek"))
    }

    pub fn set_position(&mut self, _position: u64) -> Result<()> {
        Err(StreamError::Unsupported("setting the position"))
    }

    pub fn set_len(&mut self, _len: u64) -> Result<()> {
        Err(StreamError::Unsupported("setting the length"))
    }

    pub fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(StreamError::Unsupported("write"))
    }

    pub fn flush(&mut self) -> Result<()> {
        Err(StreamError::Unsupported("flush"))
    }

    pub fn read_blocking(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(StreamError::Unsupported("synchronous reads"))
    }

    /// Ends the transfer from the consumer side. Chunks that arrive
    /// afterwards are reported as belonging to an unknown transfer.
    pub fn dispose(&self) {
        self.session.dispose();
    }
}

const READ_TO_END_BUFFER: usize = 16 * 1024;

impl Drop for TransferStream {
    fn drop(&mut self) {
        self.session.dispose();
    }
}

impl AsyncRead for TransferStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.session.cancellation().is_cancelled()
            || this.session_cancelled.as_mut().poll(cx).is_ready()
        {
            return Poll::Ready(Err(StreamError::Cancelled.into()));
        }

        let dst = buf.initialize_unfilled();
        match this.session.relay().poll_read(cx, dst) {
            Poll::Ready(Ok(n)) => {
                buf.advance(n);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl io::Read for TransferStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_blocking(buf)?)
    }
}

impl io::Write for TransferStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(TransferStream::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(TransferStream::flush(self)?)
    }
}

impl io::Seek for TransferStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(TransferStream::seek(self, pos)?)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::session::Chunk;
    use crate::SessionRegistry;

    fn stream(total_len: u64) -> TransferStream {
        let registry = Arc::new(SessionRegistry::new());
        let session = TransferSession::new(
            TransferId::new(),
            total_len,
            8,
            CancellationToken::new(),
            registry.clone(),
        );
        registry.add(session.id(), &session);
        TransferStream::new(session)
    }

    #[tokio::test]
    async fn length_tracks_arrived_bytes_not_the_declared_total() {
        let mut stream = stream(10);
        stream.session.supply(Chunk::Data(Bytes::from_static(b"abcd"))).await;

        assert_eq!(stream.total_len(), 10);
        assert_eq!(stream.len(), 4);
        assert_eq!(stream.position(), 0);

        let mut buf = [0u8; 3];
        assert_eq!(stream.read(&mut buf).await, Ok(3));
        assert_eq!(stream.position(), 3);
        assert_eq!(stream.len(), 4);
    }

    #[tokio::test]
    async fn reads_fail_once_disposed() {
        let mut stream = stream(4);
        stream.dispose();

        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).await, Err(StreamError::RelayClosed));
        assert_eq!(stream.state(), SessionState::Disposed);
    }

    #[test]
    fn blocking_reads_fail_fast() {
        let mut stream = stream(4);
        let mut buf = [0u8; 4];
        assert_eq!(
            stream.read_blocking(&mut buf),
            Err(StreamError::Unsupported("synchronous reads"))
        );
        assert_eq!(stream.write(b"x"), Err(StreamError::Unsupported("write")));
    }
}
