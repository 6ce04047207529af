//! Fixed-capacity byte relay between one producer and one consumer.
//!
//! The producer side admits bytes only while there is free room, so the
//! amount of buffered data never exceeds the capacity chosen at
//! construction. The relay ends exactly once, either cleanly
//! ([`Completion::Completed`]) or with an error ([`Completion::Faulted`]).
//! Bytes buffered before the end stay readable; the end itself is reported
//! only once they are drained.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use bytes::{Buf, Bytes};

use crate::{Result, StreamError};

const LOG_PREFIX: &str = "[relay]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Open,
    Completed,
    Faulted(StreamError),
}

struct RelayState {
    segments: VecDeque<Bytes>,
    buffered: usize,
    written: u64,
    drained: u64,
    completion: Completion,
    reader_closed: bool,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

pub struct BoundedRelay {
    capacity: usize,
    state: Mutex<RelayState>,
}

impl BoundedRelay {
    /// Create an empty relay holding at most `capacity` bytes. A capacity of
    /// zero is raised to one; [`crate::StreamHost`] refuses zero before it
    /// gets here.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(RelayState {
                segments: VecDeque::new(),
                buffered: 0,
                written: 0,
                drained: 0,
                completion: Completion::Open,
                reader_closed: false,
                read_waker: None,
                write_waker: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit as much of `data` as fits, advancing it past the admitted
    /// bytes. Resolves once `data` is empty.
    pub fn poll_write(&self, cx: &mut Context<'_>, data: &mut Bytes) -> Poll<Result<()>> {
        let mut state = self.lock();
        if state.reader_closed || state.completion != Completion::Open {
            return Poll::Ready(Err(StreamError::RelayClosed));
        }

        let mut admitted = false;
        while !data.is_empty() {
            let room = self.capacity - state.buffered;
            if room == 0 {
                state.write_waker = Some(cx.waker().clone());
                break;
            }
            let piece = data.split_to(room.min(data.len()));
            state.buffered += piece.len();
            state.written += piece.len() as u64;
            state.segments.push_back(piece);
            admitted = true;
        }

        let reader = if admitted {
            state.read_waker.take()
        } else {
            None
        };
        let done = data.is_empty();
        drop(state);

        if let Some(waker) = reader {
            waker.wake();
        }
        if done {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }

    /// Append `data`, suspending while the relay is full.
    pub async fn write(&self, data: Bytes) -> Result<()> {
        let mut data = data;
        poll_fn(|cx| self.poll_write(cx, &mut data)).await
    }

    /// Copy buffered bytes into `buf`. Resolves with 0 at a clean end and
    /// with the stored reason at a faulted end, but only once every
    /// buffered byte has been read.
    pub fn poll_read(&self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if state.reader_closed {
            return Poll::Ready(Err(StreamError::RelayClosed));
        }

        if state.buffered == 0 {
            return match &state.completion {
                Completion::Open => {
                    state.read_waker = Some(cx.waker().clone());
                    Poll::Pending
                }
                Completion::Completed => Poll::Ready(Ok(0)),
                Completion::Faulted(reason) => Poll::Ready(Err(reason.clone())),
            };
        }

        let mut copied = 0;
        while copied < buf.len() {
            let Some(front) = state.segments.front_mut() else {
                break;
            };
            let n = front.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&front[..n]);
            front.advance(n);
            if front.is_empty() {
                state.segments.pop_front();
            }
            copied += n;
        }
        state.buffered -= copied;
        state.drained += copied as u64;

        let writer = state.write_waker.take();
        drop(guard);

        if let Some(waker) = writer {
            waker.wake();
        }
        Poll::Ready(Ok(copied))
    }

    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        poll_fn(|cx| self.poll_read(cx, buf)).await
    }

    /// Mark the clean end of data. Returns false if the relay had already
    /// ended.
    pub fn complete(&self) -> bool {
        self.finish(Completion::Completed)
    }

    /// Mark a faulted end of data. Returns false if the relay had already
    /// ended, in which case `reason` is dropped.
    pub fn fault(&self, reason: StreamError) -> bool {
        self.finish(Completion::Faulted(reason))
    }

    fn finish(&self, completion: Completion) -> bool {
        let mut state = self.lock();
        if state.completion != Completion::Open {
            log::trace!(
                "{} ignoring {:?}, relay already ended with {:?}",
                LOG_PREFIX,
                completion,
                state.completion
            );
            return false;
        }
        log::trace!("{} ending with {:?} after {} bytes", LOG_PREFIX, completion, state.written);
        state.completion = completion;
        let wakers = (state.read_waker.take(), state.write_waker.take());
        drop(state);

        wake_all(wakers);
        true
    }

    /// Detach the consumer. Buffered bytes are released and any pending or
    /// later write fails instead of waiting for room that never frees up.
    pub fn close_reader(&self) {
        let mut state = self.lock();
        if state.reader_closed {
            return;
        }
        state.reader_closed = true;
        state.segments.clear();
        state.buffered = 0;
        let wakers = (state.read_waker.take(), state.write_waker.take());
        drop(state);

        wake_all(wakers);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes admitted but not yet read.
    pub fn buffered(&self) -> usize {
        self.lock().buffered
    }

    /// Bytes admitted since construction.
    pub fn written(&self) -> u64 {
        self.lock().written
    }

    /// Bytes handed to the consumer since construction.
    pub fn drained(&self) -> u64 {
        self.lock().drained
    }

    pub fn completion(&self) -> Completion {
        self.lock().completion.clone()
    }
}

fn wake_all((reader, writer): (Option<Waker>, Option<Waker>)) {
    if let Some(waker) = reader {
        waker.wake();
    }
    if let Some(waker) = writer {
        waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const PENDING: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn drains_then_reports_end_of_data() {
        let relay = BoundedRelay::new(16);
        relay.write(Bytes::from_static(b"hello")).await.unwrap();
        assert!(relay.complete());

        let mut buf = [0u8; 16];
        assert_eq!(relay.read(&mut buf).await.unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(relay.read(&mut buf).await.unwrap(), 0);
        assert_eq!(relay.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn writer_waits_for_room() {
        let relay = Arc::new(BoundedRelay::new(4));
        let producer = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.write(Bytes::from_static(b"abcdefghij")).await })
        };

        tokio::time::sleep(PENDING).await;
        assert!(!producer.is_finished());
        assert_eq!(relay.buffered(), 4);

        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        while out.len() < 10 {
            let n = relay.read(&mut buf).await.unwrap();
            assert!(relay.buffered() <= relay.capacity());
            out.extend_from_slice(&buf[..n]);
        }
        producer.await.unwrap().unwrap();
        assert_eq!(out, b"abcdefghij");
        assert_eq!(relay.drained(), 10);
    }

    #[tokio::test]
    async fn fault_surfaces_after_buffered_bytes() {
        let relay = BoundedRelay::new(8);
        relay.write(Bytes::from_static(b"ab")).await.unwrap();
        assert!(relay.fault(StreamError::EmptyChunk));
        assert!(!relay.complete());

        let mut buf = [0u8; 8];
        assert_eq!(relay.read(&mut buf).await.unwrap(), 2);
        assert_eq!(relay.read(&mut buf).await, Err(StreamError::EmptyChunk));
        assert_eq!(relay.read(&mut buf).await, Err(StreamError::EmptyChunk));
    }

    #[tokio::test]
    async fn pending_read_wakes_on_fault() {
        let relay = Arc::new(BoundedRelay::new(8));
        let reader = {
            let relay = relay.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8];
                relay.read(&mut buf).await
            })
        };

        tokio::time::sleep(PENDING).await;
        assert!(!reader.is_finished());
        relay.fault(StreamError::RemoteReported("boom".into()));

        assert_eq!(reader.await.unwrap(), Err(StreamError::RemoteReported("boom".into())));
    }

    #[tokio::test]
    async fn write_after_end_is_rejected() {
        let relay = BoundedRelay::new(8);
        relay.complete();
        assert_eq!(relay.write(Bytes::from_static(b"x")).await, Err(StreamError::RelayClosed));
        assert_eq!(relay.written(), 0);
    }

    #[tokio::test]
    async fn closing_the_reader_releases_a_blocked_writer() {
        let relay = Arc::new(BoundedRelay::new(2));
        let producer = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.write(Bytes::from_static(b"abcd")).await })
        };

        tokio::time::sleep(PENDING).await;
        relay.close_reader();

        let result = timeout(Duration::from_secs(1), producer)
            .await
            .expect("writer stayed blocked")
            .unwrap();
        assert_eq!(result, Err(StreamError::RelayClosed));
        assert_eq!(relay.buffered(), 0);
    }
}
