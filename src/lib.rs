//! Reassembly of payloads pushed by a remote runtime as chunk notifications.
//!
//! The remote side cannot send a large payload as one message, so it splits
//! it into chunks and delivers them one notification at a time over an
//! existing message channel. This crate turns those notifications back into
//! a sequential byte stream that server code can read while chunks are still
//! arriving, with bounded memory and with protocol violations or remote
//! failures reported to the reader.
//!
//! Typical flow:
//! 1. Create a [`StreamHost`] around the outbound [`RemoteChannel`].
//! 2. Call [`StreamHost::start`] (or [`StreamHost::open`]) to obtain a
//!    [`TransferStream`]; the remote is asked to begin sending.
//! 3. Forward every inbound notification to [`StreamHost::dispatch`]; a
//!    `false` result means the transfer is gone and the remote should stop.
//! 4. Read the stream until it returns 0 bytes, then drop it.

pub mod cancel;
pub mod channel;
mod config;
mod errors;
mod host;
mod id;
pub mod registry;
pub mod relay;
pub mod session;
mod stream;

pub use channel::{ChunkNotification, RemoteChannel, SendStreamRequest, SourceRef};
pub use config::StreamConfig;
pub use errors::{Result, StreamError};
pub use host::StreamHost;
pub use id::TransferId;
pub use registry::SessionRegistry;
pub use session::{Chunk, SessionState, TransferSession};
pub use stream::TransferStream;
