use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Failures observable by the consumer of a transfer or by the caller that
/// starts one. Faults stored in a relay are cloned to every reader, so the
/// variants only carry owned, cloneable data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("An error occurred while reading the remote stream: {0}")]
    RemoteReported(String),
    #[error("The incoming data chunk cannot be empty")]
    EmptyChunk,
    #[error(
        "The incoming data stream declared a length {declared}, but {observed} bytes were read"
    )]
    LengthExceeded { declared: u64, observed: u64 },
    #[error(
        "The incoming data stream declared a length {declared}, which exceeds the limit of {limit} bytes"
    )]
    TooLarge { declared: u64, limit: u64 },
    #[error("Operation is not supported: {0}")]
    Unsupported(&'static str),
    #[error("The operation was cancelled")]
    Cancelled,
    #[error("The relay buffer must hold at least one byte")]
    ZeroCapacity,
    #[error("The relay no longer accepts data")]
    RelayClosed,
    #[error("Message channel error: {0}")]
    Channel(String),
}

impl From<anyhow::Error> for StreamError {
    fn from(e: anyhow::Error) -> Self {
        Self::Channel(e.to_string())
    }
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        let kind = match e {
            StreamError::Unsupported(_) => io::ErrorKind::Unsupported,
            StreamError::EmptyChunk | StreamError::LengthExceeded { .. } => {
                io::ErrorKind::InvalidData
            }
            StreamError::RelayClosed => io::ErrorKind::BrokenPipe,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

impl StreamError {
    /// Recovers the transfer error carried by an `io::Error` produced by the
    /// `std::io` / `AsyncRead` surface of a stream.
    pub fn from_io(e: &io::Error) -> Option<&StreamError> {
        e.get_ref().and_then(|inner| inner.downcast_ref::<StreamError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_exceeded_names_both_sizes() {
        let message = StreamError::LengthExceeded { declared: 5, observed: 6 }.to_string();
        assert!(message.contains('5'));
        assert!(message.contains('6'));
    }

    #[test]
    fn io_conversion_keeps_the_stream_error() {
        let io_error: io::Error = StreamError::Unsupported("seek").into();
        assert_eq!(io_error.kind(), io::ErrorKind::Unsupported);
        assert_eq!(StreamError::from_io(&io_error), Some(&StreamError::Unsupported("seek")));
    }
}
