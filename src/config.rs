/// Limits applied to transfers opened through [`crate::StreamHost::open`].
///
/// - `max_buffer_size` bounds how many received bytes may wait for the
///   consumer before the producer is suspended.
/// - `max_chunk_size` is the most the remote should pack into one chunk
///   notification; keep it below the message channel's frame limit.
/// - `max_allowed_size` is the largest declared length a transfer may have.
///
/// Use one of the presets (`high_performance`, `balanced`, `low_bandwidth`) or
/// construct/override as needed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    pub max_buffer_size: usize,
    pub max_chunk_size: u64,
    pub max_allowed_size: u64,
}

impl Default for StreamConfig {
    /// Returns the balanced preset:
    /// - 1 MiB buffer
    /// - 31 KiB chunks
    /// - 512 000 byte payloads
    fn default() -> Self {
        Self {
            max_buffer_size: 1024 * 1024,
            max_chunk_size: 1024 * 31, // fits a 32KB channel frame
            max_allowed_size: 512_000,
        }
    }
}

impl StreamConfig {
    /// Preset for large uploads over a channel with generous frame limits:
    /// - 4 MiB buffer
    /// - 512 KiB chunks
    /// - 256 MiB payloads
    pub fn high_performance() -> Self {
        Self {
            max_buffer_size: 4 * 1024 * 1024,
            max_chunk_size: 1024 * 512,
            max_allowed_size: 256 * 1024 * 1024,
        }
    }

    /// Alias of `Default::default()` returning a balanced configuration.
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Preset for constrained links and small hosts:
    /// - 128 KiB buffer
    /// - 8 KiB chunks
    /// - 512 000 byte payloads
    pub fn low_bandwidth() -> Self {
        Self {
            max_buffer_size: 1024 * 128,
            max_chunk_size: 1024 * 8,
            max_allowed_size: 512_000,
        }
    }
}
