//! Log error types.
//!
//! Every variant aborts the `read` or `append` call that produced it.
//! Malformed batch payloads are not errors at this level; see
//! [`ReadBatch::skipped_records`](crate::ReadBatch::skipped_records).

/// Errors raised by the invalidation log and its transports.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Listing the shards of the log failed.
    #[error("failed to list shards: {message}")]
    ListShards {
        /// Provider error text.
        message: String,
    },

    /// Acquiring a read position on a shard failed.
    #[error("failed to open cursor on shard '{shard}': {message}")]
    OpenCursor {
        /// Shard the cursor was requested for.
        shard: String,
        /// Provider error text.
        message: String,
    },

    /// Fetching a page of records failed.
    #[error("failed to fetch records from shard '{shard}': {message}")]
    Fetch {
        /// Shard being read.
        shard: String,
        /// Provider error text.
        message: String,
    },

    /// Writing a batch of records failed.
    #[error("failed to append {records} records: {message}")]
    Append {
        /// Number of records in the failed write call.
        records: usize,
        /// Provider error text.
        message: String,
    },

    /// A batch payload could not be serialized.
    #[error("failed to encode batch payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The transport could not be reached at all.
    #[error("log transport unavailable: {message}")]
    Unavailable {
        /// Description of the connection failure.
        message: String,
    },

    /// A cursor position or handle did not make sense to the transport.
    #[error("invalid log position '{position}': {message}")]
    InvalidPosition {
        /// The offending position or handle.
        position: String,
        /// Why it was rejected.
        message: String,
    },
}

impl LogError {
    /// Creates a new `ListShards` error.
    #[must_use]
    pub fn list_shards(message: impl Into<String>) -> Self {
        Self::ListShards {
            message: message.into(),
        }
    }

    /// Creates a new `OpenCursor` error.
    #[must_use]
    pub fn open_cursor(shard: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenCursor {
            shard: shard.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Fetch` error.
    #[must_use]
    pub fn fetch(shard: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            shard: shard.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Append` error.
    #[must_use]
    pub fn append(records: usize, message: impl Into<String>) -> Self {
        Self::Append {
            records,
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidPosition` error.
    #[must_use]
    pub fn invalid_position(position: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPosition {
            position: position.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error came from talking to the provider, as
    /// opposed to a local encoding or position problem.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ListShards { .. }
                | Self::OpenCursor { .. }
                | Self::Fetch { .. }
                | Self::Append { .. }
                | Self::Unavailable { .. }
        )
    }
}
