//! Traits at the edges of the log.

use async_trait::async_trait;

use crate::LogResult;
use crate::types::{
    Cursor, FetchPage, OutgoingRecord, ReadBatch, SequenceNumber, ShardHandle, ShardId, ShardPage,
};

/// The provider-specific side of the log.
///
/// Implementations own connection handling, authentication and retries; the
/// log only sees shards, handles, pages and append calls. Implementations
/// must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Returns one page of shard ids. Pass the previous page's
    /// `next_token` to continue; `None` starts from the beginning.
    async fn list_shards(&self, next_token: Option<&str>) -> LogResult<ShardPage>;

    /// Acquires a read handle on `shard`.
    ///
    /// With `after = None` the handle only sees records appended from now
    /// on, and should report the position it starts after in
    /// [`ShardHandle::start`]. Otherwise it starts strictly after the given
    /// sequence number.
    async fn open_shard_cursor(
        &self,
        shard: &ShardId,
        after: Option<&SequenceNumber>,
    ) -> LogResult<ShardHandle>;

    /// Fetches the next page of records. A `None` continuation means the
    /// shard is drained for now.
    async fn fetch_next(&self, handle: &ShardHandle) -> LogResult<FetchPage>;

    /// Writes one call's worth of records.
    async fn append_batch(&self, records: Vec<OutgoingRecord>) -> LogResult<()>;
}

/// Reads invalidated keys from a cursor.
#[async_trait]
pub trait LogReader: Send + Sync {
    async fn read(&self, from: &Cursor) -> LogResult<ReadBatch>;
}

/// Publishes invalidated keys.
#[async_trait]
pub trait LogWriter: Send + Sync {
    async fn append(&self, keys: Vec<String>) -> LogResult<()>;
}
