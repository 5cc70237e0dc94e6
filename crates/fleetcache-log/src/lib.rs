//! # fleetcache-log
//!
//! The invalidation log: a multi-shard, ordered-per-shard, append-only stream
//! of batches of invalidated keys, read with resumable per-shard cursors.
//!
//! ## Overview
//!
//! - [`InvalidationLog`] packs keys into size-bounded [`BatchPayload`]s on
//!   append, and drains every shard from a [`Cursor`] on read.
//! - [`LogTransport`] is the provider boundary: shard listing, cursor
//!   handles, paged fetches and batched appends. [`MemoryTransport`] and
//!   [`RedisStreamTransport`] implement it.
//! - [`LogReader`] and [`LogWriter`] are the narrow views the observer and
//!   notifier depend on.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fleetcache_log::{Cursor, InvalidationLog, MemoryTransport};
//!
//! let log = InvalidationLog::new(Arc::new(MemoryTransport::new(4)));
//! let tail = log.read(&Cursor::new()).await?;
//! log.append(&["id=1&s=db.users&t=data.ID".to_string()]).await?;
//! let batch = log.read(&tail.to).await?;
//! ```

pub mod chunk;
mod error;
mod log;
pub mod memory;
pub mod redis_stream;
mod traits;
mod types;

pub use chunk::chunk;
pub use error::LogError;
pub use log::{InvalidationLog, LogOptions, random_partition_key};
pub use memory::MemoryTransport;
pub use redis_stream::{DEFAULT_MAX_LEN, RedisStreamOptions, RedisStreamTransport};
pub use traits::{LogReader, LogTransport, LogWriter};
pub use types::{
    BatchPayload, Cursor, FetchPage, LogRecord, OutgoingRecord, ReadBatch, SequenceNumber,
    ShardHandle, ShardId, ShardPage,
};

/// Type alias for a log result.
pub type LogResult<T> = Result<T, LogError>;

/// Type alias for a shared transport.
pub type DynTransport = std::sync::Arc<dyn LogTransport>;
