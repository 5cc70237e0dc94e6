//! In-process log transport.
//!
//! Shards are vectors behind `RwLock`s. Sequence numbers are drawn from one
//! global counter while holding the target shard's write lock, so they are
//! strictly increasing within every shard. Several [`InvalidationLog`]s
//! sharing one `MemoryTransport` behave like a fleet of instances sharing a
//! real log.
//!
//! [`InvalidationLog`]: crate::InvalidationLog

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::LogError;
use crate::traits::LogTransport;
use crate::types::{
    FetchPage, LogRecord, OutgoingRecord, SequenceNumber, ShardHandle, ShardId, ShardPage,
};
use crate::LogResult;

#[derive(Debug)]
struct StoredRecord {
    sequence: u64,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct Shard {
    id: ShardId,
    records: RwLock<Vec<StoredRecord>>,
}

/// Multi-shard log kept in memory.
#[derive(Debug)]
pub struct MemoryTransport {
    shards: Vec<Shard>,
    next_sequence: AtomicU64,
    page_size: usize,
    shard_page_size: usize,
    unavailable: AtomicBool,
    append_calls: AtomicUsize,
    opened: Mutex<Vec<(ShardId, Option<SequenceNumber>)>>,
}

impl MemoryTransport {
    /// A log with `shards` shards (at least one).
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|i| Shard {
                id: ShardId::new(format!("shard-{i:04}")),
                records: RwLock::new(Vec::new()),
            })
            .collect();
        Self {
            shards,
            next_sequence: AtomicU64::new(1),
            page_size: 100,
            shard_page_size: 100,
            unavailable: AtomicBool::new(false),
            append_calls: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Maximum records returned by one fetch.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Maximum shards returned by one listing call.
    pub fn with_shard_page_size(mut self, shard_page_size: usize) -> Self {
        self.shard_page_size = shard_page_size.max(1);
        self
    }

    /// While set, every operation fails with [`LogError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.shards.iter().map(|s| s.id.clone()).collect()
    }

    /// Number of `append_batch` calls that succeeded.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Every `(shard, after)` pair a read handle was opened with, in order.
    pub fn opened_cursors(&self) -> Vec<(ShardId, Option<SequenceNumber>)> {
        self.opened.lock().clone()
    }

    /// Total records stored across all shards.
    pub fn record_count(&self) -> usize {
        self.shards.iter().map(|s| s.records.read().len()).sum()
    }

    /// Store a raw payload directly on a shard, bypassing batching.
    pub fn push_raw(&self, shard_index: usize, payload: Vec<u8>) -> SequenceNumber {
        let shard = &self.shards[shard_index % self.shards.len()];
        let mut records = shard.records.write();
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        records.push(StoredRecord { sequence, payload });
        SequenceNumber::new(sequence.to_string())
    }

    fn check_available(&self) -> LogResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LogError::unavailable("memory transport switched off"));
        }
        Ok(())
    }

    fn shard_index(&self, shard: &ShardId) -> LogResult<usize> {
        self.shards
            .iter()
            .position(|s| &s.id == shard)
            .ok_or_else(|| LogError::open_cursor(shard.as_str(), "no such shard"))
    }

    fn shard_for_partition(&self, partition_key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        partition_key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    fn handle(shard: &ShardId, position: usize) -> ShardHandle {
        ShardHandle {
            shard: shard.clone(),
            token: position.to_string(),
            start: None,
        }
    }
}

#[async_trait]
impl LogTransport for MemoryTransport {
    async fn list_shards(&self, next_token: Option<&str>) -> LogResult<ShardPage> {
        self.check_available().map_err(|e| LogError::list_shards(e.to_string()))?;

        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|e| LogError::list_shards(format!("bad token '{token}': {e}")))?,
            None => 0,
        };
        let end = (start + self.shard_page_size).min(self.shards.len());
        let shards = self.shards[start.min(end)..end]
            .iter()
            .map(|s| s.id.clone())
            .collect();
        let next_token = (end < self.shards.len()).then(|| end.to_string());
        Ok(ShardPage { shards, next_token })
    }

    async fn open_shard_cursor(
        &self,
        shard: &ShardId,
        after: Option<&SequenceNumber>,
    ) -> LogResult<ShardHandle> {
        self.check_available()
            .map_err(|e| LogError::open_cursor(shard.as_str(), e.to_string()))?;
        self.opened.lock().push((shard.clone(), after.cloned()));

        let records = self.shards[self.shard_index(shard)?].records.read();
        match after {
            None => {
                // Sequence numbers start at 1, so "0" precedes everything.
                let tail = records.last().map_or(0, |r| r.sequence);
                Ok(ShardHandle {
                    start: Some(SequenceNumber::new(tail.to_string())),
                    ..Self::handle(shard, records.len())
                })
            }
            Some(seq) => {
                let after: u64 = seq
                    .as_str()
                    .parse()
                    .map_err(|e| LogError::invalid_position(seq.as_str(), format!("{e}")))?;
                Ok(Self::handle(
                    shard,
                    records.partition_point(|r| r.sequence <= after),
                ))
            }
        }
    }

    async fn fetch_next(&self, handle: &ShardHandle) -> LogResult<FetchPage> {
        self.check_available()
            .map_err(|e| LogError::fetch(handle.shard.as_str(), e.to_string()))?;

        let position: usize = handle
            .token
            .parse()
            .map_err(|e| LogError::invalid_position(handle.token.as_str(), format!("{e}")))?;
        let records = self.shards[self.shard_index(&handle.shard)?].records.read();
        let start = position.min(records.len());
        let end = (start + self.page_size).min(records.len());

        let page = records[start..end]
            .iter()
            .map(|r| LogRecord {
                sequence_number: SequenceNumber::new(r.sequence.to_string()),
                payload: r.payload.clone(),
            })
            .collect();
        let next = (end < records.len()).then(|| Self::handle(&handle.shard, end));
        Ok(FetchPage {
            records: page,
            next,
        })
    }

    async fn append_batch(&self, records: Vec<OutgoingRecord>) -> LogResult<()> {
        self.check_available()
            .map_err(|e| LogError::append(records.len(), e.to_string()))?;

        for record in records {
            let index = self.shard_for_partition(&record.partition_key);
            self.push_raw(index, record.payload);
        }
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
