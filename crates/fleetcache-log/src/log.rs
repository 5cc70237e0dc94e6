//! The invalidation log.

use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;

use crate::chunk::chunk;
use crate::traits::{LogReader, LogTransport, LogWriter};
use crate::types::{BatchPayload, Cursor, OutgoingRecord, ReadBatch, ShardHandle, ShardId};
use crate::{DynTransport, LogResult};

/// Size bounds used when packing keys for the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Target size of one record's encoded payload, in bytes. Only a record
    /// holding a single larger key exceeds it.
    pub max_record_bytes: usize,
    /// Target size of one append call's encoded payloads, in bytes.
    pub max_append_bytes: usize,
}

impl LogOptions {
    pub const DEFAULT_MAX_RECORD_BYTES: usize = 512 * 1024;
    pub const DEFAULT_MAX_APPEND_BYTES: usize = 2 * 1024 * 1024;
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            max_record_bytes: Self::DEFAULT_MAX_RECORD_BYTES,
            max_append_bytes: Self::DEFAULT_MAX_APPEND_BYTES,
        }
    }
}

/// Multi-shard invalidation log over a [`LogTransport`].
#[derive(Clone)]
pub struct InvalidationLog {
    transport: DynTransport,
    options: LogOptions,
}

impl InvalidationLog {
    pub fn new(transport: DynTransport) -> Self {
        Self::with_options(transport, LogOptions::default())
    }

    pub fn with_options(transport: DynTransport, options: LogOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> LogOptions {
        self.options
    }

    pub fn transport(&self) -> &Arc<dyn LogTransport> {
        &self.transport
    }

    /// Packs `keys` into payloads encoding to at most `max_record_bytes` each,
    /// then writes them in calls of at most `max_append_bytes` each.
    ///
    /// The first failed call aborts the append; calls already made are not
    /// undone.
    pub async fn append(&self, keys: &[String]) -> LogResult<()> {
        let key_budget = self
            .options
            .max_record_bytes
            .saturating_sub(BatchPayload::ENVELOPE_BYTES);
        let payloads = chunk(keys, key_budget, |key| BatchPayload::key_bytes(key))
            .into_iter()
            .map(|section| BatchPayload::new(section.to_vec()).encode())
            .collect::<LogResult<Vec<_>>>()?;

        for call in chunk(&payloads, self.options.max_append_bytes, Vec::len) {
            let records: Vec<OutgoingRecord> = call
                .iter()
                .map(|payload| OutgoingRecord {
                    partition_key: random_partition_key(),
                    payload: payload.clone(),
                })
                .collect();
            tracing::debug!(records = records.len(), "appending to invalidation log");
            self.transport.append_batch(records).await?;
        }
        Ok(())
    }

    /// Returns every key appended since `from`, and the cursor to resume at.
    ///
    /// Shards are listed completely before any is read. Any transport error
    /// aborts the whole read.
    pub async fn read(&self, from: &Cursor) -> LogResult<ReadBatch> {
        let shards = self.list_all_shards().await?;
        let mut batch = ReadBatch::default();

        for shard in shards {
            let handle = self
                .transport
                .open_shard_cursor(&shard, from.get(&shard))
                .await?;
            let tail_read = from.get(&shard).is_none();
            self.drain_shard(shard, handle, tail_read, &mut batch).await?;
        }

        if !batch.keys.is_empty() || batch.skipped_records > 0 {
            tracing::debug!(
                keys = batch.keys.len(),
                shards = batch.to.len(),
                skipped = batch.skipped_records,
                "read invalidation log"
            );
        }
        Ok(batch)
    }

    async fn list_all_shards(&self) -> LogResult<Vec<ShardId>> {
        let mut shards = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.transport.list_shards(token.as_deref()).await?;
            shards.extend(page.shards);
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(shards),
            }
        }
    }

    async fn drain_shard(
        &self,
        shard: ShardId,
        handle: ShardHandle,
        tail_read: bool,
        batch: &mut ReadBatch,
    ) -> LogResult<()> {
        let mut last_seen = if tail_read { handle.start.clone() } else { None };
        let mut handle = Some(handle);

        while let Some(current) = handle.take() {
            let page = self.transport.fetch_next(&current).await?;
            if page.records.is_empty() {
                break;
            }
            for record in page.records {
                match BatchPayload::decode(&record.payload) {
                    Ok(payload) => batch.keys.extend(payload.keys),
                    Err(e) => {
                        tracing::warn!(
                            shard = %shard,
                            sequence_number = %record.sequence_number,
                            error = %e,
                            "skipping malformed invalidation record"
                        );
                        batch.skipped_records += 1;
                    }
                }
                last_seen = Some(record.sequence_number);
            }
            handle = page.next;
        }

        if let Some(seq) = last_seen {
            batch.to.set(shard, seq);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InvalidationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationLog")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LogReader for InvalidationLog {
    async fn read(&self, from: &Cursor) -> LogResult<ReadBatch> {
        InvalidationLog::read(self, from).await
    }
}

#[async_trait]
impl LogWriter for InvalidationLog {
    async fn append(&self, keys: Vec<String>) -> LogResult<()> {
        InvalidationLog::append(self, &keys).await
    }
}

/// 16 random bytes, hex encoded.
pub fn random_partition_key() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
