//! Redis Streams transport.
//!
//! Each shard is one stream named `{prefix}:{n}`. Records carry their
//! payload in the `data` field. Stream entry ids are the sequence numbers,
//! and a shard handle's token is the id of the last entry already returned.
//!
//! Appends trim each stream to roughly `max_len` entries (`MAXLEN ~`), which
//! bounds how far back a reader can resume.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::streams::StreamRangeReply;

use crate::error::LogError;
use crate::traits::LogTransport;
use crate::types::{
    FetchPage, LogRecord, OutgoingRecord, SequenceNumber, ShardHandle, ShardId, ShardPage,
};
use crate::LogResult;

const PAYLOAD_FIELD: &str = "data";
const STREAM_START: &str = "0-0";

/// Entries kept per stream unless configured otherwise.
pub const DEFAULT_MAX_LEN: usize = 100_000;

/// Connection settings for [`RedisStreamTransport::connect`].
#[derive(Debug, Clone)]
pub struct RedisStreamOptions {
    pub url: String,
    pub pool_size: usize,
    pub timeout: Duration,
    pub stream_prefix: String,
    pub shards: usize,
    pub page_size: usize,
    /// Approximate number of entries kept per stream; `None` never trims.
    pub max_len: Option<usize>,
}

impl Default for RedisStreamOptions {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 8,
            timeout: Duration::from_millis(2000),
            stream_prefix: "fleetcache:invalidations".to_string(),
            shards: 4,
            page_size: 1000,
            max_len: Some(DEFAULT_MAX_LEN),
        }
    }
}

/// Invalidation log stored in a fixed set of Redis streams.
#[derive(Clone)]
pub struct RedisStreamTransport {
    pool: Pool,
    prefix: String,
    shards: usize,
    page_size: usize,
    max_len: Option<usize>,
}

impl RedisStreamTransport {
    /// Wraps an existing pool. Streams are trimmed to [`DEFAULT_MAX_LEN`].
    pub fn new(pool: Pool, prefix: impl Into<String>, shards: usize, page_size: usize) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            shards: shards.max(1),
            page_size: page_size.max(1),
            max_len: Some(DEFAULT_MAX_LEN),
        }
    }

    pub fn with_max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }

    /// Builds a pool from `options` and checks that a connection can be made.
    pub async fn connect(options: &RedisStreamOptions) -> LogResult<Self> {
        tracing::info!(url = %options.url, prefix = %options.stream_prefix, "connecting to redis");

        let mut config = deadpool_redis::Config::from_url(&options.url);
        let mut pool_config = PoolConfig::new(options.pool_size);
        pool_config.timeouts = Timeouts {
            wait: Some(options.timeout),
            create: Some(options.timeout),
            recycle: Some(options.timeout),
        };
        config.pool = Some(pool_config);

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| LogError::unavailable(format!("failed to create redis pool: {e}")))?;
        pool.get()
            .await
            .map_err(|e| LogError::unavailable(e.to_string()))?;

        Ok(Self::new(
            pool,
            options.stream_prefix.clone(),
            options.shards,
            options.page_size,
        )
        .with_max_len(options.max_len))
    }

    fn stream_key(&self, index: usize) -> String {
        format!("{}:{}", self.prefix, index)
    }

    fn shard_for_partition(&self, partition_key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        partition_key.hash(&mut hasher);
        (hasher.finish() % self.shards as u64) as usize
    }

    fn xadd(&self, record: &OutgoingRecord) -> redis::Cmd {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(self.stream_key(self.shard_for_partition(&record.partition_key)));
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*").arg(PAYLOAD_FIELD).arg(record.payload.as_slice());
        cmd
    }

    async fn connection(&self) -> LogResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| LogError::unavailable(e.to_string()))
    }

    fn records_from(reply: StreamRangeReply) -> Vec<LogRecord> {
        reply
            .ids
            .into_iter()
            .map(|entry| LogRecord {
                payload: entry.get::<Vec<u8>>(PAYLOAD_FIELD).unwrap_or_default(),
                sequence_number: SequenceNumber::new(entry.id),
            })
            .collect()
    }
}

impl std::fmt::Debug for RedisStreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamTransport")
            .field("prefix", &self.prefix)
            .field("shards", &self.shards)
            .field("page_size", &self.page_size)
            .field("max_len", &self.max_len)
            .finish()
    }
}

#[async_trait]
impl LogTransport for RedisStreamTransport {
    async fn list_shards(&self, next_token: Option<&str>) -> LogResult<ShardPage> {
        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|e| LogError::list_shards(format!("bad token '{token}': {e}")))?,
            None => 0,
        };
        let end = (start + self.page_size).min(self.shards);
        Ok(ShardPage {
            shards: (start..end)
                .map(|i| ShardId::new(self.stream_key(i)))
                .collect(),
            next_token: (end < self.shards).then(|| end.to_string()),
        })
    }

    async fn open_shard_cursor(
        &self,
        shard: &ShardId,
        after: Option<&SequenceNumber>,
    ) -> LogResult<ShardHandle> {
        let (token, start) = match after {
            Some(seq) => (seq.as_str().to_string(), None),
            None => {
                let mut conn = self.connection().await?;
                let reply: StreamRangeReply = redis::cmd("XREVRANGE")
                    .arg(shard.as_str())
                    .arg("+")
                    .arg("-")
                    .arg("COUNT")
                    .arg(1)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| LogError::open_cursor(shard.as_str(), e.to_string()))?;
                let tail = reply
                    .ids
                    .into_iter()
                    .next()
                    .map(|entry| entry.id)
                    .unwrap_or_else(|| STREAM_START.to_string());
                (tail.clone(), Some(SequenceNumber::new(tail)))
            }
        };
        Ok(ShardHandle {
            shard: shard.clone(),
            token,
            start,
        })
    }

    async fn fetch_next(&self, handle: &ShardHandle) -> LogResult<FetchPage> {
        let mut conn = self.connection().await?;
        let reply: StreamRangeReply = redis::cmd("XRANGE")
            .arg(handle.shard.as_str())
            .arg(format!("({}", handle.token))
            .arg("+")
            .arg("COUNT")
            .arg(self.page_size)
            .query_async(&mut conn)
            .await
            .map_err(|e| LogError::fetch(handle.shard.as_str(), e.to_string()))?;

        let records = Self::records_from(reply);
        let next = match records.last() {
            Some(last) if records.len() >= self.page_size => Some(ShardHandle {
                shard: handle.shard.clone(),
                token: last.sequence_number.as_str().to_string(),
                start: None,
            }),
            _ => None,
        };
        Ok(FetchPage { records, next })
    }

    async fn append_batch(&self, records: Vec<OutgoingRecord>) -> LogResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();
        let mut conn = self
            .connection()
            .await
            .map_err(|e| LogError::append(count, e.to_string()))?;

        let mut pipe = redis::pipe();
        for record in &records {
            pipe.add_command(self.xadd(record)).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| LogError::append(count, e.to_string()))?;
        Ok(())
    }
}
