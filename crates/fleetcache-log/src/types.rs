//! Log types: shard positions, records and the batch payload wire form.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::LogError;

/// Unique id of a shard within the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(pub String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a record within its shard. Ordering is defined by the
/// provider; fleetcache only stores and hands back sequence numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(pub String);

impl SequenceNumber {
    pub fn new(seq: impl Into<String>) -> Self {
        Self(seq.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reader's position in each shard: the last sequence number seen.
///
/// A shard without an entry is read from the tail, i.e. only records
/// appended after the read begins are returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(HashMap<ShardId, SequenceNumber>);

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, shard: &ShardId) -> Option<&SequenceNumber> {
        self.0.get(shard)
    }

    pub fn set(&mut self, shard: ShardId, seq: SequenceNumber) {
        self.0.insert(shard, seq);
    }

    /// Overwrite positions with those in `newer`, keeping shards it omits.
    pub fn advance(&mut self, newer: Cursor) {
        self.0.extend(newer.0);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ShardId, &SequenceNumber)> {
        self.0.iter()
    }
}

impl<S, Q> FromIterator<(S, Q)> for Cursor
where
    S: Into<String>,
    Q: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (S, Q)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(shard, seq)| (ShardId::new(shard), SequenceNumber::new(seq)))
                .collect(),
        )
    }
}

/// Opaque transport handle for reading a shard from some position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardHandle {
    pub shard: ShardId,
    pub token: String,
    /// For a tail handle, the position it reads after. Lets a tail read
    /// report where the shard stood even if nothing new arrived.
    pub start: Option<SequenceNumber>,
}

/// One page of a shard listing.
#[derive(Debug, Clone, Default)]
pub struct ShardPage {
    pub shards: Vec<ShardId>,
    pub next_token: Option<String>,
}

/// A raw record as stored by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub sequence_number: SequenceNumber,
    pub payload: Vec<u8>,
}

/// One page of records, with a continuation handle if more may follow.
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    pub records: Vec<LogRecord>,
    pub next: Option<ShardHandle>,
}

/// A record to append. The partition key only spreads load across shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRecord {
    pub partition_key: String,
    pub payload: Vec<u8>,
}

/// The result of reading the log from a cursor.
#[derive(Debug, Clone, Default)]
pub struct ReadBatch {
    /// Keys from every decoded record, in shard-listing then record order.
    pub keys: Vec<String>,
    /// Last sequence number seen per shard. A shard with no new records is
    /// absent, unless it was read from the tail, in which case its tail
    /// position is recorded.
    pub to: Cursor,
    /// Records whose payload was not a valid batch.
    pub skipped_records: usize,
}

/// The unit transported on the log: a batch of invalidated keys and the
/// client-side time the batch was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPayload {
    pub keys: Vec<String>,
    #[serde(rename = "ts", with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl BatchPayload {
    /// Upper bound on the encoded size of a payload with no keys:
    /// `{"keys":[],"ts":""}` plus the longest RFC 3339 timestamp.
    pub const ENVELOPE_BYTES: usize = 19 + 35;

    /// Bytes `key` adds to an encoded payload, counting its separator.
    pub fn key_bytes(key: &str) -> usize {
        serde_json::to_string(key).map_or(key.len() + 2, |quoted| quoted.len()) + 1
    }

    /// Stamped with the current UTC time.
    pub fn new(keys: Vec<String>) -> Self {
        Self::with_time(keys, OffsetDateTime::now_utc())
    }

    pub fn with_time(keys: Vec<String>, time: OffsetDateTime) -> Self {
        Self { keys, time }
    }

    pub fn encode(&self) -> Result<Vec<u8>, LogError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
