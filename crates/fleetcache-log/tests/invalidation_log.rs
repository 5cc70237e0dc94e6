//! InvalidationLog behaviour over the in-memory transport and a scripted one.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use fleetcache_log::{
    BatchPayload, Cursor, FetchPage, InvalidationLog, LogError, LogOptions, LogReader,
    LogRecord, LogResult, LogTransport, LogWriter, MemoryTransport, OutgoingRecord,
    SequenceNumber, ShardHandle, ShardId, ShardPage,
};
use parking_lot::Mutex;

fn keys(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn read_from_empty_cursor_returns_only_new_keys() {
    let transport = Arc::new(MemoryTransport::new(4));
    let log = InvalidationLog::new(transport.clone());

    log.append(&keys(&["before"])).await.unwrap();
    let tail = log.read(&Cursor::new()).await.unwrap();
    assert!(tail.keys.is_empty());

    log.append(&keys(&["after-1", "after-2"])).await.unwrap();
    let batch = log.read(&tail.to).await.unwrap();
    let mut seen = batch.keys.clone();
    seen.sort();
    assert_eq!(seen, keys(&["after-1", "after-2"]));
}

#[tokio::test]
async fn cursor_is_exclusive_per_shard() {
    let transport = Arc::new(MemoryTransport::new(1));
    let log = InvalidationLog::new(transport.clone());
    let shard = ShardId::new("shard-0000");

    let s1 = transport.push_raw(0, BatchPayload::new(keys(&["k1"])).encode().unwrap());
    let s2 = transport.push_raw(0, BatchPayload::new(keys(&["k2"])).encode().unwrap());

    let from: Cursor = [(shard.as_str(), s1.as_str())].into_iter().collect();
    let batch = log.read(&from).await.unwrap();
    assert_eq!(batch.keys, keys(&["k2"]));
    assert_eq!(batch.to.get(&shard), Some(&s2));

    let opened = transport.opened_cursors();
    assert_eq!(opened, vec![(shard.clone(), Some(s1))]);

    // Reading again from the returned cursor starts after s2 and yields nothing.
    let again = log.read(&batch.to).await.unwrap();
    assert!(again.keys.is_empty());
    assert!(again.to.is_empty());
    assert_eq!(transport.opened_cursors().last(), Some(&(shard, Some(s2))));
}

#[tokio::test]
async fn untouched_shards_are_left_out_of_the_new_cursor() {
    let transport = Arc::new(MemoryTransport::new(2));
    let log = InvalidationLog::new(transport.clone());

    let start = log.read(&Cursor::new()).await.unwrap();
    // A tail read pins every shard, even the empty ones.
    assert_eq!(start.to.len(), 2);
    transport.push_raw(1, BatchPayload::new(keys(&["only-shard-1"])).encode().unwrap());

    let batch = log.read(&start.to).await.unwrap();
    assert_eq!(batch.to.len(), 1);
    assert!(batch.to.get(&ShardId::new("shard-0001")).is_some());
    assert!(batch.to.get(&ShardId::new("shard-0000")).is_none());
}

#[tokio::test]
async fn shard_listing_is_drained_across_pages() {
    let transport = Arc::new(MemoryTransport::new(5).with_shard_page_size(2));
    let log = InvalidationLog::new(transport.clone());

    log.read(&Cursor::new()).await.unwrap();
    let opened: Vec<ShardId> = transport
        .opened_cursors()
        .into_iter()
        .map(|(shard, _)| shard)
        .collect();
    assert_eq!(opened, transport.shard_ids());
}

#[tokio::test]
async fn records_spanning_several_pages_are_all_read() {
    let transport = Arc::new(MemoryTransport::new(1).with_page_size(3));
    let log = InvalidationLog::new(transport.clone());
    let start = log.read(&Cursor::new()).await.unwrap();

    let mut last = None;
    for i in 0..10 {
        let payload = BatchPayload::new(vec![format!("k{i}")]).encode().unwrap();
        last = Some(transport.push_raw(0, payload));
    }

    let batch = log.read(&start.to).await.unwrap();
    assert_eq!(batch.keys.len(), 10);
    assert_eq!(batch.to.get(&ShardId::new("shard-0000")), last.as_ref());
}

#[tokio::test]
async fn malformed_records_are_skipped_and_passed_over() {
    let transport = Arc::new(MemoryTransport::new(1));
    let log = InvalidationLog::new(transport.clone());
    let start = log.read(&Cursor::new()).await.unwrap();

    transport.push_raw(0, b"{not json".to_vec());
    let good = transport.push_raw(0, BatchPayload::new(keys(&["ok"])).encode().unwrap());
    let garbage = transport.push_raw(0, b"\x00\x01".to_vec());

    let batch = log.read(&start.to).await.unwrap();
    assert_eq!(batch.keys, keys(&["ok"]));
    assert_eq!(batch.skipped_records, 2);
    assert_eq!(batch.to.get(&ShardId::new("shard-0000")), Some(&garbage));
    assert_ne!(good, garbage);
}

#[tokio::test]
async fn append_packs_keys_into_bounded_records_and_calls() {
    let transport = Arc::new(MemoryTransport::new(2));
    // Each key costs five quoted bytes plus a separator.
    let options = LogOptions {
        max_record_bytes: BatchPayload::ENVELOPE_BYTES + 12,
        max_append_bytes: 1,
    };
    let log = InvalidationLog::with_options(transport.clone(), options);

    // "aaa" + "bbb" fit one record, "ccc" spills into a second.
    log.append(&keys(&["aaa", "bbb", "ccc"])).await.unwrap();
    assert_eq!(transport.record_count(), 2);
    // Each encoded payload is larger than one byte, so each gets its own call.
    assert_eq!(transport.append_calls(), 2);
}

#[tokio::test]
async fn empty_append_makes_no_calls() {
    let transport = Arc::new(MemoryTransport::new(2));
    let log = InvalidationLog::new(transport.clone());
    log.append(&[]).await.unwrap();
    assert_eq!(transport.append_calls(), 0);
    assert_eq!(transport.record_count(), 0);
}

#[tokio::test]
async fn reader_and_writer_views_share_the_log() {
    let transport = Arc::new(MemoryTransport::new(3));
    let log = InvalidationLog::new(transport);
    let reader: Arc<dyn LogReader> = Arc::new(log.clone());
    let writer: Arc<dyn LogWriter> = Arc::new(log);

    let start = reader.read(&Cursor::new()).await.unwrap();
    writer.append(keys(&["x", "y", "z"])).await.unwrap();
    let batch = reader.read(&start.to).await.unwrap();
    assert_eq!(batch.keys.len(), 3);
}

/// Transport that replays scripted responses and fails on demand.
#[derive(Default)]
struct ScriptedTransport {
    shards: Vec<ShardId>,
    pages: Mutex<VecDeque<LogResult<FetchPage>>>,
    fail_append: bool,
    appended: Mutex<Vec<Vec<OutgoingRecord>>>,
}

#[async_trait]
impl LogTransport for ScriptedTransport {
    async fn list_shards(&self, _next_token: Option<&str>) -> LogResult<ShardPage> {
        Ok(ShardPage {
            shards: self.shards.clone(),
            next_token: None,
        })
    }

    async fn open_shard_cursor(
        &self,
        shard: &ShardId,
        _after: Option<&SequenceNumber>,
    ) -> LogResult<ShardHandle> {
        Ok(ShardHandle {
            shard: shard.clone(),
            token: String::new(),
            start: None,
        })
    }

    async fn fetch_next(&self, _handle: &ShardHandle) -> LogResult<FetchPage> {
        self.pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchPage::default()))
    }

    async fn append_batch(&self, records: Vec<OutgoingRecord>) -> LogResult<()> {
        if self.fail_append {
            return Err(LogError::append(records.len(), "throttled"));
        }
        self.appended.lock().push(records);
        Ok(())
    }
}

fn record(seq: &str, keys_in: &[&str]) -> LogRecord {
    LogRecord {
        sequence_number: SequenceNumber::new(seq),
        payload: BatchPayload::new(keys(keys_in)).encode().unwrap(),
    }
}

#[tokio::test]
async fn fetch_error_aborts_the_read() {
    let transport = ScriptedTransport {
        shards: vec![ShardId::new("a"), ShardId::new("b")],
        pages: Mutex::new(VecDeque::from(vec![
            Ok(FetchPage {
                records: vec![record("1", &["k"])],
                next: None,
            }),
            Err(LogError::fetch("b", "connection reset")),
        ])),
        ..Default::default()
    };
    let log = InvalidationLog::new(Arc::new(transport));

    let err = log.read(&Cursor::new()).await.unwrap_err();
    assert!(matches!(err, LogError::Fetch { .. }));
    assert!(err.to_string().contains("connection reset"));
}

#[tokio::test]
async fn drain_stops_on_an_empty_page_even_with_continuation() {
    let shard = ShardId::new("a");
    let handle = ShardHandle {
        shard: shard.clone(),
        token: "more".into(),
        start: None,
    };
    let transport = ScriptedTransport {
        shards: vec![shard.clone()],
        pages: Mutex::new(VecDeque::from(vec![
            Ok(FetchPage {
                records: vec![record("7", &["k7"])],
                next: Some(handle.clone()),
            }),
            Ok(FetchPage {
                records: vec![],
                next: Some(handle),
            }),
            Ok(FetchPage {
                records: vec![record("99", &["never"])],
                next: None,
            }),
        ])),
        ..Default::default()
    };
    let log = InvalidationLog::new(Arc::new(transport));

    let batch = log.read(&Cursor::new()).await.unwrap();
    assert_eq!(batch.keys, keys(&["k7"]));
    assert_eq!(batch.to.get(&shard), Some(&SequenceNumber::new("7")));
}

#[tokio::test]
async fn append_error_is_returned() {
    let transport = ScriptedTransport {
        fail_append: true,
        ..Default::default()
    };
    let log = InvalidationLog::new(Arc::new(transport));
    let err = log.append(&keys(&["k"])).await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn encoded_records_stay_within_the_record_bound() {
    let transport = Arc::new(ScriptedTransport::default());
    let bound = 160;
    let options = LogOptions {
        max_record_bytes: bound,
        max_append_bytes: usize::MAX,
    };
    let log = InvalidationLog::with_options(transport.clone(), options);

    let written: Vec<String> = (0..40)
        .map(|i| format!("id={i}&s=db.\"quoted\"\\table&t=data.ID"))
        .collect();
    log.append(&written).await.unwrap();

    let calls = transport.appended.lock();
    let mut read_back = Vec::new();
    for rec in calls.iter().flatten() {
        assert!(rec.payload.len() <= bound, "{} > {bound}", rec.payload.len());
        read_back.extend(BatchPayload::decode(&rec.payload).unwrap().keys);
    }
    assert!(calls[0].len() > 1);
    assert_eq!(read_back, written);
}

#[tokio::test]
async fn every_record_gets_its_own_partition_key() {
    let transport = Arc::new(ScriptedTransport::default());
    let options = LogOptions {
        max_record_bytes: 1,
        max_append_bytes: usize::MAX,
    };
    let log = InvalidationLog::with_options(transport.clone(), options);
    log.append(&keys(&["a", "b", "c"])).await.unwrap();

    let calls = transport.appended.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 3);
    for rec in calls[0].iter() {
        assert_eq!(rec.partition_key.len(), 32);
    }
    assert_ne!(calls[0][0].partition_key, calls[0][1].partition_key);
}
