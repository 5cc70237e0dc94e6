//! Observer: owns the read cursor and turns raw log keys into identifiers.

use std::sync::Arc;

use fleetcache_core::Identifier;
use fleetcache_log::{Cursor, LogReader};
use tokio::sync::Mutex;

use crate::error::{DecodeFailure, DecodeFailures, ObserveError};

/// Result of one successful log read.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// Decoded identifiers, in log order.
    pub ids: Vec<Identifier>,
    /// Keys that did not decode.
    pub failures: DecodeFailures,
    /// Records whose payload was not a batch at all.
    pub skipped_records: usize,
}

impl Observation {
    /// The combined decode error, if any key failed to decode.
    pub fn error(&self) -> Option<&DecodeFailures> {
        (!self.failures.is_empty()).then_some(&self.failures)
    }
}

/// Tracks this instance's position in the invalidation log.
///
/// The cursor starts empty, so the first observation only sees records
/// appended after it begins. `observe` and `reset` are serialized by one
/// async mutex held across the read.
pub struct Observer {
    reader: Arc<dyn LogReader>,
    cursor: Mutex<Cursor>,
}

impl Observer {
    pub fn new(reader: Arc<dyn LogReader>) -> Self {
        Self {
            reader,
            cursor: Mutex::new(Cursor::new()),
        }
    }

    /// Reads everything since the last observation.
    ///
    /// A transport error leaves the cursor untouched. Decode failures do not
    /// stop the cursor from advancing.
    pub async fn observe(&self) -> Result<Observation, ObserveError> {
        let mut cursor = self.cursor.lock().await;
        let batch = self.reader.read(&cursor).await?;

        let mut observation = Observation {
            skipped_records: batch.skipped_records,
            ..Default::default()
        };
        for raw in batch.keys {
            match Identifier::parse(&raw) {
                Ok(id) => observation.ids.push(id),
                Err(error) => observation.failures.push(DecodeFailure { raw, error }),
            }
        }

        cursor.advance(batch.to);
        Ok(observation)
    }

    /// Forgets every shard position; the next read is tail-only.
    pub async fn reset(&self) {
        self.cursor.lock().await.clear();
    }

    pub async fn cursor(&self) -> Cursor {
        self.cursor.lock().await.clone()
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}
