//! Notifier: publishes invalidations to the log.

use std::sync::Arc;

use fleetcache_core::{Identifier, Observable};
use fleetcache_log::{LogResult, LogWriter};

#[derive(Clone)]
pub struct Notifier {
    writer: Arc<dyn LogWriter>,
}

impl Notifier {
    pub fn new(writer: Arc<dyn LogWriter>) -> Self {
        Self { writer }
    }

    /// Publishes the identifier of every entity, in order.
    pub async fn notify<T: Observable + Sync>(&self, entities: &[T]) -> LogResult<()> {
        let keys = entities
            .iter()
            .map(|entity| entity.observable_id().to_string())
            .collect();
        self.writer.append(keys).await
    }

    pub async fn notify_identifiers(&self, ids: &[Identifier]) -> LogResult<()> {
        self.notify(ids).await
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}
