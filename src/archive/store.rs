//! Log Storage
//!
//! Storage seam for archived logs. The persistence format belongs to the
//! storage collaborator; [`InMemoryLogStore`] keeps records for the
//! lifetime of the process.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::archive::record::{LogRecord, LogSummary};
use crate::core::ids::TournamentId;

/// Archive of finished tournaments.
pub trait LogStore: Send + Sync {
    /// Store a record, replacing any record with the same id.
    fn save(&self, record: LogRecord);

    /// Fetch a record.
    fn get(&self, id: TournamentId) -> Option<LogRecord>;

    /// List every record, most recent tournament first.
    fn list(&self) -> Vec<LogSummary>;
}

/// In-memory log store.
#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    records: RwLock<BTreeMap<TournamentId, LogRecord>>,
}

impl InMemoryLogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogStore for InMemoryLogStore {
    fn save(&self, record: LogRecord) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.tournament_id, record);
    }

    fn get(&self, id: TournamentId) -> Option<LogRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(&id).cloned()
    }

    fn list(&self) -> Vec<LogSummary> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.values().rev().map(LogRecord::summary).collect()
    }
}
