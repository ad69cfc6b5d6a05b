use super::{HistoryResult, HistoryStore};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use workflow_types::{HistoryEvent, HistoryRecord, RunId};

/// In-memory history store for tests and development
pub struct InMemoryHistoryStore {
    runs: DashMap<RunId, Vec<HistoryRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
        }
    }

    /// Total number of recorded events across all runs
    pub fn event_count(&self) -> usize {
        self.runs.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, run_id: &RunId, event: HistoryEvent) -> HistoryResult<HistoryRecord> {
        let mut history = self.runs.entry(run_id.clone()).or_default();
        let record = HistoryRecord {
            run_id: run_id.clone(),
            event_id: history.len() as u64 + 1,
            event,
            recorded_at: Utc::now(),
        };
        history.push(record.clone());
        Ok(record)
    }

    async fn load(&self, run_id: &RunId) -> HistoryResult<Vec<HistoryRecord>> {
        Ok(self
            .runs
            .get(run_id)
            .map(|history| history.value().clone())
            .unwrap_or_default())
    }

    async fn list_runs(&self) -> HistoryResult<Vec<RunId>> {
        let mut runs: Vec<RunId> = self.runs.iter().map(|entry| entry.key().clone()).collect();
        runs.sort();
        Ok(runs)
    }
}
