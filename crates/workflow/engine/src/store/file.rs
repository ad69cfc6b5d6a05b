use super::{HistoryError, HistoryResult, HistoryStore};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use workflow_types::{HistoryEvent, HistoryRecord, RunId};

const HISTORY_EXTENSION: &str = "jsonl";

/// File-backed history store: one JSON-lines file per run
///
/// Every append is written and flushed before it returns, so a new store over
/// the same directory sees every event acknowledged by the old one. A torn
/// final line left by an interrupted append is ignored on load and cut off
/// before the next append.
pub struct FileHistoryStore {
    dir: PathBuf,
    /// Per-run append lock holding the last assigned event id and the file
    /// length it was read at, once known
    cursors: DashMap<RunId, Arc<Mutex<Option<Cursor>>>>,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    last_id: u64,
    len: u64,
}

/// Parsed contents of one history file
struct HistoryFile {
    records: Vec<HistoryRecord>,
    /// Byte offset of an unparseable final line without a newline
    torn_at: Option<u64>,
    /// The last complete record is missing its newline
    unterminated: bool,
}

impl FileHistoryStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> HistoryResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        Ok(Self {
            dir,
            cursors: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: &RunId) -> HistoryResult<PathBuf> {
        let id = run_id.as_str();
        let unsafe_id = id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
        if unsafe_id {
            return Err(HistoryError::InvalidRunId(run_id.clone()));
        }

        Ok(self.dir.join(format!("{}.{}", id, HISTORY_EXTENSION)))
    }

    fn cursor(&self, run_id: &RunId) -> Arc<Mutex<Option<Cursor>>> {
        self.cursors
            .entry(run_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn read_file(&self, run_id: &RunId) -> HistoryResult<HistoryFile> {
        let path = self.path_for(run_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut file = HistoryFile {
            records: Vec::new(),
            torn_at: None,
            unterminated: false,
        };
        let mut offset = 0usize;

        for (index, line) in content.split_inclusive('\n').enumerate() {
            let line_start = offset;
            offset += line.len();

            let terminated = line.ends_with('\n');
            let text = line.trim();
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<HistoryRecord>(text) {
                Ok(record) => {
                    file.unterminated = !terminated;
                    file.records.push(record);
                }
                Err(e) if !terminated => {
                    tracing::warn!(
                        run_id = %run_id,
                        line = index + 1,
                        error = %e,
                        "Ignoring torn final history line"
                    );
                    file.torn_at = Some(line_start as u64);
                }
                Err(e) => {
                    return Err(HistoryError::Corrupt {
                        run_id: run_id.clone(),
                        line: index + 1,
                        reason: e.to_string(),
                    })
                }
            }
        }

        Ok(file)
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn append(&self, run_id: &RunId, event: HistoryEvent) -> HistoryResult<HistoryRecord> {
        let path = self.path_for(run_id)?;
        let cursor = self.cursor(run_id);
        let mut cached = cursor.lock().await;

        let len = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        // Another writer may have appended since the cursor was taken.
        let mut line = String::new();
        let (previous, base_len) = match *cached {
            Some(known) if known.len == len => (known.last_id, len),
            _ => {
                let existing = self.read_file(run_id).await?;
                let mut base_len = len;
                if let Some(torn_at) = existing.torn_at {
                    let file = OpenOptions::new().write(true).open(&path).await?;
                    file.set_len(torn_at).await?;
                    base_len = torn_at;
                } else if existing.unterminated {
                    line.push('\n');
                }
                let last_id = existing
                    .records
                    .last()
                    .map(|record| record.event_id)
                    .unwrap_or(0);
                (last_id, base_len)
            }
        };

        let record = HistoryRecord {
            run_id: run_id.clone(),
            event_id: previous + 1,
            event,
            recorded_at: Utc::now(),
        };
        line.push_str(&serde_json::to_string(&record)?);
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        *cached = Some(Cursor {
            last_id: record.event_id,
            len: base_len + line.len() as u64,
        });
        Ok(record)
    }

    async fn load(&self, run_id: &RunId) -> HistoryResult<Vec<HistoryRecord>> {
        Ok(self.read_file(run_id).await?.records)
    }

    async fn list_runs(&self) -> HistoryResult<Vec<RunId>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut runs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(HISTORY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                runs.push(RunId::new(stem));
            }
        }

        runs.sort();
        Ok(runs)
    }
}
