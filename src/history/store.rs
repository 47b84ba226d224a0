use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::calendar::HistoryCalendar;
use super::{ActorContext, CaseRecord, HistoryEntry};
use crate::util::atomic_write;

/// Any failure while recording history. Always logged by the writer and
/// never returned to the request that produced the entries.
#[derive(Debug, thiserror::Error)]
pub enum AuditWriteError {
    #[error("failed to create history directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("{} is not a JSON array: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Day files under a single data directory.
///
/// Writes go through [`super::writer::HistoryWriter`]; calling
/// [`HistoryStore::append`] from two tasks at once would race on the
/// read-merge-write cycle.
pub struct HistoryStore {
    dir: PathBuf,
    calendar: HistoryCalendar,
    clock: Clock,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>, calendar: HistoryCalendar) -> Self {
        Self {
            dir: dir.into(),
            calendar,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock (tests pin the day this way).
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the day file that a write happening now would target.
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(self.calendar.file_name((self.clock)()))
    }

    /// Append one entry per record to today's file. Returns the file path
    /// and the number of entries written.
    pub async fn append(
        &self,
        action: &str,
        records: Vec<CaseRecord>,
        actor: &ActorContext,
    ) -> Result<(PathBuf, usize), AuditWriteError> {
        let now = (self.clock)();
        let path = self.dir.join(self.calendar.file_name(now));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| AuditWriteError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let mut log = match load_day(&path).await {
            Ok(entries) => entries,
            Err(e @ AuditWriteError::Parse { .. }) => {
                log::error!("History file corrupt, starting a new log: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let timestamp = self.calendar.timestamp(now);
        let count = records.len();
        for record in records {
            let entry = HistoryEntry::new(action, record, actor, timestamp.clone());
            log.push(serde_json::to_value(&entry)?);
        }

        let data = serde_json::to_vec_pretty(&log)?;
        atomic_write(&path, &data)
            .await
            .map_err(|source| AuditWriteError::Write {
                path: path.clone(),
                source,
            })?;

        Ok((path, count))
    }

    /// Every day file, oldest day first, concatenated. Files that cannot be
    /// read or parsed are skipped with a warning.
    pub async fn read_all(&self) -> Result<Vec<Value>, AuditWriteError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AuditWriteError::Read {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut days = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(AuditWriteError::Read {
                        path: self.dir.clone(),
                        source,
                    })
                }
            };
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(HistoryCalendar::parse_file_name) {
                days.push((key, entry.path()));
            }
        }
        days.sort();

        let mut all = Vec::new();
        for (_, path) in days {
            match load_day(&path).await {
                Ok(entries) => all.extend(entries),
                Err(e) => log::warn!("Skipping history file: {}", e),
            }
        }
        Ok(all)
    }
}

/// Missing or blank file reads as an empty log.
async fn load_day(path: &Path) -> Result<Vec<Value>, AuditWriteError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(AuditWriteError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&raw).map_err(|source| AuditWriteError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_store(dir: &Path) -> HistoryStore {
        HistoryStore::new(dir, HistoryCalendar::default())
            .with_clock(|| Utc.with_ymd_and_hms(2026, 10, 17, 3, 0, 0).unwrap())
    }

    fn actor() -> ActorContext {
        ActorContext {
            user_email: Some("admin@x.com".into()),
            name: Some("Admin".into()),
            id: None,
            user_agent: Some("curl".into()),
            ip_address: Some("::1".into()),
        }
    }

    fn read(path: &Path) -> Vec<Value> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn append_creates_directory_and_day_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = fixed_store(&tmp.path().join("nested").join("data"));

        let (path, count) = store
            .append(
                "unlockUser",
                vec![CaseRecord::from_value(json!({
                    "id": "u1",
                    "user_email": "a@x.com",
                    "status_before": "Locked",
                    "status_after": "Active",
                }))],
                &actor(),
            )
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(path.file_name().unwrap(), "history-17-10-2569.json");
        assert_eq!(path, store.current_path());

        let log = read(&path);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0]["ip_address"], "127.0.0.1");
        assert_eq!(log[0]["authentication"]["user_email"], "admin@x.com");
        assert_eq!(log[0]["case"]["status_after"], "Active");
        assert_eq!(log[0]["case"]["id"], "u1");
        assert_eq!(log[0]["timestamp"], "2026-10-17T10:00:00+07:00");
    }

    #[tokio::test]
    async fn append_keeps_existing_entries_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = fixed_store(tmp.path());

        for i in 0..3 {
            store
                .append(
                    "addNote",
                    vec![CaseRecord::alert(format!("A-{}", i), Some(format!("n{}", i)), json!({}))],
                    &actor(),
                )
                .await
                .unwrap();
        }

        let log = read(&store.current_path());
        let ids: Vec<&str> = log.iter().map(|e| e["case"]["alert_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["A-0", "A-1", "A-2"]);
        assert!(log.iter().all(|e| e["case"].get("id").is_none()));
    }

    #[tokio::test]
    async fn file_is_pretty_printed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = fixed_store(tmp.path());
        let (path, _) = store
            .append("addNote", vec![CaseRecord::id_keyed(json!({ "id": "x" }))], &actor())
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n  {"));
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced_by_new_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = fixed_store(tmp.path());
        std::fs::write(store.current_path(), "[{ not json").unwrap();

        let (path, _) = store
            .append("addNote", vec![CaseRecord::id_keyed(json!({ "id": "x" }))], &actor())
            .await
            .unwrap();

        let log = read(&path);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0]["case"]["id"], "x");
    }

    #[tokio::test]
    async fn blank_file_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = fixed_store(tmp.path());
        std::fs::write(store.current_path(), "  \n").unwrap();

        store
            .append("addNote", vec![CaseRecord::id_keyed(json!({ "id": "x" }))], &actor())
            .await
            .unwrap();
        assert_eq!(read(&store.current_path()).len(), 1);
    }

    #[tokio::test]
    async fn unreadable_day_file_is_an_error_not_a_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let store = fixed_store(tmp.path());
        // A directory where the day file should be cannot be read as text
        std::fs::create_dir_all(store.current_path()).unwrap();

        let err = store
            .append("addNote", vec![CaseRecord::id_keyed(json!({}))], &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditWriteError::Read { .. }));
    }

    #[tokio::test]
    async fn read_all_orders_days_and_skips_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("history-02-01-2569.json"), r#"[{"n":3}]"#).unwrap();
        std::fs::write(dir.join("history-31-12-2568.json"), r#"[{"n":1},{"n":2}]"#).unwrap();
        std::fs::write(dir.join("history-03-01-2569.json"), "garbage").unwrap();
        std::fs::write(dir.join("history-04-01-2569.tmp"), r#"[{"n":99}]"#).unwrap();
        std::fs::write(dir.join("other.json"), r#"[{"n":98}]"#).unwrap();

        let store = HistoryStore::new(dir, HistoryCalendar::default());
        let all = store.read_all().await.unwrap();
        let ns: Vec<i64> = all.iter().map(|e| e["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn read_all_without_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(tmp.path().join("missing"), HistoryCalendar::default());
        assert!(store.read_all().await.unwrap().is_empty());
    }
}
