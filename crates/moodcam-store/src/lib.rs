//! moodcam-store: append-only SQLite log of emotion observations.
//!
//! Writes go through a single `tokio-rusqlite` connection thread, which
//! serializes concurrent appends. Records are never updated or deleted here.

use chrono::{DateTime, Utc};
use moodcam_core::Observation;
use rusqlite::params;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Number of records served by the history listing.
pub const HISTORY_PAGE_SIZE: usize = 50;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        emotion TEXT NOT NULL,
        confidence REAL NOT NULL,
        ip_address TEXT NOT NULL,
        username TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS history_timestamp_idx ON history(timestamp);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sql(#[from] tokio_rusqlite::Error),
    #[error("bad timestamp {value:?} in row {id}: {source}")]
    Timestamp {
        id: i64,
        value: String,
        source: chrono::ParseError,
    },
}

/// A persisted observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub emotion: String,
    pub confidence: f32,
    pub ip_address: String,
    pub username: String,
}

/// Raw row as read from SQLite, before timestamp parsing.
type HistoryRow = (i64, String, String, f64, String, String);

#[derive(Clone)]
pub struct HistoryStore {
    conn: tokio_rusqlite::Connection,
}

impl HistoryStore {
    /// Open (creating if needed) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio_rusqlite::Connection::open(&path).await?;
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(())
        })
        .await?;
        let store = Self::init(conn).await?;
        tracing::info!(path = %path.display(), "history store opened");
        Ok(store)
    }

    /// A private in-memory store, gone when dropped.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: tokio_rusqlite::Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Append one observation; the timestamp is assigned by the store.
    /// Returns the new record id.
    pub async fn append(&self, observation: &Observation) -> Result<i64, StoreError> {
        let obs = observation.clone();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO history (emotion, confidence, ip_address, username)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![obs.emotion, obs.confidence as f64, obs.source_address, obs.username],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// The `limit` most recent records, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ObservationRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<HistoryRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, emotion, confidence, ip_address, username
                     FROM history
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], |r| {
                        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(into_record).collect()
    }

    /// Total number of records.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0))?))
            .await?;
        Ok(n.max(0) as u64)
    }
}

fn into_record(row: HistoryRow) -> Result<ObservationRecord, StoreError> {
    let (id, ts, emotion, confidence, ip_address, username) = row;
    let timestamp = DateTime::parse_from_rfc3339(&ts)
        .map_err(|source| StoreError::Timestamp { id, value: ts.clone(), source })?
        .with_timezone(&Utc);
    Ok(ObservationRecord {
        id,
        timestamp,
        emotion,
        confidence: confidence as f32,
        ip_address,
        username,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(emotion: &str, confidence: f32) -> Observation {
        Observation {
            emotion: emotion.into(),
            confidence,
            source_address: "127.0.0.1".into(),
            username: "Khách vãng lai".into(),
        }
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        let before = Utc::now() - chrono::Duration::seconds(1);
        let id = store.append(&observation("Hạnh phúc 😊", 0.83)).await.unwrap();

        let records = store.recent(HISTORY_PAGE_SIZE).await.unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, id);
        assert_eq!(r.emotion, "Hạnh phúc 😊");
        assert_eq!(r.confidence, 0.83);
        assert_eq!(r.ip_address, "127.0.0.1");
        assert_eq!(r.username, "Khách vãng lai");
        assert!(r.timestamp >= before);
    }

    #[tokio::test]
    async fn test_recent_newest_first() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        for label in ["a", "b", "c"] {
            store.append(&observation(label, 0.9)).await.unwrap();
        }
        let labels: Vec<String> = store
            .recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.emotion)
            .collect();
        assert_eq!(labels, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        for i in 0..60 {
            store.append(&observation(&format!("e{i}"), 0.7)).await.unwrap();
        }
        let records = store.recent(HISTORY_PAGE_SIZE).await.unwrap();
        assert_eq!(records.len(), HISTORY_PAGE_SIZE);
        assert_eq!(records[0].emotion, "e59");
        assert_eq!(records[49].emotion, "e10");
        assert_eq!(store.count().await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        let a = store.append(&observation("x", 0.6)).await.unwrap();
        let b = store.append(&observation("y", 0.6)).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(&observation(&format!("c{i}"), 0.9)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_open_file_persists() {
        let path = std::env::temp_dir().join(format!("moodcam-store-test-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let store = HistoryStore::open(&path).await.unwrap();
            store.append(&observation("Buồn 😢", 0.66)).await.unwrap();
        }
        let reopened = HistoryStore::open(&path).await.unwrap();
        let records = reopened.recent(HISTORY_PAGE_SIZE).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].emotion, "Buồn 😢");

        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_into_record_rejects_bad_timestamp() {
        let row: HistoryRow = (7, "yesterday".into(), "x".into(), 0.9, "ip".into(), "u".into());
        assert!(matches!(into_record(row), Err(StoreError::Timestamp { id: 7, .. })));
    }
}
