use std::path::{Path, PathBuf};

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::lifecycle::{LifecycleEvent, PositionState, Transaction};

/// Audit record appended on every position event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDocument {
    pub pair: String,
    pub position_id: String,
    pub position_type: String,
    pub state: String,
    pub price_open: f64,
    pub price_close: Option<f64>,
    pub date_open_ms: u64,
    pub date_close_ms: Option<u64>,
}

impl StatusDocument {
    pub fn from_transaction(pair: &str, state: PositionState, tx: &Transaction) -> Self {
        Self {
            pair: pair.to_string(),
            position_id: tx.position_id.clone(),
            position_type: tx.direction.to_string(),
            state: state.to_string(),
            price_open: tx.open_price,
            price_close: tx.close_price,
            date_open_ms: tx.opened_at_ms,
            date_close_ms: tx.closed_at_ms,
        }
    }

    /// Document for `event`, looked up in the engine's transaction log.
    pub fn for_event(
        pair: &str,
        state: PositionState,
        event: &LifecycleEvent,
        log: &[Transaction],
    ) -> Option<Self> {
        log.iter()
            .rev()
            .find(|t| t.position_id == event.position_id())
            .map(|t| Self::from_transaction(pair, state, t))
    }
}

/// Append-only sink for status documents.
pub trait StatusStore: Send + Sync {
    fn append(&self, doc: &StatusDocument) -> Result<()>;
}

pub struct SqliteStatusStore {
    path: PathBuf,
}

impl SqliteStatusStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            path: path.to_path_buf(),
        };
        store.connect()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS position_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair TEXT NOT NULL,
                position_id TEXT NOT NULL,
                position_type TEXT NOT NULL,
                state TEXT NOT NULL,
                price_open REAL NOT NULL,
                price_close REAL,
                date_open_ms INTEGER NOT NULL,
                date_close_ms INTEGER,
                recorded_at_ms INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(conn)
    }

    pub fn load(&self, pair: &str) -> Result<Vec<StatusDocument>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT pair, position_id, position_type, state, price_open, price_close,
                   date_open_ms, date_close_ms
            FROM position_status
            WHERE pair = ?1
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map([pair], |row| {
            Ok(StatusDocument {
                pair: row.get(0)?,
                position_id: row.get(1)?,
                position_type: row.get(2)?,
                state: row.get(3)?,
                price_open: row.get(4)?,
                price_close: row.get(5)?,
                date_open_ms: row.get::<_, i64>(6)? as u64,
                date_close_ms: row.get::<_, Option<i64>>(7)?.map(|v| v as u64),
            })
        })?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }
}

impl StatusStore for SqliteStatusStore {
    fn append(&self, doc: &StatusDocument) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO position_status (
                pair, position_id, position_type, state, price_open, price_close,
                date_open_ms, date_close_ms, recorded_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                doc.pair,
                doc.position_id,
                doc.position_type,
                doc.state,
                doc.price_open,
                doc.price_close,
                doc.date_open_ms as i64,
                doc.date_close_ms.map(|v| v as i64),
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }
}
