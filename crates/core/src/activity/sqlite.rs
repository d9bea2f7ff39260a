use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{ActivityEntry, ActivityFilter, ActivityLog};
use crate::persistence::PersistenceError;
use crate::run::RunState;

const SELECT_COLUMNS: &str =
    "SELECT id, run_id, workspace_id, seq, timestamp, from_state, to_state, detail FROM activity";

/// SQLite-backed activity log
pub struct SqliteActivityLog {
    conn: Mutex<Connection>,
}

impl SqliteActivityLog {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite activity log (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), PersistenceError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS activity (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                workspace_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                from_state TEXT NOT NULL,
                to_state TEXT NOT NULL,
                detail TEXT NOT NULL,
                UNIQUE (run_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_activity_run_id ON activity(run_id);
            CREATE INDEX IF NOT EXISTS idx_activity_workspace_id ON activity(workspace_id);
            CREATE INDEX IF NOT EXISTS idx_activity_timestamp ON activity(timestamp);
            "#,
        )?;
        Ok(())
    }

    fn build_where_clause(filter: &ActivityFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref run_id) = filter.run_id {
            conditions.push("run_id = ?");
            params.push(Box::new(run_id.clone()));
        }

        if let Some(ref workspace_id) = filter.workspace_id {
            conditions.push("workspace_id = ?");
            params.push(Box::new(workspace_id.clone()));
        }

        if let Some(state) = filter.from_state {
            conditions.push("from_state = ?");
            params.push(Box::new(state.as_str()));
        }

        if let Some(state) = filter.to_state {
            conditions.push("to_state = ?");
            params.push(Box::new(state.as_str()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("timestamp >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
        Ok(RawEntry {
            id: row.get(0)?,
            run_id: row.get(1)?,
            workspace_id: row.get(2)?,
            seq: row.get(3)?,
            timestamp: row.get(4)?,
            from_state: row.get(5)?,
            to_state: row.get(6)?,
            detail: row.get(7)?,
        })
    }
}

struct RawEntry {
    id: i64,
    run_id: String,
    workspace_id: String,
    seq: u32,
    timestamp: String,
    from_state: String,
    to_state: String,
    detail: String,
}

impl RawEntry {
    fn decode(self) -> Result<ActivityEntry, PersistenceError> {
        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| PersistenceError::Database(format!("Invalid timestamp: {}", e)))?
            .into();
        let state = |s: &str| {
            RunState::parse(s)
                .ok_or_else(|| PersistenceError::Database(format!("Invalid run state: {}", s)))
        };

        Ok(ActivityEntry {
            id: self.id,
            run_id: self.run_id,
            workspace_id: self.workspace_id,
            seq: self.seq,
            timestamp,
            from_state: state(&self.from_state)?,
            to_state: state(&self.to_state)?,
            detail: serde_json::from_str(&self.detail)?,
        })
    }
}

impl ActivityLog for SqliteActivityLog {
    fn append(&self, entry: &ActivityEntry) -> Result<i64, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let detail = serde_json::to_string(&entry.detail)?;

        conn.execute(
            "INSERT INTO activity (run_id, workspace_id, seq, timestamp, from_state, to_state, detail)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.run_id,
                entry.workspace_id,
                entry.seq,
                entry.timestamp.to_rfc3339(),
                entry.from_state.as_str(),
                entry.to_state.as_str(),
                detail,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &ActivityFilter) -> Result<Vec<ActivityEntry>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "{} {} ORDER BY id ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), Self::read_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.decode()?);
        }
        Ok(entries)
    }

    fn count(&self, filter: &ActivityFilter) -> Result<i64, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM activity {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn last_for_run(&self, run_id: &str) -> Result<Option<ActivityEntry>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("{} WHERE run_id = ? ORDER BY seq DESC LIMIT 1", SELECT_COLUMNS);
        let raw = conn
            .query_row(&sql, params![run_id], Self::read_row)
            .optional()?;
        raw.map(RawEntry::decode).transpose()
    }
}
