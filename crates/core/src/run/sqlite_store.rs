use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{RunFilter, RunRecord, RunStore};
use crate::persistence::PersistenceError;

/// SQLite-backed run store. The full record is kept as JSON; the indexed
/// columns exist for filtering only.
pub struct SqliteRunStore {
    conn: Mutex<Connection>,
}

impl SqliteRunStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing)
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
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                state TEXT NOT NULL,
                status TEXT,
                requested_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                record TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_workspace_id ON runs(workspace_id);
            CREATE INDEX IF NOT EXISTS idx_runs_state ON runs(state);
            CREATE INDEX IF NOT EXISTS idx_runs_requested_at ON runs(requested_at);
            "#,
        )?;
        Ok(())
    }

    fn build_where_clause(filter: &RunFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref workspace_id) = filter.workspace_id {
            conditions.push("workspace_id = ?");
            params.push(Box::new(workspace_id.clone()));
        }

        if let Some(state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.as_str()));
        }

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("requested_at >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("requested_at <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn decode(json: &str) -> Result<RunRecord, PersistenceError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl RunStore for SqliteRunStore {
    fn insert(&self, record: &RunRecord) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(record)?;

        conn.execute(
            "INSERT INTO runs (id, workspace_id, state, status, requested_at, updated_at, record)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.run_id(),
                record.workspace_id(),
                record.state.as_str(),
                record.status.map(|s| s.as_str()),
                record.context.requested_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                json,
            ],
        )?;
        Ok(())
    }

    fn update(&self, record: &RunRecord) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(record)?;

        let changed = conn.execute(
            "UPDATE runs SET state = ?, status = ?, updated_at = ?, record = ? WHERE id = ?",
            params![
                record.state.as_str(),
                record.status.map(|s| s.as_str()),
                record.updated_at.to_rfc3339(),
                json,
                record.run_id(),
            ],
        )?;

        if changed == 0 {
            return Err(PersistenceError::NotFound(record.run_id().to_string()));
        }
        Ok(())
    }

    fn get(&self, run_id: &str) -> Result<Option<RunRecord>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row(
                "SELECT record FROM runs WHERE id = ?",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;

        json.as_deref().map(Self::decode).transpose()
    }

    fn list(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT record FROM runs {} ORDER BY requested_at DESC, rowid DESC LIMIT ? OFFSET ?",
            where_clause
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::decode(&row?)?);
        }
        Ok(records)
    }

    fn count(&self, filter: &RunFilter) -> Result<i64, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM runs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn list_active(&self) -> Result<Vec<RunRecord>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(
            "SELECT record FROM runs WHERE state != 'idle' OR status IS NULL ORDER BY requested_at ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::decode(&row?)?);
        }
        Ok(records)
    }
}
