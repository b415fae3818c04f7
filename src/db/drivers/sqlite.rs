//! SQLite driver implementation

use base64::Engine as _;
use rusqlite::types::ValueRef;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::db::error::{ConnectionError, Result};
use crate::db::result::QueryResult;

type Handle = Arc<Mutex<rusqlite::Connection>>;

pub struct SqliteDriver {
    connections: Mutex<HashMap<String, Handle>>,
}

impl SqliteDriver {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Open an existing database file, or `:memory:`
    pub async fn connect(&self, connection_id: &str, path: String) -> Result<()> {
        // SQLite is synchronous, so we run it in a blocking task
        let conn = tokio::task::spawn_blocking(move || {
            if path != ":memory:" && !Path::new(&path).exists() {
                return Err(ConnectionError::BackendFailure(format!(
                    "Database file does not exist: {}",
                    path
                )));
            }
            rusqlite::Connection::open(&path).map_err(|e| ConnectionError::BackendFailure(e.to_string()))
        })
        .await
        .map_err(|e| ConnectionError::BackendFailure(e.to_string()))??;

        self.connections
            .lock()
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
            .insert(connection_id.to_string(), Arc::new(Mutex::new(conn)));
        Ok(())
    }

    fn handle(&self, connection_id: &str) -> Result<Handle> {
        self.connections
            .lock()
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
            .get(connection_id)
            .cloned()
            .ok_or_else(|| ConnectionError::UnknownConnection(connection_id.to_string()))
    }

    /// Failures come back inside the result
    pub async fn execute(&self, connection_id: &str, sql: String) -> QueryResult {
        let handle = match self.handle(connection_id) {
            Ok(handle) => handle,
            Err(e) => return QueryResult::failed(e.to_string()),
        };

        let outcome = tokio::task::spawn_blocking(move || {
            let conn = handle
                .lock()
                .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?;
            run_statement(&conn, &sql).map_err(|e| ConnectionError::BackendFailure(e.to_string()))
        })
        .await
        .map_err(|e| ConnectionError::BackendFailure(e.to_string()));

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) | Err(e) => QueryResult::failed(e.to_string()),
        }
    }

    pub async fn tables(&self, connection_id: &str) -> Result<Vec<String>> {
        let handle = self.handle(connection_id)?;
        tokio::task::spawn_blocking(move || {
            let conn = handle
                .lock()
                .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?;
            list_tables(&conn).map_err(|e| ConnectionError::BackendFailure(e.to_string()))
        })
        .await
        .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
    }

    pub fn close(&self, connection_id: &str) -> Result<()> {
        self.connections
            .lock()
            .map_err(|e| ConnectionError::BackendFailure(e.to_string()))?
            .remove(connection_id);
        Ok(())
    }
}

/// Statements that produce columns return rows; the rest report affected rows
fn run_statement(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        let affected = stmt.execute([])?;
        return Ok(QueryResult::affected(affected as u64));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut record = Map::new();
        for (idx, column) in columns.iter().enumerate() {
            record.insert(column.clone(), to_json(row.get_ref(idx)?));
        }
        rows.push(record);
    }
    Ok(QueryResult::with_rows(columns, rows))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        // NaN and infinities have no JSON number form
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
    }
}

fn list_tables(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}
