use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection as SqliteConnection};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::config::ClientConfig;
use super::connection::ConnectionDescriptor;

/// Key-value persistence for the connection history
pub trait PreferencesStore: Send {
    fn load(&self) -> Result<Vec<ConnectionDescriptor>>;

    /// Replace everything stored with `connections`, in order
    fn save(&self, connections: &[ConnectionDescriptor]) -> Result<()>;
}

/// SQLite-based storage for saved connections
pub struct SqlitePreferencesStore {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl SqlitePreferencesStore {
    /// Open the store in the configured data directory
    pub fn open_default(config: &ClientConfig) -> Result<Self> {
        Self::open(&config.preferences_path())
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }

        let conn = SqliteConnection::open(db_path)
            .with_context(|| format!("Could not open {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(SqliteConnection::open_in_memory()?)
    }

    fn init(conn: SqliteConnection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS connections (
                position INTEGER PRIMARY KEY,
                descriptor TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl PreferencesStore for SqlitePreferencesStore {
    fn load(&self) -> Result<Vec<ConnectionDescriptor>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("connection store lock poisoned"))?;
        let mut stmt = conn.prepare("SELECT descriptor FROM connections ORDER BY position")?;

        let connections = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|json| match serde_json::from_str(&json) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    tracing::warn!("Skipping unreadable saved connection: {}", e);
                    None
                }
            })
            .collect();

        Ok(connections)
    }

    fn save(&self, connections: &[ConnectionDescriptor]) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("connection store lock poisoned"))?;
        let now = chrono::Utc::now().to_rfc3339();

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM connections", [])?;
        for (position, descriptor) in connections.iter().enumerate() {
            let json = serde_json::to_string(descriptor)?;
            tx.execute(
                "INSERT INTO connections (position, descriptor, updated_at) VALUES (?1, ?2, ?3)",
                params![position as i64, json, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// In-process store; clones share the same entries
#[derive(Clone, Default)]
pub struct MemoryPreferencesStore {
    entries: Arc<Mutex<Vec<ConnectionDescriptor>>>,
    fail_writes: bool,
}

impl MemoryPreferencesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<ConnectionDescriptor>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
            fail_writes: false,
        }
    }

    /// A store whose every `save` fails
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> Vec<ConnectionDescriptor> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl PreferencesStore for MemoryPreferencesStore {
    fn load(&self) -> Result<Vec<ConnectionDescriptor>> {
        Ok(self.snapshot())
    }

    fn save(&self, connections: &[ConnectionDescriptor]) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("preferences store is read-only");
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("connection store lock poisoned"))?;
        *entries = connections.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::ServerParams;

    fn sample() -> Vec<ConnectionDescriptor> {
        vec![
            ConnectionDescriptor::file("/data/app.db").with_connection_id("c1"),
            ConnectionDescriptor::client_server(
                ServerParams::endpoint("localhost", 5432)
                    .with_database("app")
                    .with_credentials("postgres", "secret"),
            )
            .with_name("Local PG"),
        ]
    }

    #[test]
    fn test_sqlite_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("connections.db");

        let store = SqlitePreferencesStore::open(&path).unwrap();
        assert!(store.load().unwrap().is_empty());
        store.save(&sample()).unwrap();
        drop(store);

        let reopened = SqlitePreferencesStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), sample());
    }

    #[test]
    fn test_sqlite_store_save_replaces_previous_contents() {
        let store = SqlitePreferencesStore::in_memory().unwrap();
        store.save(&sample()).unwrap();
        store.save(&sample()[1..]).unwrap();
        assert_eq!(store.load().unwrap(), sample()[1..].to_vec());
    }

    #[test]
    fn test_sqlite_store_skips_corrupt_rows() {
        let store = SqlitePreferencesStore::in_memory().unwrap();
        store.save(&sample()).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO connections (position, descriptor, updated_at) VALUES (9, 'not json', '')",
                [],
            )
            .unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_memory_store_shares_entries_between_clones() {
        let store = MemoryPreferencesStore::new();
        let observer = store.clone();
        store.save(&sample()).unwrap();
        assert_eq!(observer.snapshot(), sample());
    }

    #[test]
    fn test_failing_store_rejects_writes() {
        let store = MemoryPreferencesStore::failing();
        assert!(store.save(&sample()).is_err());
        assert!(store.load().unwrap().is_empty());
    }
}
