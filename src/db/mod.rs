use rusqlite::Connection;
use std::path::Path;
use tokio::task;
use crate::error::{Result, TrialGraphError};

/// Database connection manager
///
/// Holds only the path; every unit of work opens its own connection and
/// releases it when the closure returns, on success or error.
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

/// WAL for concurrent readers, NORMAL sync for speed, foreign keys so edges
/// cannot outlive their endpoints, in-memory temp store, 64MB page cache.
const PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536;";

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Open a new database connection with pragmas applied
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(PRAGMAS)?;
        Ok(conn)
    }

    /// Execute a closure with a fresh database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        task::spawn_blocking(move || {
            let mut conn = db.open_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            TrialGraphError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("database task failed: {}", e),
            ))
        })?
    }
}

pub mod migrate;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db.with_connection(|conn| {
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", [])?;
            Ok(())
        }).await;

        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_pragmas_set() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));

        db.with_connection(|conn| {
            let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            assert_eq!(journal_mode.to_uppercase(), "WAL");

            let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
            assert_eq!(foreign_keys, 1);

            Ok::<(), TrialGraphError>(())
        }).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_path_is_store_error() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("missing-dir").join("test.db"));
        let err = db.with_connection(|_conn| Ok(())).await.unwrap_err();
        assert!(matches!(err, TrialGraphError::StoreUnavailable(_)));
    }
}
