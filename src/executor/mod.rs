//! SQLite execution layer: one database file per customer, connections
//! cached behind an async lock.

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::QueryResult;

/// Column description from PRAGMA table_info.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Seam for query execution against one customer backend. The production
/// implementation is SQLite; tests can substitute their own.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Run a read query and return one result per customer, with rows as
    /// JSON objects keyed by the columns the SQL selected.
    async fn execute_query(&self, customer_id: &str, sql: &str) -> Result<QueryResult>;

    /// Cheap liveness probe.
    async fn test_connection(&self, customer_id: &str) -> Result<bool>;

    /// Tables and their columns for one customer database.
    async fn table_info(&self, customer_id: &str) -> Result<BTreeMap<String, Vec<ColumnInfo>>>;

    /// Every customer id this backend knows about, for callers that fan
    /// out without an explicit customer list.
    async fn list_customers(&self) -> Result<Vec<String>>;
}

/// Executes compiled SQL against per-customer SQLite files under a single
/// database directory. Connections open lazily and are cached for reuse.
pub struct SqliteExecutor {
    database_dir: PathBuf,
    connections: RwLock<BTreeMap<String, Arc<Mutex<Connection>>>>,
}

impl SqliteExecutor {
    pub fn new(config: &Config) -> Self {
        Self {
            database_dir: config.database_dir().to_path_buf(),
            connections: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            database_dir: dir.as_ref().to_path_buf(),
            connections: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn database_path(&self, customer_id: &str) -> PathBuf {
        let id = customer_id.trim().to_lowercase();
        let file = if id.starts_with("customer_") {
            format!("{}.db", id)
        } else {
            format!("customer_{}.db", id)
        };
        self.database_dir.join(file)
    }

    /// Customer ids derived from the `customer_*.db` files present in the
    /// database directory, in sorted order.
    pub fn list_customers(&self) -> Result<Vec<String>> {
        let mut customers = Vec::new();
        for entry in std::fs::read_dir(&self.database_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("customer_") && name.ends_with(".db") {
                customers.push(name.trim_end_matches(".db").to_string());
            }
        }
        customers.sort();
        Ok(customers)
    }

    /// Drop every cached connection. Subsequent queries reopen lazily.
    pub async fn close_all(&self) {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        info!(closed = count, "closed cached connections");
    }

    /// Get or open the cached connection for a customer. Uses a read lock
    /// for the fast path and double-checks under the write lock so two
    /// tasks racing on a cold customer open the file only once.
    async fn connection(&self, customer_id: &str) -> Result<Arc<Mutex<Connection>>> {
        {
            let connections = self.connections.read().await;
            if let Some(conn) = connections.get(customer_id) {
                return Ok(conn.clone());
            }
        }

        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get(customer_id) {
            return Ok(conn.clone());
        }

        let path = self.database_path(customer_id);
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "no database file for {} at {}",
                customer_id,
                path.display()
            )));
        }

        let conn = Connection::open(&path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(|e| Error::Database(e.to_string()))?;
        debug!(customer_id, path = %path.display(), "opened customer database");

        let conn = Arc::new(Mutex::new(conn));
        connections.insert(customer_id.to_string(), conn.clone());
        Ok(conn)
    }

    pub async fn count_rows(&self, customer_id: &str, table: &str) -> Result<u64> {
        let conn = self.connection(customer_id).await?;
        let conn = conn.lock().await;
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count as u64)
    }

    fn run_query(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<Map<String, Value>>> {
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut data = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::new();
            for (index, name) in column_names.iter().enumerate() {
                object.insert(name.clone(), json_value(row.get_ref(index)?));
            }
            data.push(object);
        }
        Ok(data)
    }
}

#[async_trait]
impl BackendAdapter for SqliteExecutor {
    async fn execute_query(&self, customer_id: &str, sql: &str) -> Result<QueryResult> {
        let started = Instant::now();
        let conn = match self.connection(customer_id).await {
            Ok(conn) => conn,
            Err(Error::NotFound(message)) => {
                warn!(customer_id, %message, "customer database missing");
                return Err(Error::NotFound(message));
            }
            Err(e) => return Err(e),
        };
        let conn = conn.lock().await;

        match Self::run_query(&conn, sql) {
            Ok(data) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                debug!(
                    customer_id,
                    rows = data.len(),
                    elapsed_ms = elapsed,
                    "query executed"
                );
                Ok(QueryResult {
                    customer_id: customer_id.to_string(),
                    row_count: data.len(),
                    data,
                    sql_executed: sql.to_string(),
                    execution_time_ms: elapsed,
                    error: None,
                })
            }
            Err(e) => {
                // Failed executions still report wall-clock time spent.
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                warn!(customer_id, error = %e, "query failed");
                let mut result =
                    QueryResult::failed(customer_id, sql, e.to_string());
                result.execution_time_ms = elapsed;
                Ok(result)
            }
        }
    }

    async fn test_connection(&self, customer_id: &str) -> Result<bool> {
        let conn = self.connection(customer_id).await?;
        let conn = conn.lock().await;
        let probe: rusqlite::Result<i64> = conn.query_row("SELECT 1", [], |row| row.get(0));
        Ok(probe.is_ok())
    }

    async fn list_customers(&self) -> Result<Vec<String>> {
        SqliteExecutor::list_customers(self)
    }

    async fn table_info(&self, customer_id: &str) -> Result<BTreeMap<String, Vec<ColumnInfo>>> {
        let conn = self.connection(customer_id).await?;
        let conn = conn.lock().await;

        let mut tables = Vec::new();
        {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                     ORDER BY name",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            let mut rows = stmt.query([]).map_err(|e| Error::Database(e.to_string()))?;
            while let Some(row) = rows.next().map_err(|e| Error::Database(e.to_string()))? {
                let name: String = row.get(0).map_err(|e| Error::Database(e.to_string()))?;
                tables.push(name);
            }
        }

        let mut info = BTreeMap::new();
        for table in tables {
            let mut columns = Vec::new();
            let sql = format!("PRAGMA table_info({})", table);
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::Database(e.to_string()))?;
            let mut rows = stmt.query([]).map_err(|e| Error::Database(e.to_string()))?;
            while let Some(row) = rows.next().map_err(|e| Error::Database(e.to_string()))? {
                columns.push(ColumnInfo {
                    name: row.get(1).map_err(|e| Error::Database(e.to_string()))?,
                    data_type: row.get(2).map_err(|e| Error::Database(e.to_string()))?,
                    not_null: row
                        .get::<_, i64>(3)
                        .map_err(|e| Error::Database(e.to_string()))?
                        != 0,
                    primary_key: row
                        .get::<_, i64>(5)
                        .map_err(|e| Error::Database(e.to_string()))?
                        != 0,
                });
            }
            info.insert(table, columns);
        }
        Ok(info)
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(String::from_utf8_lossy(b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_customer(dir: &Path, customer_id: &str) {
        let conn = Connection::open(dir.join(format!("{}.db", customer_id))).unwrap();
        conn.execute_batch(
            "CREATE TABLE contracts (
                contract_id INTEGER PRIMARY KEY,
                contract_name TEXT,
                contract_value REAL,
                status TEXT
            );
            INSERT INTO contracts VALUES (1, 'Acme Corp', 120000.0, 'active');
            INSERT INTO contracts VALUES (2, 'Globex', 45000.0, 'expired');",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_execute_query_returns_rows_as_json() {
        let dir = TempDir::new().unwrap();
        seed_customer(dir.path(), "customer_a");
        let executor = SqliteExecutor::with_dir(dir.path());

        let result = executor
            .execute_query(
                "customer_a",
                "SELECT contract_id, contract_name FROM contracts ORDER BY contract_id",
            )
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(result.row_count, 2);
        assert_eq!(result.data[0]["contract_id"], Value::from(1));
        assert_eq!(result.data[0]["contract_name"], Value::from("Acme Corp"));
        assert!(result.execution_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_missing_database_is_not_found() {
        let dir = TempDir::new().unwrap();
        let executor = SqliteExecutor::with_dir(dir.path());
        let err = executor
            .execute_query("customer_z", "SELECT 1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_bad_sql_reports_error_in_result() {
        let dir = TempDir::new().unwrap();
        seed_customer(dir.path(), "customer_a");
        let executor = SqliteExecutor::with_dir(dir.path());

        let result = executor
            .execute_query("customer_a", "SELECT nope FROM contracts")
            .await
            .unwrap();
        assert!(!result.success());
        assert!(result.error.is_some());
        assert_eq!(result.row_count, 0);
    }

    #[tokio::test]
    async fn test_connection_is_cached() {
        let dir = TempDir::new().unwrap();
        seed_customer(dir.path(), "customer_a");
        let executor = SqliteExecutor::with_dir(dir.path());

        assert!(executor.test_connection("customer_a").await.unwrap());
        assert_eq!(executor.connections.read().await.len(), 1);
        assert!(executor.test_connection("customer_a").await.unwrap());
        assert_eq!(executor.connections.read().await.len(), 1);

        executor.close_all().await;
        assert_eq!(executor.connections.read().await.len(), 0);
    }

    #[tokio::test]
    async fn test_table_info() {
        let dir = TempDir::new().unwrap();
        seed_customer(dir.path(), "customer_a");
        let executor = SqliteExecutor::with_dir(dir.path());

        let info = executor.table_info("customer_a").await.unwrap();
        let columns = &info["contracts"];
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].name, "contract_id");
        assert!(columns[0].primary_key);
    }

    #[tokio::test]
    async fn test_list_customers_sorted() {
        let dir = TempDir::new().unwrap();
        seed_customer(dir.path(), "customer_b");
        seed_customer(dir.path(), "customer_a");
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let executor = SqliteExecutor::with_dir(dir.path());

        let customers = executor.list_customers().unwrap();
        assert_eq!(customers, vec!["customer_a", "customer_b"]);
    }

    #[tokio::test]
    async fn test_count_rows() {
        let dir = TempDir::new().unwrap();
        seed_customer(dir.path(), "customer_a");
        let executor = SqliteExecutor::with_dir(dir.path());
        assert_eq!(executor.count_rows("customer_a", "contracts").await.unwrap(), 2);
    }
}
