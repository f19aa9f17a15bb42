use govseed_types::{DEPARTMENT_TABLE, Department, EntityKind, MINISTRY_TABLE, Ministry, TableSpec};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::sql::{Placeholder, bind_count, insert_skip_conflicts};
use crate::{Store, StoreError, StoreResult};

/// Default `SQLITE_MAX_VARIABLE_NUMBER` of the bundled library.
const MAX_BIND_PARAMS: usize = 32_766;

pub struct SqliteStore {
    path: PathBuf,
    connection: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> StoreResult<Self> {
        let path = path.into();
        let as_str = path.to_string_lossy();
        if as_str == ":memory:" {
            return Self::new_in_memory();
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| StoreError::Storage(err.to_string()))?;
            }
        }
        let conn = Connection::open(&path)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        configure_connection(&conn, true)?;
        ensure_schema(&conn)?;
        Ok(Self {
            path,
            connection: Mutex::new(conn),
        })
    }

    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn, false)?;
        ensure_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            connection: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut guard = self.connection.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut *guard)
    }

    fn insert_rows(&self, table: &TableSpec, rows: usize, params: Vec<SqlValue>) -> StoreResult<usize> {
        if rows == 0 {
            return Ok(0);
        }
        let binds = bind_count(table, rows);
        if binds > MAX_BIND_PARAMS {
            return Err(StoreError::InvalidInput(format!(
                "{} rows of {} need {} bind parameters, sqlite allows {}",
                rows, table.name, binds, MAX_BIND_PARAMS
            )));
        }
        let sql = insert_skip_conflicts(table, rows, Placeholder::Question);
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(&sql, params_from_iter(params))?;
            tx.commit()?;
            debug!(table = table.name, rows, inserted, "sqlite batch committed");
            Ok(inserted)
        })
    }
}

fn configure_connection(conn: &Connection, use_wal: bool) -> StoreResult<()> {
    if use_wal {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
    } else {
        conn.execute_batch(
            "PRAGMA journal_mode = MEMORY;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
    }
    Ok(())
}

fn ensure_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
            CREATE TABLE IF NOT EXISTS ministry (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                google_map_script TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS department (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                google_map_script TEXT NOT NULL,
                ministry_id INTEGER NOT NULL REFERENCES ministry (id)
            );
            CREATE INDEX IF NOT EXISTS department_ministry
                ON department (ministry_id);
            ",
    )?;
    Ok(())
}

impl Store for SqliteStore {
    fn insert_ministries(&self, batch: &[Ministry]) -> StoreResult<usize> {
        let mut params = Vec::with_capacity(bind_count(&MINISTRY_TABLE, batch.len()));
        for ministry in batch {
            params.push(SqlValue::Integer(ministry.id));
            params.push(SqlValue::Text(ministry.name.clone()));
            params.push(SqlValue::Text(ministry.map_script.clone()));
        }
        self.insert_rows(&MINISTRY_TABLE, batch.len(), params)
    }

    fn insert_departments(&self, batch: &[Department]) -> StoreResult<usize> {
        let mut params = Vec::with_capacity(bind_count(&DEPARTMENT_TABLE, batch.len()));
        for department in batch {
            params.push(SqlValue::Integer(department.id));
            params.push(SqlValue::Text(department.name.clone()));
            params.push(SqlValue::Text(department.map_script.clone()));
            params.push(SqlValue::Integer(department.ministry_id));
        }
        self.insert_rows(&DEPARTMENT_TABLE, batch.len(), params)
    }

    fn reset(&self) -> StoreResult<()> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(
                "DELETE FROM department;
                 DELETE FROM ministry;
                 DELETE FROM sqlite_sequence WHERE name IN ('department', 'ministry');",
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        self.with_connection(|conn| {
            let sql = format!("SELECT COUNT(*) FROM {}", kind.table().name);
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn list_ids(&self, kind: EntityKind) -> StoreResult<Vec<i64>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT id FROM {} ORDER BY id ASC", kind.table().name);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            let mut ids = Vec::new();
            for id in rows {
                ids.push(id?);
            }
            Ok(ids)
        })
    }

    fn max_batch_rows(&self, kind: EntityKind) -> Option<usize> {
        Some(MAX_BIND_PARAMS / kind.table().columns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_script;

    fn ministries(ids: std::ops::RangeInclusive<i64>) -> Vec<Ministry> {
        ids.map(|id| Ministry {
            id,
            name: format!("Agency of Culture #{}", 1000 + id),
            map_script: map_script(EntityKind::Ministry, id),
        })
        .collect()
    }

    fn departments(ids: std::ops::RangeInclusive<i64>, ministry_id: i64) -> Vec<Department> {
        ids.map(|id| Department {
            id,
            name: format!("Section of Archives #{}", 2000 + id),
            map_script: map_script(EntityKind::Department, id),
            ministry_id,
        })
        .collect()
    }

    #[test]
    fn sqlite_store_roundtrip() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert_eq!(store.insert_ministries(&ministries(1..=3)).unwrap(), 3);
        assert_eq!(store.insert_departments(&departments(1..=4, 2)).unwrap(), 4);

        assert_eq!(store.count(EntityKind::Ministry).unwrap(), 3);
        assert_eq!(store.count(EntityKind::Department).unwrap(), 4);
        assert_eq!(store.list_ids(EntityKind::Department).unwrap(), vec![1, 2, 3, 4]);

        let name: String = store
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT name FROM ministry WHERE id = 2", [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(name, "Agency of Culture #1002");
    }

    #[test]
    fn sqlite_insert_skips_conflicting_ids() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.insert_ministries(&ministries(1..=1)).unwrap();
        assert_eq!(store.insert_ministries(&ministries(1..=2)).unwrap(), 1);
        assert_eq!(store.insert_ministries(&ministries(1..=2)).unwrap(), 0);
        assert_eq!(store.count(EntityKind::Ministry).unwrap(), 2);
    }

    #[test]
    fn sqlite_enforces_foreign_keys() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.insert_ministries(&ministries(1..=1)).unwrap();
        let err = store.insert_departments(&departments(1..=2, 5)).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(store.count(EntityKind::Department).unwrap(), 0);
    }

    #[test]
    fn sqlite_reset_restarts_identity() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.insert_ministries(&ministries(1..=5)).unwrap();
        store.insert_departments(&departments(1..=5, 1)).unwrap();

        store.reset().unwrap();
        assert_eq!(store.count(EntityKind::Ministry).unwrap(), 0);
        assert_eq!(store.count(EntityKind::Department).unwrap(), 0);

        let assigned: i64 = store
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO ministry (name, google_map_script) VALUES ('Office of Labor', '')",
                    [],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .unwrap();
        assert_eq!(assigned, 1);

        store.reset().unwrap();
        assert_eq!(store.insert_ministries(&ministries(1..=1)).unwrap(), 1);
    }

    #[test]
    fn sqlite_rejects_batches_over_bind_limit() {
        let store = SqliteStore::new_in_memory().unwrap();
        let rows = ministries(1..=(MAX_BIND_PARAMS as i64 / 3 + 1));
        let err = store.insert_ministries(&rows).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        assert_eq!(store.count(EntityKind::Ministry).unwrap(), 0);
    }

    #[test]
    fn sqlite_reports_rows_per_statement() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert_eq!(store.max_batch_rows(EntityKind::Ministry), Some(10_922));
        assert_eq!(store.max_batch_rows(EntityKind::Department), Some(8_191));

        let rows = ministries(1..=10_922);
        assert_eq!(store.insert_ministries(&rows).unwrap(), 10_922);
    }

    #[test]
    fn sqlite_file_store_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("govseed.db");
        let store = SqliteStore::new(&path).unwrap();
        store.insert_ministries(&ministries(1..=2)).unwrap();
        assert_eq!(store.path(), path.as_path());
        drop(store);

        let reopened = SqliteStore::new(&path).unwrap();
        assert_eq!(reopened.count(EntityKind::Ministry).unwrap(), 2);
    }
}
