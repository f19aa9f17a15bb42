use govseed_types::{DEPARTMENT_TABLE, Department, EntityKind, MINISTRY_TABLE, Ministry, TableSpec};
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use tracing::debug;

use crate::sql::{Placeholder, bind_count, insert_skip_conflicts};
use crate::{Store, StoreError, StoreResult};

/// Wire protocol limit on parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

pub struct PostgresStore {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("max_size", &self.pool.max_size())
            .finish()
    }
}

impl PostgresStore {
    pub fn new(dsn: &str) -> StoreResult<Self> {
        Self::with_pool_size(dsn, 2)
    }

    pub fn with_pool_size(dsn: &str, max_size: u32) -> StoreResult<Self> {
        let config = dsn
            .parse()
            .map_err(|err: postgres::Error| StoreError::InvalidInput(err.to_string()))?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .build(manager)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let store = Self { pool };
        store.with_conn(|conn| ensure_schema(conn))?;
        Ok(store)
    }

    fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Client) -> StoreResult<T>,
    {
        let mut conn = self
            .pool
            .get()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        f(&mut conn)
    }

    fn insert_rows(&self, table: &TableSpec, rows: usize, params: PgParams) -> StoreResult<usize> {
        if rows == 0 {
            return Ok(0);
        }
        let binds = bind_count(table, rows);
        if binds > MAX_BIND_PARAMS {
            return Err(StoreError::InvalidInput(format!(
                "{} rows of {} need {} bind parameters, postgres allows {}",
                rows, table.name, binds, MAX_BIND_PARAMS
            )));
        }
        let sql = insert_skip_conflicts(table, rows, Placeholder::Numbered);
        self.with_conn(|conn| {
            let mut tx = conn.transaction().map_err(map_pg_err)?;
            let inserted = tx.execute(sql.as_str(), &params.refs()).map_err(map_pg_err)?;
            tx.commit().map_err(map_pg_err)?;
            debug!(table = table.name, rows, inserted, "postgres batch committed");
            Ok(inserted as usize)
        })
    }
}

impl Store for PostgresStore {
    fn insert_ministries(&self, batch: &[Ministry]) -> StoreResult<usize> {
        let mut params = PgParams::with_capacity(bind_count(&MINISTRY_TABLE, batch.len()));
        for ministry in batch {
            params.add(ministry.id);
            params.add(ministry.name.clone());
            params.add(ministry.map_script.clone());
        }
        self.insert_rows(&MINISTRY_TABLE, batch.len(), params)
    }

    fn insert_departments(&self, batch: &[Department]) -> StoreResult<usize> {
        let mut params = PgParams::with_capacity(bind_count(&DEPARTMENT_TABLE, batch.len()));
        for department in batch {
            params.add(department.id);
            params.add(department.name.clone());
            params.add(department.map_script.clone());
            params.add(department.ministry_id);
        }
        self.insert_rows(&DEPARTMENT_TABLE, batch.len(), params)
    }

    fn reset(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.batch_execute("TRUNCATE TABLE department, ministry RESTART IDENTITY CASCADE")
                .map_err(map_pg_err)
        })
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM {}", kind.table().name);
            let row = conn.query_one(sql.as_str(), &[]).map_err(map_pg_err)?;
            let count: i64 = row.get(0);
            Ok(count as usize)
        })
    }

    fn list_ids(&self, kind: EntityKind) -> StoreResult<Vec<i64>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT id::BIGINT FROM {} ORDER BY id ASC", kind.table().name);
            let rows = conn.query(sql.as_str(), &[]).map_err(map_pg_err)?;
            Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
        })
    }

    fn max_batch_rows(&self, kind: EntityKind) -> Option<usize> {
        Some(MAX_BIND_PARAMS / kind.table().columns.len())
    }
}

fn ensure_schema(conn: &mut Client) -> StoreResult<()> {
    conn.batch_execute(
        "
        CREATE TABLE IF NOT EXISTS ministry (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            google_map_script TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS department (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            google_map_script TEXT NOT NULL,
            ministry_id BIGINT NOT NULL REFERENCES ministry (id)
        );
        CREATE INDEX IF NOT EXISTS department_ministry
            ON department (ministry_id);
        ",
    )
    .map_err(map_pg_err)
}

struct PgParams {
    values: Vec<Box<dyn ToSql + Sync>>,
}

impl PgParams {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    fn add<T: ToSql + Sync + 'static>(&mut self, value: T) {
        self.values.push(Box::new(value));
    }

    fn refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|value| &**value as &(dyn ToSql + Sync))
            .collect()
    }
}

/// Server-side rejections are storage errors; anything without a database
/// error attached (closed socket, refused connection) means the store is gone.
fn map_pg_err(err: postgres::Error) -> StoreError {
    if err.as_db_error().is_some() {
        StoreError::Storage(err.to_string())
    } else if err.is_closed() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Storage(err.to_string())
    }
}
