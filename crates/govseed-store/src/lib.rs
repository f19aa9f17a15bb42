use govseed_types::{Department, EntityKind, Ministry};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

mod benchmark;
mod generator;
mod loader;
pub mod matrix;
#[cfg(feature = "postgres")]
mod postgres;
mod sql;
mod sqlite;
pub mod staging;

pub use benchmark::{
    BenchOptions, BenchSession, MatrixSource, Phase, PublishError, ReportSink, TrialSource,
};
pub use generator::{
    DatasetGenerator, GenerateError, GeneratorConfig, NameSuffix, UniqueNames, Vocabulary,
    map_script,
};
pub use loader::{
    DatasetLoadReport, LoadError, LoadOptions, LoadReport, Loadable, chunk_count,
    effective_batch_size, load_dataset, load_records,
};
pub use matrix::InputError;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Poisoned,
    InvalidInput(String),
    /// The store could not be reached or no connection could be acquired.
    Unavailable(String),
    Storage(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Poisoned => f.write_str("store lock poisoned"),
            StoreError::InvalidInput(message) => write!(f, "invalid input: {}", message),
            StoreError::Unavailable(message) => write!(f, "store unavailable: {}", message),
            StoreError::Storage(message) => write!(f, "storage error: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

/// Target store for generated records.
///
/// Every insert call submits one multi-row statement inside its own
/// transaction and skips rows whose primary key already exists. The return
/// value counts rows actually written.
pub trait Store: Send + Sync {
    fn insert_ministries(&self, batch: &[Ministry]) -> StoreResult<usize>;
    fn insert_departments(&self, batch: &[Department]) -> StoreResult<usize>;

    /// Clears both tables and restarts their identity counters in one step.
    fn reset(&self) -> StoreResult<()>;

    fn count(&self, kind: EntityKind) -> StoreResult<usize>;
    fn list_ids(&self, kind: EntityKind) -> StoreResult<Vec<i64>>;

    /// Most rows of `kind` one insert statement can carry, if the backend
    /// caps it.
    fn max_batch_rows(&self, _kind: EntityKind) -> Option<usize> {
        None
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn insert_ministries(&self, batch: &[Ministry]) -> StoreResult<usize> {
        (**self).insert_ministries(batch)
    }

    fn insert_departments(&self, batch: &[Department]) -> StoreResult<usize> {
        (**self).insert_departments(batch)
    }

    fn reset(&self) -> StoreResult<()> {
        (**self).reset()
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        (**self).count(kind)
    }

    fn list_ids(&self, kind: EntityKind) -> StoreResult<Vec<i64>> {
        (**self).list_ids(kind)
    }

    fn max_batch_rows(&self, kind: EntityKind) -> Option<usize> {
        (**self).max_batch_rows(kind)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    ministries: BTreeMap<i64, Ministry>,
    departments: BTreeMap<i64, Department>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn insert_ministries(&self, batch: &[Ministry]) -> StoreResult<usize> {
        let mut guard = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        let mut inserted = 0;
        for ministry in batch {
            if !guard.ministries.contains_key(&ministry.id) {
                guard.ministries.insert(ministry.id, ministry.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn insert_departments(&self, batch: &[Department]) -> StoreResult<usize> {
        let mut guard = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        // Whole batch is rejected on a dangling reference, like a failed transaction.
        if let Some(orphan) = batch
            .iter()
            .find(|d| !guard.ministries.contains_key(&d.ministry_id))
        {
            return Err(StoreError::Storage(format!(
                "department {} references missing ministry {}",
                orphan.id, orphan.ministry_id
            )));
        }
        let mut inserted = 0;
        for department in batch {
            if !guard.departments.contains_key(&department.id) {
                guard.departments.insert(department.id, department.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn reset(&self) -> StoreResult<()> {
        let mut guard = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        guard.departments.clear();
        guard.ministries.clear();
        Ok(())
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        let guard = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(match kind {
            EntityKind::Ministry => guard.ministries.len(),
            EntityKind::Department => guard.departments.len(),
        })
    }

    fn list_ids(&self, kind: EntityKind) -> StoreResult<Vec<i64>> {
        let guard = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(match kind {
            EntityKind::Ministry => guard.ministries.keys().copied().collect(),
            EntityKind::Department => guard.departments.keys().copied().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ministry(id: i64) -> Ministry {
        Ministry {
            id,
            name: format!("Ministry of Energy - {}", id),
            map_script: map_script(EntityKind::Ministry, id),
        }
    }

    fn department(id: i64, ministry_id: i64) -> Department {
        Department {
            id,
            name: format!("Bureau of Harbors - {}", id),
            map_script: map_script(EntityKind::Department, id),
            ministry_id,
        }
    }

    #[test]
    fn in_memory_insert_skips_existing_keys() {
        let store = InMemoryStore::new();
        assert_eq!(store.insert_ministries(&[ministry(1), ministry(2)]).unwrap(), 2);
        assert_eq!(store.insert_ministries(&[ministry(2), ministry(3)]).unwrap(), 1);
        assert_eq!(store.count(EntityKind::Ministry).unwrap(), 3);
        assert_eq!(store.list_ids(EntityKind::Ministry).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn in_memory_rejects_dangling_department_batch() {
        let store = InMemoryStore::new();
        store.insert_ministries(&[ministry(1)]).unwrap();
        let err = store
            .insert_departments(&[department(1, 1), department(2, 9)])
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(store.count(EntityKind::Department).unwrap(), 0);
    }

    #[test]
    fn in_memory_reset_clears_both_tables() {
        let store = InMemoryStore::new();
        store.insert_ministries(&[ministry(1)]).unwrap();
        store.insert_departments(&[department(1, 1)]).unwrap();
        store.reset().unwrap();
        assert_eq!(store.count(EntityKind::Ministry).unwrap(), 0);
        assert_eq!(store.count(EntityKind::Department).unwrap(), 0);
        assert_eq!(store.insert_ministries(&[ministry(1)]).unwrap(), 1);
    }

    #[test]
    fn store_error_messages_name_the_failure() {
        let err = StoreError::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "store unavailable: connection refused");
    }
}
