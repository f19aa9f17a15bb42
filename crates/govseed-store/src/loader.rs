use govseed_types::{Dataset, Department, EntityKind, Ministry};
use std::fmt;
use std::num::NonZeroUsize;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::{Store, StoreError, StoreResult};

const DEFAULT_BATCH_SIZE: usize = 500;

/// A record type with a table of its own in the target store.
pub trait Loadable: Sized {
    const KIND: EntityKind;

    fn insert_chunk<S: Store + ?Sized>(store: &S, chunk: &[Self]) -> StoreResult<usize>;
}

impl Loadable for Ministry {
    const KIND: EntityKind = EntityKind::Ministry;

    fn insert_chunk<S: Store + ?Sized>(store: &S, chunk: &[Self]) -> StoreResult<usize> {
        store.insert_ministries(chunk)
    }
}

impl Loadable for Department {
    const KIND: EntityKind = EntityKind::Department;

    fn insert_chunk<S: Store + ?Sized>(store: &S, chunk: &[Self]) -> StoreResult<usize> {
        store.insert_departments(chunk)
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: NonZeroUsize,
    /// Pause between consecutive chunks.
    pub throttle: Duration,
}

impl LoadOptions {
    pub fn new(batch_size: NonZeroUsize) -> Self {
        Self {
            batch_size,
            throttle: Duration::ZERO,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub kind: EntityKind,
    pub records: usize,
    pub chunks: usize,
    /// Rows written; rows skipped on key conflict are not counted.
    pub inserted: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetLoadReport {
    pub ministries: LoadReport,
    pub departments: LoadReport,
}

impl DatasetLoadReport {
    pub fn elapsed(&self) -> Duration {
        self.ministries.elapsed + self.departments.elapsed
    }

    pub fn inserted(&self) -> usize {
        self.ministries.inserted + self.departments.inserted
    }
}

/// A chunk failed. Chunks before it stay committed.
#[derive(Debug)]
pub struct LoadError {
    pub kind: EntityKind,
    /// 1-based index of the failing chunk.
    pub chunk: usize,
    pub chunks: usize,
    pub committed_chunks: usize,
    pub committed_records: usize,
    pub source: StoreError,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} load failed at chunk {}/{} ({} chunks, {} records committed): {}",
            self.kind,
            self.chunk,
            self.chunks,
            self.committed_chunks,
            self.committed_records,
            self.source
        )
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub fn chunk_count(records: usize, batch_size: NonZeroUsize) -> usize {
    records.div_ceil(batch_size.get())
}

/// The requested batch size, lowered to what one statement of `kind` can
/// carry on `store`.
pub fn effective_batch_size<S: Store + ?Sized>(
    store: &S,
    kind: EntityKind,
    requested: NonZeroUsize,
) -> NonZeroUsize {
    match store.max_batch_rows(kind).and_then(NonZeroUsize::new) {
        Some(ceiling) if ceiling < requested => {
            debug!(
                entity = %kind,
                requested = requested.get(),
                ceiling = ceiling.get(),
                "batch size clamped to statement ceiling"
            );
            ceiling
        }
        _ => requested,
    }
}

/// Persists `records` in consecutive chunks of at most `batch_size`, one
/// transaction per chunk, stopping at the first failing chunk.
///
/// Chunks never exceed the store's per-statement row ceiling, so any batch
/// size loads every record.
pub fn load_records<S, T>(store: &S, records: &[T], options: &LoadOptions) -> Result<LoadReport, LoadError>
where
    S: Store + ?Sized,
    T: Loadable,
{
    let started = Instant::now();
    let batch_size = effective_batch_size(store, T::KIND, options.batch_size);
    let chunks = chunk_count(records.len(), batch_size);
    let mut inserted = 0;
    let mut committed_records = 0;

    for (idx, chunk) in records.chunks(batch_size.get()).enumerate() {
        if idx > 0 && !options.throttle.is_zero() {
            thread::sleep(options.throttle);
        }
        match T::insert_chunk(store, chunk) {
            Ok(rows) => {
                inserted += rows;
                committed_records += chunk.len();
                debug!(
                    entity = %T::KIND,
                    chunk = idx + 1,
                    chunks,
                    rows,
                    "chunk committed"
                );
            }
            Err(source) => {
                warn!(
                    entity = %T::KIND,
                    chunk = idx + 1,
                    chunks,
                    error = %source,
                    "chunk failed, abandoning remaining chunks"
                );
                return Err(LoadError {
                    kind: T::KIND,
                    chunk: idx + 1,
                    chunks,
                    committed_chunks: idx,
                    committed_records,
                    source,
                });
            }
        }
    }

    let report = LoadReport {
        kind: T::KIND,
        records: records.len(),
        chunks,
        inserted,
        elapsed: started.elapsed(),
    };
    info!(
        entity = %report.kind,
        records = report.records,
        chunks = report.chunks,
        inserted = report.inserted,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "load finished"
    );
    Ok(report)
}

/// Loads every ministry before the first department chunk is attempted.
#[instrument(skip_all, fields(ministries = dataset.ministries.len(), departments = dataset.departments.len()))]
pub fn load_dataset<S: Store + ?Sized>(
    store: &S,
    dataset: &Dataset,
    options: &LoadOptions,
) -> Result<DatasetLoadReport, LoadError> {
    let ministries = load_records(store, &dataset.ministries, options)?;
    let departments = load_records(store, &dataset.departments, options)?;
    Ok(DatasetLoadReport {
        ministries,
        departments,
    })
}
