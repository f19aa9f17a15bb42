//! Repeated generate -> load -> measure -> reset trials.

use chrono::Utc;
use govseed_types::{
    BenchmarkReport, EntityKind, SessionEnd, TrialConfig, TrialOutcome, TrialSample,
};
use rand::Rng;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::generator::DatasetGenerator;
use crate::loader::{LoadOptions, load_dataset};
use crate::matrix::{InputError, cartesian, parse_axis};
use crate::Store;

/// Supplies trial configurations one at a time.
///
/// `None` ends the session, whether the matrix ran out or the caller asked to
/// stop. An `Err` is malformed input: the driver logs it and asks again.
pub trait TrialSource {
    fn next_trial(
        &mut self,
        previous: Option<&TrialSample>,
    ) -> Option<Result<TrialConfig, InputError>>;
}

/// Receives the finished series, e.g. to chart it.
pub trait ReportSink {
    fn publish(&mut self, report: &BenchmarkReport) -> io::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MatrixSource {
    trials: VecDeque<TrialConfig>,
}

impl MatrixSource {
    pub fn new(trials: Vec<TrialConfig>) -> Self {
        Self {
            trials: trials.into(),
        }
    }

    pub fn from_axes(ministries: &[usize], departments_per_ministry: &[usize]) -> Self {
        Self::new(cartesian(ministries, departments_per_ministry))
    }

    /// Builds the matrix from two comma-separated lists.
    pub fn parse(ministries: &str, departments_per_ministry: &str) -> Result<Self, InputError> {
        Ok(Self::from_axes(
            &parse_axis(ministries)?,
            &parse_axis(departments_per_ministry)?,
        ))
    }

    pub fn remaining(&self) -> usize {
        self.trials.len()
    }
}

impl TrialSource for MatrixSource {
    fn next_trial(
        &mut self,
        _previous: Option<&TrialSample>,
    ) -> Option<Result<TrialConfig, InputError>> {
        self.trials.pop_front().map(Ok)
    }
}

/// The sink rejected a finished report. The report is kept so its samples
/// can still be shown.
#[derive(Debug)]
pub struct PublishError {
    pub report: BenchmarkReport,
    pub source: io::Error,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "publishing {} samples failed: {}",
            self.report.samples.len(),
            self.source
        )
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuring,
    Generating,
    Loading,
    Measuring,
    Resetting,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct BenchOptions {
    pub load: LoadOptions,
    /// Reset the store after every trial so the next one starts empty.
    pub reset_between_trials: bool,
    pub reset_before_start: bool,
}

/// Owns everything one benchmark session needs: the store handle, the
/// generator and the options. Samples live here until the report is built.
pub struct BenchSession<'a, S: ?Sized, R> {
    store: &'a S,
    generator: DatasetGenerator<R>,
    options: BenchOptions,
    phase: Phase,
    samples: Vec<TrialSample>,
    // Set by a failed reset, cleared by the next successful one.
    tainted: bool,
}

impl<'a, S, R> BenchSession<'a, S, R>
where
    S: Store + ?Sized,
    R: Rng,
{
    pub fn new(store: &'a S, generator: DatasetGenerator<R>, options: BenchOptions) -> Self {
        Self {
            store,
            generator,
            options,
            phase: Phase::Configuring,
            samples: Vec::new(),
            tainted: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn options(&self) -> &BenchOptions {
        &self.options
    }

    #[instrument(skip_all, fields(reset = self.options.reset_between_trials))]
    pub fn run<T: TrialSource + ?Sized>(&mut self, source: &mut T) -> BenchmarkReport {
        let started_at = Utc::now();
        self.samples.clear();
        self.tainted = false;

        if self.options.reset_before_start {
            self.reset_store();
        }

        let mut end = SessionEnd::Completed;
        loop {
            self.enter(Phase::Configuring);
            let config = match source.next_trial(self.samples.last()) {
                None => break,
                Some(Err(err)) => {
                    warn!(error = %err, "rejected trial configuration");
                    continue;
                }
                Some(Ok(config)) => config,
            };

            let trial = self.samples.len() + 1;
            let sample = self.run_trial(trial, config);
            let aborted = matches!(sample.outcome, TrialOutcome::LoadFailed { .. });

            self.enter(Phase::Measuring);
            info!(
                trial,
                ministries = sample.ministries,
                departments_per_ministry = sample.departments_per_ministry,
                duration_secs = sample.duration_secs,
                outcome = sample.outcome.label(),
                suspect = sample.suspect,
                "trial measured"
            );
            self.samples.push(sample);

            if aborted {
                end = SessionEnd::Aborted { trial };
                break;
            }
            if self.options.reset_between_trials {
                self.reset_store();
            }
        }

        self.enter(Phase::Done);
        BenchmarkReport {
            started_at,
            finished_at: Utc::now(),
            samples: std::mem::take(&mut self.samples),
            end,
        }
    }

    /// Runs the session and hands the report to `sink`. A failing sink still
    /// gives the report back inside the error.
    pub fn run_and_publish<T, P>(
        &mut self,
        source: &mut T,
        sink: &mut P,
    ) -> Result<BenchmarkReport, PublishError>
    where
        T: TrialSource + ?Sized,
        P: ReportSink + ?Sized,
    {
        let report = self.run(source);
        match sink.publish(&report) {
            Ok(()) => Ok(report),
            Err(source) => {
                warn!(error = %source, samples = report.samples.len(), "publishing results failed");
                Err(PublishError { report, source })
            }
        }
    }

    fn run_trial(&mut self, trial: usize, config: TrialConfig) -> TrialSample {
        let mut sample = TrialSample {
            ministries: config.ministries,
            departments_per_ministry: config.departments_per_ministry,
            ministry_rows: 0,
            department_rows: 0,
            duration_secs: 0.0,
            outcome: TrialOutcome::Completed,
            suspect: self.tainted,
        };

        self.enter(Phase::Generating);
        let dataset = match self
            .generator
            .generate(config.ministries, config.departments_per_ministry)
        {
            Ok(dataset) => dataset,
            Err(err) => {
                warn!(trial, %config, error = %err, "dataset generation failed");
                sample.outcome = TrialOutcome::GenerationFailed {
                    error: err.to_string(),
                };
                return sample;
            }
        };

        self.enter(Phase::Loading);
        let started = Instant::now();
        let result = load_dataset(self.store, &dataset, &self.options.load);
        sample.duration_secs = started.elapsed().as_secs_f64();

        match result {
            Ok(report) => {
                sample.ministry_rows = report.ministries.records;
                sample.department_rows = report.departments.records;
            }
            Err(err) => {
                warn!(trial, %config, error = %err, "trial load failed, ending session");
                match err.kind {
                    EntityKind::Ministry => sample.ministry_rows = err.committed_records,
                    EntityKind::Department => {
                        sample.ministry_rows = dataset.ministries.len();
                        sample.department_rows = err.committed_records;
                    }
                }
                sample.outcome = TrialOutcome::LoadFailed {
                    entity: err.kind,
                    failed_chunk: err.chunk,
                    committed_chunks: err.committed_chunks,
                    committed_records: err.committed_records,
                    error: err.source.to_string(),
                };
            }
        }
        sample
    }

    fn reset_store(&mut self) {
        self.enter(Phase::Resetting);
        match self.store.reset() {
            Ok(()) => {
                if self.tainted {
                    info!("store reset succeeded, samples are clean again");
                }
                self.tainted = false;
            }
            Err(err) => {
                warn!(error = %err, "store reset failed, later samples are marked suspect");
                self.tainted = true;
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "phase transition");
            self.phase = phase;
        }
    }
}
