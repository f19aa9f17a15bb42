//! Console tables and results files.

use govseed_store::staging::write_samples_csv;
use govseed_store::{DatasetLoadReport, LoadReport, ReportSink};
use govseed_types::{BenchmarkReport, SessionEnd, TrialOutcome};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

pub fn write_load_report<W: Write>(out: &mut W, report: &DatasetLoadReport) -> io::Result<()> {
    writeln!(
        out,
        "{:<12} {:>10} {:>8} {:>10} {:>10}",
        "entity", "records", "chunks", "inserted", "seconds"
    )?;
    for entity in [&report.ministries, &report.departments] {
        write_load_row(out, entity)?;
    }
    writeln!(
        out,
        "total: {} new rows in {:.2}s",
        report.inserted(),
        report.elapsed().as_secs_f64()
    )
}

fn write_load_row<W: Write>(out: &mut W, report: &LoadReport) -> io::Result<()> {
    writeln!(
        out,
        "{:<12} {:>10} {:>8} {:>10} {:>10.2}",
        report.kind.as_str(),
        report.records,
        report.chunks,
        report.inserted,
        report.elapsed.as_secs_f64()
    )
}

pub fn write_bench_report<W: Write>(out: &mut W, report: &BenchmarkReport) -> io::Result<()> {
    writeln!(
        out,
        "{:>6} {:>11} {:>12} {:>10}  {}",
        "trial", "ministries", "departments", "seconds", "outcome"
    )?;
    for (idx, sample) in report.samples.iter().enumerate() {
        let mut outcome = sample.outcome.label().to_string();
        if sample.suspect {
            outcome.push_str(" (suspect)");
        }
        writeln!(
            out,
            "{:>6} {:>11} {:>12} {:>10.2}  {}",
            idx + 1,
            sample.ministries,
            sample.departments_per_ministry,
            sample.duration_secs,
            outcome
        )?;
        match &sample.outcome {
            TrialOutcome::Completed => {}
            TrialOutcome::GenerationFailed { error } => writeln!(out, "       {}", error)?,
            TrialOutcome::LoadFailed {
                entity,
                failed_chunk,
                committed_records,
                error,
                ..
            } => writeln!(
                out,
                "       {} chunk {} failed after {} committed records: {}",
                entity, failed_chunk, committed_records, error
            )?,
        }
    }
    match report.end {
        SessionEnd::Completed => writeln!(out, "{} trials completed", report.completed_samples().count()),
        SessionEnd::Aborted { trial } => writeln!(out, "session aborted at trial {}", trial),
    }
}

/// Writes the finished series to the files the user asked for.
#[derive(Debug, Default)]
pub struct ResultsFiles {
    pub json: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

impl ReportSink for ResultsFiles {
    fn publish(&mut self, report: &BenchmarkReport) -> io::Result<()> {
        if let Some(path) = &self.json {
            let payload = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
            fs::write(path, payload)?;
            info!(path = %path.display(), "results written");
        }
        if let Some(path) = &self.csv {
            write_samples_csv(path, &report.samples).map_err(io::Error::other)?;
            info!(path = %path.display(), "results written");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use govseed_types::{EntityKind, TrialSample};

    fn report() -> BenchmarkReport {
        BenchmarkReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            samples: vec![
                TrialSample {
                    ministries: 10,
                    departments_per_ministry: 5,
                    ministry_rows: 10,
                    department_rows: 50,
                    duration_secs: 0.126,
                    outcome: TrialOutcome::Completed,
                    suspect: false,
                },
                TrialSample {
                    ministries: 100,
                    departments_per_ministry: 5,
                    ministry_rows: 100,
                    department_rows: 200,
                    duration_secs: 1.5,
                    outcome: TrialOutcome::LoadFailed {
                        entity: EntityKind::Department,
                        failed_chunk: 3,
                        committed_chunks: 2,
                        committed_records: 200,
                        error: "storage error: connection reset".to_string(),
                    },
                    suspect: true,
                },
            ],
            end: SessionEnd::Aborted { trial: 2 },
        }
    }

    #[test]
    fn bench_table_lists_every_trial() {
        let mut out = Vec::new();
        write_bench_report(&mut out, &report()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("load_failed (suspect)"), "{}", text);
        assert!(text.contains("department chunk 3 failed after 200 committed records"), "{}", text);
        assert!(text.ends_with("session aborted at trial 2\n"), "{}", text);
    }

    #[test]
    fn results_files_write_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ResultsFiles {
            json: Some(dir.path().join("results.json")),
            csv: Some(dir.path().join("results.csv")),
        };
        let report = report();
        sink.publish(&report).unwrap();

        let json = fs::read_to_string(dir.path().join("results.json")).unwrap();
        let parsed: BenchmarkReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.samples, report.samples);
        assert_eq!(parsed.end, report.end);

        let csv = fs::read_to_string(dir.path().join("results.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[1], "10,5,0.13,completed,false");
        assert_eq!(lines[2], "100,5,1.50,load_failed,true");
    }
}
