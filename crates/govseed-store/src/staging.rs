//! Two-file CSV staging format between generation and loading, plus the
//! results series handed to charting.

use govseed_types::{Dataset, Department, Ministry, TrialSample};
use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const MINISTRIES_FILE: &str = "ministries.csv";
pub const DEPARTMENTS_FILE: &str = "departments.csv";

const MINISTRY_HEADER: [&str; 3] = ["id", "name", "google_map_script"];
const DEPARTMENT_HEADER: [&str; 4] = ["id", "name", "google_map_script", "ministry_id"];
const SAMPLE_HEADER: [&str; 5] = [
    "ministries",
    "departments_per_ministry",
    "duration_seconds",
    "outcome",
    "suspect",
];

#[derive(Debug)]
pub enum StagingError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, line: usize, message: String },
    Integrity(String),
}

impl fmt::Display for StagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagingError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            StagingError::Parse {
                path,
                line,
                message,
            } => write!(f, "{}:{}: {}", path.display(), line, message),
            StagingError::Integrity(message) => write!(f, "staged dataset is inconsistent: {}", message),
        }
    }
}

impl std::error::Error for StagingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StagingError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StagingError + '_ {
    move |source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `ministries.csv` and `departments.csv` into `dir`.
pub fn export_dataset(dir: &Path, dataset: &Dataset) -> Result<(PathBuf, PathBuf), StagingError> {
    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let ministries_path = dir.join(MINISTRIES_FILE);
    write_rows(
        &ministries_path,
        &MINISTRY_HEADER,
        dataset.ministries.iter().map(|m| {
            vec![m.id.to_string(), m.name.clone(), m.map_script.clone()]
        }),
    )?;

    let departments_path = dir.join(DEPARTMENTS_FILE);
    write_rows(
        &departments_path,
        &DEPARTMENT_HEADER,
        dataset.departments.iter().map(|d| {
            vec![
                d.id.to_string(),
                d.name.clone(),
                d.map_script.clone(),
                d.ministry_id.to_string(),
            ]
        }),
    )?;

    info!(
        ministries = dataset.ministries.len(),
        departments = dataset.departments.len(),
        dir = %dir.display(),
        "dataset staged"
    );
    Ok((ministries_path, departments_path))
}

/// Reads a dataset staged by [`export_dataset`] and checks that every
/// department points at a staged ministry.
pub fn import_dataset(dir: &Path) -> Result<Dataset, StagingError> {
    let ministries_path = dir.join(MINISTRIES_FILE);
    let ministries = read_rows(&ministries_path, &MINISTRY_HEADER)?
        .into_iter()
        .map(|(line, fields)| {
            Ok(Ministry {
                id: parse_id(&ministries_path, line, &fields[0])?,
                name: fields[1].clone(),
                map_script: fields[2].clone(),
            })
        })
        .collect::<Result<Vec<_>, StagingError>>()?;

    let departments_path = dir.join(DEPARTMENTS_FILE);
    let departments = read_rows(&departments_path, &DEPARTMENT_HEADER)?
        .into_iter()
        .map(|(line, fields)| {
            Ok(Department {
                id: parse_id(&departments_path, line, &fields[0])?,
                name: fields[1].clone(),
                map_script: fields[2].clone(),
                ministry_id: parse_id(&departments_path, line, &fields[3])?,
            })
        })
        .collect::<Result<Vec<_>, StagingError>>()?;

    let dataset = Dataset {
        ministries,
        departments,
    };
    if let Some(orphan) = dataset.orphaned_departments().first() {
        return Err(StagingError::Integrity(format!(
            "department {} references ministry {} which is not staged",
            orphan.id, orphan.ministry_id
        )));
    }
    Ok(dataset)
}

/// Writes the results series with durations rounded to two decimals.
pub fn write_samples_csv(path: &Path, samples: &[TrialSample]) -> Result<(), StagingError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
    }
    write_rows(
        path,
        &SAMPLE_HEADER,
        samples.iter().map(|s| {
            vec![
                s.ministries.to_string(),
                s.departments_per_ministry.to_string(),
                format!("{:.2}", s.duration_secs),
                s.outcome.label().to_string(),
                s.suspect.to_string(),
            ]
        }),
    )
}

fn write_rows<I>(path: &Path, header: &[&str], rows: I) -> Result<(), StagingError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let file = fs::File::create(path).map_err(io_err(path))?;
    let mut out = BufWriter::new(file);
    let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    writeln!(out, "{}", encode_record(&header)).map_err(io_err(path))?;
    for row in rows {
        writeln!(out, "{}", encode_record(&row)).map_err(io_err(path))?;
    }
    out.flush().map_err(io_err(path))?;
    Ok(())
}

fn read_rows(path: &Path, header: &[&str]) -> Result<Vec<(usize, Vec<String>)>, StagingError> {
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    let records = decode_records(&text).map_err(|(line, message)| StagingError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    })?;

    let mut records = records.into_iter();
    match records.next() {
        Some((_, found)) if found.iter().map(String::as_str).eq(header.iter().copied()) => {}
        Some((line, found)) => {
            return Err(StagingError::Parse {
                path: path.to_path_buf(),
                line,
                message: format!("expected header {:?}, found {:?}", header, found),
            });
        }
        None => {
            return Err(StagingError::Parse {
                path: path.to_path_buf(),
                line: 1,
                message: "missing header row".to_string(),
            });
        }
    }

    let mut rows = Vec::new();
    for (line, fields) in records {
        if fields.len() != header.len() {
            return Err(StagingError::Parse {
                path: path.to_path_buf(),
                line,
                message: format!("expected {} fields, found {}", header.len(), fields.len()),
            });
        }
        rows.push((line, fields));
    }
    Ok(rows)
}

fn parse_id(path: &Path, line: usize, field: &str) -> Result<i64, StagingError> {
    field.trim().parse().map_err(|_| StagingError::Parse {
        path: path.to_path_buf(),
        line,
        message: format!("{:?} is not an integer id", field),
    })
}

fn encode_record(fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| encode_field(field))
        .collect::<Vec<_>>()
        .join(",")
}

fn encode_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Splits CSV text into records, tagging each with the line it starts on.
/// Quoted fields may contain commas, doubled quotes and newlines.
fn decode_records(text: &str) -> Result<Vec<(usize, Vec<String>)>, (usize, String)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                if !(fields.len() == 1 && fields[0].is_empty()) {
                    records.push((record_line, std::mem::take(&mut fields)));
                }
                fields.clear();
                line += 1;
                record_line = line;
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err((record_line, "unterminated quoted field".to_string()));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push((record_line, fields));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DatasetGenerator, GeneratorConfig, NameSuffix};
    use govseed_types::TrialOutcome;

    #[test]
    fn staged_dataset_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeneratorConfig {
            suffix: NameSuffix::Sequence,
            ..GeneratorConfig::default()
        };
        let dataset = DatasetGenerator::seeded(config, 21).generate(4, 3).unwrap();

        let (ministries, departments) = export_dataset(&dir.path().join("csv_output"), &dataset).unwrap();
        let header = fs::read_to_string(&departments).unwrap();
        assert!(header.starts_with("id,name,google_map_script,ministry_id\n"));
        assert!(ministries.ends_with(MINISTRIES_FILE));

        let restored = import_dataset(&dir.path().join("csv_output")).unwrap();
        assert_eq!(restored, dataset);
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        let fields = vec![
            "7".to_string(),
            "Office of \"Roads, Rail\"".to_string(),
            "line one\nline two".to_string(),
        ];
        let encoded = encode_record(&fields);
        assert_eq!(
            encoded,
            "7,\"Office of \"\"Roads, Rail\"\"\",\"line one\nline two\""
        );
        let decoded = decode_records(&format!("{}\n", encoded)).unwrap();
        assert_eq!(decoded, vec![(1, fields)]);
    }

    #[test]
    fn import_rejects_orphaned_departments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MINISTRIES_FILE),
            "id,name,google_map_script\n1,Ministry of Health,x\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(DEPARTMENTS_FILE),
            "id,name,google_map_script,ministry_id\n1,Unit of Water,y,1\r\n2,Unit of Roads,z,4\r\n",
        )
        .unwrap();
        let err = import_dataset(dir.path()).unwrap_err();
        assert!(matches!(err, StagingError::Integrity(_)), "{}", err);
    }

    #[test]
    fn import_reports_bad_ids_with_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MINISTRIES_FILE),
            "id,name,google_map_script\n1,Ministry of Health,x\nabc,Office of Energy,y\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(DEPARTMENTS_FILE),
            "id,name,google_map_script,ministry_id\n",
        )
        .unwrap();
        match import_dataset(dir.path()).unwrap_err() {
            StagingError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn import_requires_expected_header() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MINISTRIES_FILE), "id,title\n1,x\n").unwrap();
        let err = import_dataset(dir.path()).unwrap_err();
        assert!(err.to_string().contains("expected header"), "{}", err);
    }

    #[test]
    fn samples_csv_rounds_to_two_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.csv");
        let samples = vec![TrialSample {
            ministries: 10,
            departments_per_ministry: 5,
            ministry_rows: 10,
            department_rows: 50,
            duration_secs: 1.23456,
            outcome: TrialOutcome::Completed,
            suspect: false,
        }];
        write_samples_csv(&path, &samples).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "ministries,departments_per_ministry,duration_seconds,outcome,suspect\n\
             10,5,1.23,completed,false\n"
        );
    }
}
