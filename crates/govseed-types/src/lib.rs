use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ministry,
    Department,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Ministry => "ministry",
            EntityKind::Department => "department",
        }
    }

    /// Capitalised form used inside generated descriptors.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Ministry => "Ministry",
            EntityKind::Department => "Department",
        }
    }

    pub fn table(&self) -> &'static TableSpec {
        match self {
            EntityKind::Ministry => &MINISTRY_TABLE,
            EntityKind::Department => &DEPARTMENT_TABLE,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

/// Insert contract for one target table: ordered columns plus the key that
/// conflicting rows are skipped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub conflict_key: &'static str,
}

impl TableSpec {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|column| column.name)
    }
}

pub static MINISTRY_TABLE: TableSpec = TableSpec {
    name: "ministry",
    columns: &[
        Column {
            name: "id",
            ty: ColumnType::Integer,
        },
        Column {
            name: "name",
            ty: ColumnType::Text,
        },
        Column {
            name: "google_map_script",
            ty: ColumnType::Text,
        },
    ],
    conflict_key: "id",
};

pub static DEPARTMENT_TABLE: TableSpec = TableSpec {
    name: "department",
    columns: &[
        Column {
            name: "id",
            ty: ColumnType::Integer,
        },
        Column {
            name: "name",
            ty: ColumnType::Text,
        },
        Column {
            name: "google_map_script",
            ty: ColumnType::Text,
        },
        Column {
            name: "ministry_id",
            ty: ColumnType::Integer,
        },
    ],
    conflict_key: "id",
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ministry {
    pub id: i64,
    pub name: String,
    #[serde(rename = "google_map_script")]
    pub map_script: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    #[serde(rename = "google_map_script")]
    pub map_script: String,
    pub ministry_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub ministries: Vec<Ministry>,
    pub departments: Vec<Department>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.ministries.len() + self.departments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ministries.is_empty() && self.departments.is_empty()
    }

    /// Departments whose `ministry_id` names no ministry in this dataset.
    pub fn orphaned_departments(&self) -> Vec<&Department> {
        let ids: HashSet<i64> = self.ministries.iter().map(|m| m.id).collect();
        self.departments
            .iter()
            .filter(|d| !ids.contains(&d.ministry_id))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialConfig {
    pub ministries: usize,
    pub departments_per_ministry: usize,
}

impl TrialConfig {
    pub fn new(ministries: usize, departments_per_ministry: usize) -> Self {
        Self {
            ministries,
            departments_per_ministry,
        }
    }

    pub fn department_total(&self) -> usize {
        self.ministries.saturating_mul(self.departments_per_ministry)
    }
}

impl fmt::Display for TrialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ministries x {} departments",
            self.ministries, self.departments_per_ministry
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    Completed,
    GenerationFailed {
        error: String,
    },
    LoadFailed {
        entity: EntityKind,
        failed_chunk: usize,
        committed_chunks: usize,
        committed_records: usize,
        error: String,
    },
}

impl TrialOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TrialOutcome::Completed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrialOutcome::Completed => "completed",
            TrialOutcome::GenerationFailed { .. } => "generation_failed",
            TrialOutcome::LoadFailed { .. } => "load_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSample {
    pub ministries: usize,
    pub departments_per_ministry: usize,
    #[serde(default)]
    pub ministry_rows: usize,
    #[serde(default)]
    pub department_rows: usize,
    pub duration_secs: f64,
    pub outcome: TrialOutcome,
    /// Set when the store may still hold rows from an earlier trial.
    #[serde(default)]
    pub suspect: bool,
}

impl TrialSample {
    pub fn config(&self) -> TrialConfig {
        TrialConfig::new(self.ministries, self.departments_per_ministry)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEnd {
    Completed,
    Aborted { trial: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub samples: Vec<TrialSample>,
    pub end: SessionEnd,
}

impl BenchmarkReport {
    pub fn completed_samples(&self) -> impl Iterator<Item = &TrialSample> {
        self.samples.iter().filter(|s| s.outcome.is_completed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn orphaned_departments_reports_dangling_references() {
        let dataset = Dataset {
            ministries: vec![Ministry {
                id: 1,
                name: "Ministry of Health".to_string(),
                map_script: String::new(),
            }],
            departments: vec![
                Department {
                    id: 1,
                    name: "Bureau of Records".to_string(),
                    map_script: String::new(),
                    ministry_id: 1,
                },
                Department {
                    id: 2,
                    name: "Unit of Ports".to_string(),
                    map_script: String::new(),
                    ministry_id: 7,
                },
            ],
        };
        let orphans = dataset.orphaned_departments();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, 2);
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = TrialOutcome::LoadFailed {
            entity: EntityKind::Department,
            failed_chunk: 3,
            committed_chunks: 2,
            committed_records: 100,
            error: "boom".to_string(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], json!("load_failed"));
        assert_eq!(value["entity"], json!("department"));
    }

    #[test]
    fn table_specs_list_columns_in_insert_order() {
        let names: Vec<_> = EntityKind::Department.table().column_names().collect();
        assert_eq!(names, vec!["id", "name", "google_map_script", "ministry_id"]);
        assert_eq!(EntityKind::Ministry.table().conflict_key, "id");
    }
}
