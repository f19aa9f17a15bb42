//! Synthetic ministry/department datasets.
//!
//! Names are drawn uniformly from fixed vocabularies. Descriptors depend only
//! on entity kind and identifier, so two runs with different name draws still
//! agree on every `map_script`.

use govseed_types::{Dataset, Department, EntityKind, Ministry};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

const DEFAULT_MAX_NAME_ATTEMPTS: usize = 64;

#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub ministry_prefixes: Vec<String>,
    pub ministry_domains: Vec<String>,
    pub department_keywords: Vec<String>,
    pub department_topics: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            ministry_prefixes: owned(&["Ministry of", "Office of", "Department of", "Agency of"]),
            ministry_domains: owned(&[
                "Education",
                "Health",
                "Finance",
                "Technology",
                "Agriculture",
                "Defense",
                "Energy",
                "Environment",
                "Justice",
                "Transport",
                "Tourism",
                "Labor",
                "Foreign Affairs",
                "Science",
                "Culture",
            ]),
            department_keywords: owned(&["Division", "Bureau", "Unit", "Office", "Branch", "Section"]),
            department_topics: owned(&[
                "Archives", "Audit", "Aviation", "Budget", "Census", "Climate", "Coastlines",
                "Compliance", "Customs", "Development", "Fisheries", "Forestry", "Grants",
                "Harbors", "Heritage", "Housing", "Immigration", "Innovation", "Inspection",
                "Licensing", "Logistics", "Maritime", "Mining", "Outreach", "Pensions",
                "Planning", "Procurement", "Railways", "Records", "Research", "Roads",
                "Safety", "Statistics", "Standards", "Taxation", "Telecoms", "Training",
                "Veterans", "Water", "Wildlife",
            ]),
        }
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameSuffix {
    #[default]
    None,
    /// `" - {id}"`.
    Sequence,
    /// `" #NNNN"` with NNNN uniform in 1000..=9999.
    RandomTag,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub vocabulary: Vocabulary,
    pub suffix: NameSuffix,
    pub unique_names: bool,
    pub max_name_attempts: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::default(),
            suffix: NameSuffix::None,
            unique_names: false,
            max_name_attempts: DEFAULT_MAX_NAME_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    EmptyVocabulary(&'static str),
    NamesExhausted { kind: EntityKind, attempts: usize },
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateError::EmptyVocabulary(list) => write!(f, "vocabulary list {} is empty", list),
            GenerateError::NamesExhausted { kind, attempts } => write!(
                f,
                "no unused {} name found after {} attempts",
                kind, attempts
            ),
        }
    }
}

impl std::error::Error for GenerateError {}

/// Seen-name set for one generation call.
#[derive(Debug)]
pub struct UniqueNames {
    seen: HashSet<String>,
    max_attempts: usize,
}

impl UniqueNames {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            seen: HashSet::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Draws until `draw` yields a name not seen before, giving up after the
    /// configured number of attempts.
    pub fn claim<F>(&mut self, kind: EntityKind, mut draw: F) -> Result<String, GenerateError>
    where
        F: FnMut() -> String,
    {
        for _ in 0..self.max_attempts {
            let candidate = draw();
            if self.seen.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(GenerateError::NamesExhausted {
            kind,
            attempts: self.max_attempts,
        })
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

pub fn map_script(kind: EntityKind, id: i64) -> String {
    format!(
        "<iframe src='https://maps.google.com/maps?q={}{}&output=embed'></iframe>",
        kind.label(),
        id
    )
}

#[derive(Debug)]
pub struct DatasetGenerator<R> {
    config: GeneratorConfig,
    rng: R,
}

impl DatasetGenerator<StdRng> {
    pub fn from_entropy(config: GeneratorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn seeded(config: GeneratorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> DatasetGenerator<R> {
    pub fn with_rng(config: GeneratorConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Produces `ministries` ministries with ids `1..=ministries` and
    /// `departments_per_ministry` departments under each, numbered globally
    /// from 1 in ministry order. In unique mode no name repeats anywhere in
    /// the returned dataset.
    pub fn generate(
        &mut self,
        ministries: usize,
        departments_per_ministry: usize,
    ) -> Result<Dataset, GenerateError> {
        if ministries == 0 {
            return Ok(Dataset::default());
        }
        self.check_vocabulary(departments_per_ministry > 0)?;

        let mut names = self.config.unique_names.then(|| UniqueNames::new(self.config.max_name_attempts));
        let mut dataset = Dataset {
            ministries: Vec::with_capacity(ministries),
            departments: Vec::with_capacity(ministries.saturating_mul(departments_per_ministry)),
        };

        let mut department_id: i64 = 1;
        for idx in 0..ministries {
            let ministry_id = idx as i64 + 1;
            let name = self.next_name(EntityKind::Ministry, ministry_id, names.as_mut())?;
            dataset.ministries.push(Ministry {
                id: ministry_id,
                name,
                map_script: map_script(EntityKind::Ministry, ministry_id),
            });

            for _ in 0..departments_per_ministry {
                let name = self.next_name(EntityKind::Department, department_id, names.as_mut())?;
                dataset.departments.push(Department {
                    id: department_id,
                    name,
                    map_script: map_script(EntityKind::Department, department_id),
                    ministry_id,
                });
                department_id += 1;
            }
        }

        debug!(
            ministries = dataset.ministries.len(),
            departments = dataset.departments.len(),
            "dataset generated"
        );
        Ok(dataset)
    }

    fn check_vocabulary(&self, needs_departments: bool) -> Result<(), GenerateError> {
        let vocabulary = &self.config.vocabulary;
        if vocabulary.ministry_prefixes.is_empty() {
            return Err(GenerateError::EmptyVocabulary("ministry_prefixes"));
        }
        if vocabulary.ministry_domains.is_empty() {
            return Err(GenerateError::EmptyVocabulary("ministry_domains"));
        }
        if needs_departments {
            if vocabulary.department_keywords.is_empty() {
                return Err(GenerateError::EmptyVocabulary("department_keywords"));
            }
            if vocabulary.department_topics.is_empty() {
                return Err(GenerateError::EmptyVocabulary("department_topics"));
            }
        }
        Ok(())
    }

    fn next_name(
        &mut self,
        kind: EntityKind,
        id: i64,
        names: Option<&mut UniqueNames>,
    ) -> Result<String, GenerateError> {
        match names {
            Some(names) => names.claim(kind, || self.draw_name(kind, id)),
            None => Ok(self.draw_name(kind, id)),
        }
    }

    fn draw_name(&mut self, kind: EntityKind, id: i64) -> String {
        let vocabulary = &self.config.vocabulary;
        let (head, tail) = match kind {
            EntityKind::Ministry => (
                &vocabulary.ministry_prefixes,
                &vocabulary.ministry_domains,
            ),
            EntityKind::Department => (
                &vocabulary.department_keywords,
                &vocabulary.department_topics,
            ),
        };
        let head = head.choose(&mut self.rng).map(String::as_str).unwrap_or_default();
        let tail = tail.choose(&mut self.rng).map(String::as_str).unwrap_or_default();
        let base = match kind {
            EntityKind::Ministry => format!("{} {}", head, tail),
            EntityKind::Department => format!("{} of {}", head, tail),
        };
        match self.config.suffix {
            NameSuffix::None => base,
            NameSuffix::Sequence => format!("{} - {}", base, id),
            NameSuffix::RandomTag => format!("{} #{}", base, self.rng.gen_range(1000..=9999)),
        }
    }
}
