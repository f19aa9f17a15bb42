//! Benchmark input parsing.

use govseed_types::TrialConfig;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputError {
    pub input: String,
    pub reason: String,
}

impl InputError {
    pub fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value {:?}: {}", self.input, self.reason)
    }
}

impl std::error::Error for InputError {}

/// Parses one count. Negative integers clamp to zero.
pub fn parse_count(input: &str) -> Result<usize, InputError> {
    let trimmed = input.trim();
    let value: i64 = trimmed
        .parse()
        .map_err(|_| InputError::new(trimmed, "expected an integer"))?;
    Ok(usize::try_from(value).unwrap_or(0))
}

/// Parses a comma-separated list of counts, e.g. `"10, 100,1000"`.
pub fn parse_axis(input: &str) -> Result<Vec<usize>, InputError> {
    let values = input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_count)
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Err(InputError::new(input, "expected at least one value"));
    }
    Ok(values)
}

/// Cartesian product of both axes, ministry counts outermost.
pub fn cartesian(ministries: &[usize], departments_per_ministry: &[usize]) -> Vec<TrialConfig> {
    ministries
        .iter()
        .flat_map(|&m| {
            departments_per_ministry
                .iter()
                .map(move |&d| TrialConfig::new(m, d))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accept_integers_and_clamp_negatives() {
        assert_eq!(parse_count(" 42 ").unwrap(), 42);
        assert_eq!(parse_count("0").unwrap(), 0);
        assert_eq!(parse_count("-5").unwrap(), 0);
    }

    #[test]
    fn non_numeric_count_is_rejected() {
        let err = parse_count("ten").unwrap_err();
        assert_eq!(err.input, "ten");
        assert_eq!(err.to_string(), "invalid value \"ten\": expected an integer");
        assert!(parse_count("1.5").is_err());
    }

    #[test]
    fn axis_splits_on_commas() {
        assert_eq!(parse_axis("10, 100,1000").unwrap(), vec![10, 100, 1000]);
        assert_eq!(parse_axis("5,").unwrap(), vec![5]);
        assert!(parse_axis(" , ").is_err());
        assert!(parse_axis("1,x").is_err());
    }

    #[test]
    fn cartesian_is_row_major() {
        let trials = cartesian(&[1, 2], &[10, 20, 30]);
        let pairs: Vec<(usize, usize)> = trials
            .iter()
            .map(|t| (t.ministries, t.departments_per_ministry))
            .collect();
        assert_eq!(pairs, vec![(1, 10), (1, 20), (1, 30), (2, 10), (2, 20), (2, 30)]);
        assert!(cartesian(&[], &[1]).is_empty());
    }
}
