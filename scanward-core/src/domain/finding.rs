//! Finding and severity domain types
//!
//! Every executor result is normalized into this model before aggregation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parses a severity name leniently
    ///
    /// Matching ignores case and surrounding whitespace, so `HIGH`, `high` and
    /// `High` are all accepted. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Severity> {
        let name = name.trim();
        [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ]
        .into_iter()
        .find(|severity| severity.as_str().eq_ignore_ascii_case(name))
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executor a finding came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingOrigin {
    pub executor_id: Uuid,
    pub executor_name: String,
}

/// A single normalized finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Position inside the aggregated result, starting at 1
    pub id: u64,
    pub name: String,
    /// `None` when the importer saw a severity it does not know
    pub severity: Option<Severity>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub cwe_id: Option<u32>,
    pub origin: FindingOrigin,
}

/// Aggregated scan result of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub findings: Vec<Finding>,
    /// Number of executors whose results were imported
    pub imported_executors: usize,
}

impl ScanResult {
    /// Counts findings with the given severity
    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.severity == Some(severity))
            .count()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings.iter().filter_map(|f| f.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parsing_ignores_case() {
        assert_eq!(Severity::from_name("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::from_name("critical"), Some(Severity::Critical));
        assert_eq!(Severity::from_name("Critical"), Some(Severity::Critical));
        assert_eq!(Severity::from_name("High"), Some(Severity::High));
        assert_eq!(Severity::from_name("mEdIuM"), Some(Severity::Medium));
        assert_eq!(Severity::from_name(" low "), Some(Severity::Low));
        assert_eq!(Severity::from_name("Info"), Some(Severity::Info));
    }

    #[test]
    fn test_unknown_severity_is_none() {
        assert_eq!(Severity::from_name("blocker"), None);
        assert_eq!(Severity::from_name(""), None);
        assert_eq!(Severity::from_name("HIGHEST"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_highest_severity_ignores_unknown() {
        let origin = FindingOrigin {
            executor_id: Uuid::new_v4(),
            executor_name: "x".to_string(),
        };
        let finding = |id, severity| Finding {
            id,
            name: "f".to_string(),
            severity,
            description: None,
            location: None,
            cwe_id: None,
            origin: origin.clone(),
        };
        let result = ScanResult {
            findings: vec![
                finding(1, None),
                finding(2, Some(Severity::Medium)),
                finding(3, Some(Severity::Low)),
            ],
            imported_executors: 1,
        };

        assert_eq!(result.highest_severity(), Some(Severity::Medium));
        assert_eq!(result.count(Severity::Low), 1);
    }
}
