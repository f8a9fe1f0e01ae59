//! Result Aggregator
//!
//! Merges the imported results of all executors of a job into one
//! [`ScanResult`]. Findings are concatenated in executor order and tagged
//! with their origin; nothing is deduplicated across executors.

use scanward_core::domain::executor::ResultFormat;
use scanward_core::domain::finding::{Finding, FindingOrigin, ScanResult};
use scanward_core::domain::message::JobMessage;
use scanward_core::sequence::SequenceGenerator;
use tracing::warn;
use uuid::Uuid;

use crate::service::importer;

/// Raw result of one executor
#[derive(Debug, Clone)]
pub struct ExecutorOutput {
    pub executor_id: Uuid,
    pub executor_name: String,
    pub format: ResultFormat,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    /// At least one executor produced a usable result
    Success {
        result: ScanResult,
        /// One warning per executor whose result was unusable
        warnings: Vec<JobMessage>,
    },
    /// No executor produced a usable result
    TotalFailure { errors: Vec<String> },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, outputs: Vec<ExecutorOutput>) -> AggregationOutcome {
        if outputs.is_empty() {
            return AggregationOutcome::TotalFailure {
                errors: vec!["No executor delivered a result".to_string()],
            };
        }

        let ids = SequenceGenerator::new();
        let mut result = ScanResult::default();
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for output in outputs {
            match importer::import(output.format, &output.raw) {
                Ok(imported) => {
                    let origin = FindingOrigin {
                        executor_id: output.executor_id,
                        executor_name: output.executor_name.clone(),
                    };
                    result.findings.extend(imported.into_iter().map(|finding| Finding {
                        id: ids.next_value(),
                        name: finding.name,
                        severity: finding.severity,
                        description: finding.description,
                        location: finding.location,
                        cwe_id: finding.cwe_id,
                        origin: origin.clone(),
                    }));
                    result.imported_executors += 1;
                }
                Err(err) => {
                    let text = format!(
                        "Result of executor '{}' could not be imported: {}",
                        output.executor_name, err
                    );
                    warn!(executor_id = %output.executor_id, error = %err, "Result import failed");
                    warnings.push(JobMessage::warning(text.clone()));
                    errors.push(text);
                }
            }
        }

        if result.imported_executors == 0 {
            return AggregationOutcome::TotalFailure { errors };
        }

        AggregationOutcome::Success { result, warnings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanward_core::domain::finding::Severity;

    fn output(name: &str, format: ResultFormat, raw: &str) -> ExecutorOutput {
        ExecutorOutput {
            executor_id: Uuid::new_v4(),
            executor_name: name.to_string(),
            format,
            raw: raw.to_string(),
        }
    }

    #[test]
    fn test_findings_are_concatenated_and_numbered() {
        let outcome = ResultAggregator::new().aggregate(vec![
            output("kv", ResultFormat::KeyValue, "name=a\nseverity=high\n\nname=b\n"),
            output(
                "json",
                ResultFormat::JsonFindings,
                r#"[{"name":"a","severity":"critical"}]"#,
            ),
        ]);

        let AggregationOutcome::Success { result, warnings } = outcome else {
            panic!("expected success");
        };
        assert!(warnings.is_empty());
        assert_eq!(result.imported_executors, 2);
        let ids: Vec<u64> = result.findings.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        // same name from two executors stays two findings
        assert_eq!(result.findings[2].origin.executor_name, "json");
        assert_eq!(result.highest_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_partial_failure_becomes_warning() {
        let outcome = ResultAggregator::new().aggregate(vec![
            output("broken", ResultFormat::Sarif, "<xml/>"),
            output("kv", ResultFormat::KeyValue, "name=a\n"),
        ]);

        let AggregationOutcome::Success { result, warnings } = outcome else {
            panic!("expected success");
        };
        assert_eq!(result.findings.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].text.contains("broken"));
    }

    #[test]
    fn test_all_failing_is_total_failure() {
        let outcome = ResultAggregator::new().aggregate(vec![
            output("a", ResultFormat::Sarif, "nope"),
            output("b", ResultFormat::JsonFindings, "{}"),
        ]);
        assert!(matches!(outcome, AggregationOutcome::TotalFailure { errors } if errors.len() == 2));
        assert!(matches!(
            ResultAggregator::new().aggregate(Vec::new()),
            AggregationOutcome::TotalFailure { .. }
        ));
    }
}
