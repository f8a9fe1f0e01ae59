//! Result importers
//!
//! Normalize the raw result of one executor into findings. Which importer
//! runs is decided by the executor's [`ResultFormat`].

use scanward_core::domain::executor::ResultFormat;
use scanward_core::domain::finding::Severity;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Result is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported result structure: {0}")]
    Structure(String),

    #[error("Line {line}: {reason}")]
    Line { line: usize, reason: String },
}

/// Finding as produced by an importer, before aggregation numbers it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedFinding {
    pub name: String,
    pub severity: Option<Severity>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub cwe_id: Option<u32>,
}

pub fn import(format: ResultFormat, raw: &str) -> Result<Vec<ImportedFinding>, ImportError> {
    match format {
        ResultFormat::Sarif => import_sarif(raw),
        ResultFormat::KeyValue => import_key_value(raw),
        ResultFormat::JsonFindings => import_json_findings(raw),
    }
}

// =============================================================================
// SARIF
// =============================================================================

fn import_sarif(raw: &str) -> Result<Vec<ImportedFinding>, ImportError> {
    let document: Value = serde_json::from_str(raw)?;
    let runs = document
        .get("runs")
        .and_then(Value::as_array)
        .ok_or_else(|| ImportError::Structure("SARIF document has no runs".to_string()))?;

    let mut findings = Vec::new();
    for run in runs {
        let Some(results) = run.get("results").and_then(Value::as_array) else {
            continue;
        };
        for result in results {
            findings.push(sarif_finding(result)?);
        }
    }

    Ok(findings)
}

fn sarif_finding(result: &Value) -> Result<ImportedFinding, ImportError> {
    let message = result
        .pointer("/message/text")
        .and_then(Value::as_str)
        .map(str::to_string);

    let name = result
        .get("ruleId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| message.clone())
        .ok_or_else(|| ImportError::Structure("SARIF result without ruleId or message".to_string()))?;

    let properties = result.get("properties");
    let severity = match properties.and_then(|p| p.get("severity")).and_then(Value::as_str) {
        Some(name) => Severity::from_name(name),
        None => sarif_level(result.get("level").and_then(Value::as_str).unwrap_or("warning")),
    };

    let location = result
        .pointer("/locations/0/physicalLocation")
        .and_then(|physical| {
            let uri = physical
                .pointer("/artifactLocation/uri")
                .and_then(Value::as_str)?;
            Some(match physical.pointer("/region/startLine").and_then(Value::as_u64) {
                Some(line) => format!("{uri}:{line}"),
                None => uri.to_string(),
            })
        });

    let cwe_id = properties
        .and_then(|p| p.get("cwe").or_else(|| p.get("cweId")))
        .and_then(parse_cwe);

    Ok(ImportedFinding {
        name,
        severity,
        description: message,
        location,
        cwe_id,
    })
}

fn sarif_level(level: &str) -> Option<Severity> {
    match level {
        "error" => Some(Severity::High),
        "warning" => Some(Severity::Medium),
        "note" => Some(Severity::Low),
        "none" => Some(Severity::Info),
        _ => None,
    }
}

// =============================================================================
// key=value text
// =============================================================================

/// Blocks of `key=value` lines separated by blank lines, one block per finding
fn import_key_value(raw: &str) -> Result<Vec<ImportedFinding>, ImportError> {
    let mut findings = Vec::new();
    let mut current: Option<(usize, ImportedFinding)> = None;

    for (index, line) in raw.lines().enumerate() {
        let line_number = index + 1;
        let line = line.trim();

        if line.is_empty() {
            if let Some((start, finding)) = current.take() {
                findings.push(finish_block(start, finding)?);
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| ImportError::Line {
            line: line_number,
            reason: "expected key=value".to_string(),
        })?;
        let (key, value) = (key.trim(), value.trim().to_string());

        let (_, finding) = current.get_or_insert_with(|| (line_number, ImportedFinding::default()));
        match key.to_ascii_lowercase().as_str() {
            "name" => finding.name = value,
            "severity" => finding.severity = Severity::from_name(&value),
            "description" => finding.description = Some(value),
            "location" => finding.location = Some(value),
            "cwe" | "cweid" => finding.cwe_id = parse_cwe(&Value::String(value)),
            // unknown keys are vendor extras
            _ => {}
        }
    }

    if let Some((start, finding)) = current.take() {
        findings.push(finish_block(start, finding)?);
    }

    Ok(findings)
}

fn finish_block(start: usize, finding: ImportedFinding) -> Result<ImportedFinding, ImportError> {
    if finding.name.is_empty() {
        return Err(ImportError::Line {
            line: start,
            reason: "finding without name".to_string(),
        });
    }
    Ok(finding)
}

// =============================================================================
// JSON findings array
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonFinding {
    name: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    cwe_id: Option<u32>,
}

fn import_json_findings(raw: &str) -> Result<Vec<ImportedFinding>, ImportError> {
    let findings: Vec<JsonFinding> = serde_json::from_str(raw)?;

    Ok(findings
        .into_iter()
        .map(|finding| ImportedFinding {
            name: finding.name,
            severity: finding.severity.as_deref().and_then(Severity::from_name),
            description: finding.description,
            location: finding.location,
            cwe_id: finding.cwe_id,
        })
        .collect())
}

/// Accepts `79`, `"79"` and `"CWE-79"`
fn parse_cwe(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => {
            let text = text.trim();
            let digits = text
                .strip_prefix("CWE-")
                .or_else(|| text.strip_prefix("cwe-"))
                .unwrap_or(text);
            digits.parse().ok()
        }
        _ => None,
    }
}
