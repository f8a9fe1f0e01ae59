//! Common types used across CLI modules

use clap::ValueEnum;
use scanward_core::domain::job::ScanType;
use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone)]
pub enum IdOrPrefix {
    /// Full UUID
    Full(Uuid),
    /// Prefix that should uniquely identify a job
    Prefix(String),
}

impl IdOrPrefix {
    /// Attempts to parse as a full UUID first, otherwise treats the input as a prefix
    pub fn parse(input: &str) -> Self {
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.trim().to_lowercase()),
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    /// Whether the given job id starts with this prefix
    pub fn matches(&self, id: Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => *uuid == id,
            IdOrPrefix::Prefix(prefix) => id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

/// Scan type as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScanTypeArg {
    Code,
    Web,
    Infra,
    License,
    Secret,
}

impl From<ScanTypeArg> for ScanType {
    fn from(arg: ScanTypeArg) -> Self {
        match arg {
            ScanTypeArg::Code => ScanType::CodeScan,
            ScanTypeArg::Web => ScanType::WebScan,
            ScanTypeArg::Infra => ScanType::InfraScan,
            ScanTypeArg::License => ScanType::LicenseScan,
            ScanTypeArg::Secret => ScanType::SecretScan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_uuid() {
        let id = Uuid::new_v4();
        let parsed = IdOrPrefix::parse(&id.to_string());

        assert_eq!(parsed.as_uuid(), Some(id));
        assert!(parsed.matches(id));
    }

    #[test]
    fn test_prefix_matching_ignores_case() {
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        let parsed = IdOrPrefix::parse("A1B2");

        assert!(parsed.as_uuid().is_none());
        assert!(parsed.matches(id));
        assert!(!IdOrPrefix::parse("ffff").matches(id));
    }
}
