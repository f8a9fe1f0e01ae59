//! Auto cleanup age calculation
//!
//! Old finished jobs are removed by the scheduler's cleanup service. The
//! retention is configured as an amount and a time unit.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Retention used when nothing is configured
pub const DEFAULT_CLEANUP_DAYS: u64 = 90;

/// Retention configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub amount: u64,
    pub unit: CleanupUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl CleanupUnit {
    pub const fn days(self) -> u64 {
        match self {
            CleanupUnit::Days => 1,
            CleanupUnit::Weeks => 7,
            CleanupUnit::Months => 30,
            CleanupUnit::Years => 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown cleanup time unit: {0}")]
pub struct UnknownCleanupUnit(pub String);

impl FromStr for CleanupUnit {
    type Err = UnknownCleanupUnit;

    /// Accepts singular and plural names in any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "days" => Ok(CleanupUnit::Days),
            "week" | "weeks" => Ok(CleanupUnit::Weeks),
            "month" | "months" => Ok(CleanupUnit::Months),
            "year" | "years" => Ok(CleanupUnit::Years),
            _ => Err(UnknownCleanupUnit(s.to_string())),
        }
    }
}

impl CleanupConfig {
    pub fn new(amount: u64, unit: &str) -> Result<Self, UnknownCleanupUnit> {
        Ok(Self {
            amount,
            unit: unit.parse()?,
        })
    }
}

/// Converts the configured retention into days
///
/// A missing configuration falls back to [`DEFAULT_CLEANUP_DAYS`]. Zero means
/// auto cleanup is turned off.
pub fn calculate_cleanup_time_in_days(config: Option<&CleanupConfig>) -> u64 {
    match config {
        Some(config) => config.amount.saturating_mul(config.unit.days()),
        None => DEFAULT_CLEANUP_DAYS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(amount: u64, unit: &str) -> u64 {
        let config = CleanupConfig::new(amount, unit).unwrap();
        calculate_cleanup_time_in_days(Some(&config))
    }

    #[test]
    fn test_five_weeks_are_35_days() {
        assert_eq!(days(5, "weeks"), 35);
    }

    #[test]
    fn test_twenty_days() {
        assert_eq!(days(20, "days"), 20);
    }

    #[test]
    fn test_months_singular_and_plural() {
        assert_eq!(days(1, "month"), 30);
        assert_eq!(days(2, "months"), 60);
    }

    #[test]
    fn test_years() {
        assert_eq!(days(1, "YEAR"), 365);
    }

    #[test]
    fn test_missing_config_uses_default() {
        assert_eq!(calculate_cleanup_time_in_days(None), 90);
    }

    #[test]
    fn test_zero_days_stays_zero() {
        assert_eq!(days(0, "days"), 0);
    }

    #[test]
    fn test_unknown_unit_is_rejected() {
        assert!(CleanupConfig::new(3, "fortnights").is_err());
    }
}
