//! Violation severity and budget checks.

use std::fmt;

use serde::Serialize;
use tokio::time::Instant;

use super::table::MetricKey;

/// Upper bound (percent over the ceiling) of a low-severity violation.
pub const LOW_MAX_OVER_PCT: f64 = 120.0;

/// Upper bound (percent over the ceiling) of a medium-severity violation.
pub const MEDIUM_MAX_OVER_PCT: f64 = 150.0;

/// Upper bound (percent over the ceiling) of a high-severity violation.
pub const HIGH_MAX_OVER_PCT: f64 = 200.0;

/// How far a value exceeded its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Classify `value` against `ceiling`. `None` when within budget.
    ///
    /// Bands are on the percentage over the ceiling:
    /// `<=120` low, `<=150` medium, `<=200` high, above that critical.
    pub fn classify(value: f64, ceiling: f64) -> Option<Severity> {
        if value <= ceiling {
            return None;
        }
        if ceiling <= 0.0 {
            return Some(Severity::Critical);
        }
        let over = value * 100.0 / ceiling - 100.0;
        Some(if over <= LOW_MAX_OVER_PCT {
            Severity::Low
        } else if over <= MEDIUM_MAX_OVER_PCT {
            Severity::Medium
        } else if over <= HIGH_MAX_OVER_PCT {
            Severity::High
        } else {
            Severity::Critical
        })
    }

    /// Points subtracted from the score per violation.
    pub fn penalty(&self) -> u32 {
        match self {
            Severity::Low => 5,
            Severity::Medium => 10,
            Severity::High => 15,
            Severity::Critical => 25,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking one value against the active budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetCheck {
    pub within_budget: bool,
    pub severity: Option<Severity>,
    /// `value / ceiling * 100`.
    pub percentage_of_ceiling: f64,
}

impl BudgetCheck {
    /// Check for a metric that has no ceiling in the active table.
    pub fn unbudgeted() -> Self {
        Self {
            within_budget: true,
            severity: None,
            percentage_of_ceiling: 0.0,
        }
    }

    pub fn evaluate(value: f64, ceiling: f64) -> Self {
        let severity = Severity::classify(value, ceiling);
        let percentage_of_ceiling = if ceiling > 0.0 {
            value * 100.0 / ceiling
        } else if value > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        Self {
            within_budget: severity.is_none(),
            severity,
            percentage_of_ceiling,
        }
    }
}

/// A recorded budget violation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub metric: MetricKey,
    pub actual: f64,
    pub ceiling: f64,
    pub severity: Severity,
    pub timestamp: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_budget() {
        assert_eq!(Severity::classify(0.1, 0.1), None);
        assert_eq!(Severity::classify(50.0, 100.0), None);
    }

    #[test]
    fn test_layout_shift_150_percent_over_is_medium() {
        assert_eq!(Severity::classify(0.25, 0.1), Some(Severity::Medium));
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::classify(150.0, 100.0), Some(Severity::Low));
        assert_eq!(Severity::classify(220.0, 100.0), Some(Severity::Low));
        assert_eq!(Severity::classify(221.0, 100.0), Some(Severity::Medium));
        assert_eq!(Severity::classify(250.0, 100.0), Some(Severity::Medium));
        assert_eq!(Severity::classify(251.0, 100.0), Some(Severity::High));
        assert_eq!(Severity::classify(300.0, 100.0), Some(Severity::High));
        assert_eq!(Severity::classify(301.0, 100.0), Some(Severity::Critical));
    }

    #[test]
    fn test_zero_ceiling() {
        assert_eq!(Severity::classify(1.0, 0.0), Some(Severity::Critical));
        assert_eq!(Severity::classify(0.0, 0.0), None);
    }

    #[test]
    fn test_penalties_increase_with_severity() {
        let penalties: Vec<u32> = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical]
            .iter()
            .map(Severity::penalty)
            .collect();
        assert_eq!(penalties, vec![5, 10, 15, 25]);
    }

    #[test]
    fn test_budget_check_percentage() {
        let check = BudgetCheck::evaluate(0.25, 0.1);
        assert!(!check.within_budget);
        assert_eq!(check.severity, Some(Severity::Medium));
        assert!((check.percentage_of_ceiling - 250.0).abs() < 1e-9);

        let ok = BudgetCheck::evaluate(900.0, 1800.0);
        assert!(ok.within_budget);
        assert_eq!(ok.percentage_of_ceiling, 50.0);
    }
}
