//! Failure budget checked once between the initial pass and the retry pass.
//!
//! If too large a share of the scheduled entries failed, retrying them is not
//! expected to help (origin down, disk full) and the job is aborted instead.

use crate::config::DEFAULT_MAX_RETRY_PERCENT;

/// Verdict of the budget gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetVerdict {
    /// Retry the queued entries. `ratio` is the failed percentage (0 when nothing failed).
    Proceed { ratio: f64 },
    /// Too many failures; the retry pass must not run.
    Exceeded { ratio: f64 },
}

/// Ceiling on `failed / scheduled * 100` after the initial pass.
#[derive(Debug, Clone, Copy)]
pub struct BudgetGate {
    max_retry_percent: f64,
}

impl Default for BudgetGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY_PERCENT)
    }
}

impl BudgetGate {
    pub fn new(max_retry_percent: f64) -> Self {
        Self {
            max_retry_percent: max_retry_percent.max(0.0),
        }
    }

    pub fn max_retry_percent(&self) -> f64 {
        self.max_retry_percent
    }

    /// Percentage of scheduled entries waiting for a retry. None when nothing was scheduled.
    pub fn retry_ratio(scheduled: u64, queued: usize) -> Option<f64> {
        if scheduled == 0 {
            return None;
        }
        Some(queued as f64 / scheduled as f64 * 100.0)
    }

    /// Pure check; exceeding means strictly greater than the ceiling.
    pub fn check(&self, scheduled: u64, queued: usize) -> BudgetVerdict {
        if queued == 0 {
            return BudgetVerdict::Proceed { ratio: 0.0 };
        }
        match Self::retry_ratio(scheduled, queued) {
            None => BudgetVerdict::Proceed { ratio: 0.0 },
            Some(ratio) if ratio > self.max_retry_percent => BudgetVerdict::Exceeded { ratio },
            Some(ratio) => BudgetVerdict::Proceed { ratio },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_scheduled_proceeds() {
        let gate = BudgetGate::default();
        assert_eq!(gate.check(0, 0), BudgetVerdict::Proceed { ratio: 0.0 });
        assert_eq!(gate.check(0, 3), BudgetVerdict::Proceed { ratio: 0.0 });
        assert_eq!(BudgetGate::retry_ratio(0, 3), None);
    }

    #[test]
    fn forty_percent_exceeds_default_ceiling() {
        let gate = BudgetGate::default();
        assert!(matches!(
            gate.check(10, 4),
            BudgetVerdict::Exceeded { ratio } if (ratio - 40.0).abs() < 1e-9
        ));
    }

    #[test]
    fn exactly_at_ceiling_proceeds() {
        let gate = BudgetGate::new(25.0);
        assert!(matches!(
            gate.check(8, 2),
            BudgetVerdict::Proceed { ratio } if (ratio - 25.0).abs() < 1e-9
        ));
        assert!(matches!(gate.check(8, 3), BudgetVerdict::Exceeded { .. }));
    }

    #[test]
    fn zero_ceiling_rejects_any_failure() {
        let gate = BudgetGate::new(0.0);
        assert_eq!(gate.check(100, 0), BudgetVerdict::Proceed { ratio: 0.0 });
        assert!(matches!(gate.check(100, 1), BudgetVerdict::Exceeded { .. }));
    }
}
