use chrono::{Datelike, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::{expand_path, BudgetSettings};
use crate::traits::BudgetGuard;

struct Ledger {
    month: u32,
    spent: f64,
}

/// Monthly spend cap. Resets when the calendar month (UTC) changes.
pub struct MonthlyBudget {
    limit: f64,
    ledger: Mutex<Ledger>,
    log_file: Option<PathBuf>,
}

impl MonthlyBudget {
    pub fn new(limit: f64) -> Self {
        Self { limit, ledger: Mutex::new(Ledger { month: current_month(), spent: 0.0 }), log_file: None }
    }

    /// Persist `"<month>:<spent>"` after every approval and resume from it on construction.
    pub fn with_log_file(limit: f64, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut budget = Self::new(limit);
        if let Ok(raw) = std::fs::read_to_string(&path) {
            if let Some((m, s)) = raw.trim().split_once(':') {
                if let (Ok(month), Ok(spent)) = (m.parse::<u32>(), s.parse::<f64>()) {
                    if month == current_month() {
                        budget.ledger = Mutex::new(Ledger { month, spent });
                    }
                }
            }
        }
        budget.log_file = Some(path);
        budget
    }

    pub fn spent(&self) -> f64 { self.ledger.lock().map(|l| l.spent).unwrap_or(0.0) }

    pub fn limit(&self) -> f64 { self.limit }
}

impl BudgetGuard for MonthlyBudget {
    fn approve(&self, estimated_cost: f64) -> bool {
        let Ok(mut ledger) = self.ledger.lock() else { return false };
        let month = current_month();
        if ledger.month != month {
            ledger.month = month;
            ledger.spent = 0.0;
        }
        if ledger.spent + estimated_cost > self.limit {
            warn!(spent = ledger.spent, estimated_cost, limit = self.limit, "budget declined");
            return false;
        }
        ledger.spent += estimated_cost;
        debug!(spent = ledger.spent, limit = self.limit, "budget approved");
        if let Some(path) = &self.log_file {
            if let Err(e) = std::fs::write(path, format!("{}:{}", ledger.month, ledger.spent)) {
                warn!(error = %e, path = %path.display(), "failed to write budget log");
            }
        }
        true
    }
}

/// Guard described by configuration, or `None` when no monthly limit is set.
pub fn budget_from_settings(settings: &BudgetSettings) -> Option<Arc<dyn BudgetGuard>> {
    let limit = settings.monthly_limit_usd?;
    let guard: Arc<dyn BudgetGuard> = match &settings.log_file {
        Some(path) => Arc::new(MonthlyBudget::with_log_file(limit, expand_path(path))),
        None => Arc::new(MonthlyBudget::new(limit)),
    };
    Some(guard)
}

/// `YYYYMM`, so the same month of another year still resets.
fn current_month() -> u32 { let now = Utc::now(); now.year().unsigned_abs() * 100 + now.month() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declined_spend_is_not_recorded() {
        let budget = MonthlyBudget::new(1.0);
        assert!(budget.approve(0.6));
        assert!(!budget.approve(0.6));
        assert!((budget.spent() - 0.6).abs() < 1e-9);
        assert!(budget.approve(0.4));
    }

    #[test]
    fn log_file_resumes_current_month() {
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("budget.log");
        let b = MonthlyBudget::with_log_file(1.0, &path);
        assert!(b.approve(0.75));
        let resumed = MonthlyBudget::with_log_file(1.0, &path);
        assert!((resumed.spent() - 0.75).abs() < 1e-9);
        assert!(!resumed.approve(0.5));
    }
}
