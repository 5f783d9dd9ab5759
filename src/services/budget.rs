//! Monthly budget service.

use super::expenses::ExpenseService;
use crate::models::{Row, Value};
use crate::storage::Storage;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Table holding one budget per user.
pub const BUDGETS_TABLE: &str = "budgets";

/// Spending share (percent) at which a budget is flagged.
pub const WARNING_PERCENT: i64 = 80;

/// Width of the rendered progress bar, in cells.
const BAR_WIDTH: i64 = 10;

/// How close spending is to the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    /// Below the warning threshold.
    Ok,
    /// At or above the warning threshold, not over budget.
    Warning,
    /// Spending exceeds the budget.
    Exceeded,
}

impl BudgetLevel {
    /// Classifies `spent` against a positive `budget`.
    #[must_use]
    pub const fn classify(spent: i64, budget: i64) -> Self {
        if spent > budget {
            Self::Exceeded
        } else if spent.saturating_mul(100) >= budget.saturating_mul(WARNING_PERCENT) {
            Self::Warning
        } else {
            Self::Ok
        }
    }

    /// Returns the level as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Exceeded => "exceeded",
        }
    }
}

impl fmt::Display for BudgetLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current month's spending against the budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    /// Monthly budget.
    pub budget: i64,
    /// Spent this month.
    pub spent: i64,
    /// Budget left; negative when exceeded.
    pub remaining: i64,
    /// Share of the budget spent, rounded down.
    pub percent: i64,
    /// Threshold level.
    pub level: BudgetLevel,
}

impl BudgetStatus {
    /// Computes the status for `spent` against `budget`.
    ///
    /// Returns `None` unless `budget` is positive.
    #[must_use]
    pub const fn new(budget: i64, spent: i64) -> Option<Self> {
        if budget <= 0 {
            return None;
        }
        Some(Self {
            budget,
            spent,
            remaining: budget.saturating_sub(spent),
            percent: spent.saturating_mul(100) / budget,
            level: BudgetLevel::classify(spent, budget),
        })
    }

    /// Renders a ten-cell bar such as `[████░░░░░░] 40%`.
    ///
    /// The bar is full from 100 % on; the percentage is printed as is.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn progress_bar(&self) -> String {
        let filled = (self.percent.clamp(0, 100) * BAR_WIDTH / 100) as usize;
        let empty = BAR_WIDTH as usize - filled;
        format!("[{}{}] {}%", "█".repeat(filled), "░".repeat(empty), self.percent)
    }
}

/// Service for monthly budgets.
#[derive(Debug, Clone)]
pub struct BudgetService {
    storage: Storage,
    expenses: ExpenseService,
}

impl BudgetService {
    /// Creates the service, making sure `budgets` and `expenses` exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if a table cannot be created.
    pub fn new(storage: Storage) -> Result<Self> {
        storage.ensure_table(BUDGETS_TABLE)?;
        let expenses = ExpenseService::new(storage.clone())?;
        Ok(Self { storage, expenses })
    }

    /// Sets the monthly budget, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless `amount` is positive, or a
    /// storage error.
    pub fn set_budget(&self, user_id: i64, amount: i64) -> Result<()> {
        if amount <= 0 {
            return Err(Error::InvalidInput(format!(
                "Budget must be positive, got {amount}"
            )));
        }

        let filter = Row::new().with("user_id", user_id);
        let values = Row::new()
            .with("amount", amount)
            .with("updated_at", Value::Timestamp(Utc::now()));

        if !self.storage.update(BUDGETS_TABLE, &filter, &values)? {
            let row: Row = filter
                .iter()
                .chain(values.iter())
                .map(|(column, value)| (column, value.clone()))
                .collect();
            // Lost a race with another insert: overwrite it.
            if !self.storage.insert(BUDGETS_TABLE, &row)? {
                self.storage.update(BUDGETS_TABLE, &filter, &values)?;
            }
        }

        tracing::info!(user_id, amount, "Budget set");
        Ok(())
    }

    /// Returns the user's budget, if one is set.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_budget(&self, user_id: i64) -> Result<Option<i64>> {
        let filter = Row::new().with("user_id", user_id);
        let rows = self.storage.select(BUDGETS_TABLE, Some(&filter), Some(1))?;
        Ok(rows.first().and_then(|row| row.get_i64("amount")))
    }

    /// Returns this month's status, or `None` without a budget.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn budget_status(&self, user_id: i64) -> Result<Option<BudgetStatus>> {
        self.budget_status_at(user_id, Utc::now())
    }

    /// Returns the status for the month containing `now`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn budget_status_at(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<BudgetStatus>> {
        let Some(budget) = self.get_budget(user_id)?.filter(|b| *b > 0) else {
            return Ok(None);
        };

        let spent = self
            .expenses
            .get_monthly_expenses_at(user_id, now)?
            .iter()
            .fold(0_i64, |acc, e| acc.saturating_add(e.amount));
        Ok(BudgetStatus::new(budget, spent))
    }
}
