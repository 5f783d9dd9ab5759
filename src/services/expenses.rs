//! Expense recording and reporting service.
//!
//! Reads go through equality filters only, so date ranges and substring
//! matches are applied in memory after selecting a user's rows.

use crate::models::{Expense, Row};
use crate::storage::Storage;
use crate::{Error, Result};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::collections::BTreeMap;

/// Table holding expense records.
pub const EXPENSES_TABLE: &str = "expenses";

/// Default row limit for [`ExpenseService::get_expenses`].
pub const DEFAULT_LIMIT: usize = 100;

/// Service for recording and summarising expenses.
#[derive(Debug, Clone)]
pub struct ExpenseService {
    /// Backend-agnostic storage.
    storage: Storage,
}

/// Returns the first instant of `now`'s month, in UTC.
#[must_use]
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

impl ExpenseService {
    /// Creates the service, making sure the `expenses` table exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the table cannot be created.
    pub fn new(storage: Storage) -> Result<Self> {
        storage.ensure_table(EXPENSES_TABLE)?;
        Ok(Self { storage })
    }

    /// Saves an expense.
    ///
    /// Returns `false` if the user already has an expense with the same
    /// `created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty item, or a storage error.
    pub fn save_expense(&self, expense: &Expense) -> Result<bool> {
        if expense.item.trim().is_empty() {
            return Err(Error::InvalidInput("Expense item cannot be empty".to_string()));
        }

        let saved = self.storage.insert(EXPENSES_TABLE, &expense.to_row())?;
        tracing::debug!(
            user_id = expense.user_id,
            amount = expense.amount,
            category = %expense.category,
            saved,
            "Saved expense"
        );
        Ok(saved)
    }

    /// Returns up to `limit` expenses of a user in recording order.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_expenses(&self, user_id: i64, limit: Option<usize>) -> Result<Vec<Expense>> {
        self.load(user_id, Some(limit.unwrap_or(DEFAULT_LIMIT)))
    }

    /// Returns the user's expenses for the current month.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_monthly_expenses(&self, user_id: i64) -> Result<Vec<Expense>> {
        self.get_monthly_expenses_at(user_id, Utc::now())
    }

    /// Returns the user's expenses for the month containing `now`.
    ///
    /// Expenses recorded after `now` in the same month are included.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_monthly_expenses_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Expense>> {
        let start = month_start(now);
        let mut expenses = self.load(user_id, None)?;
        expenses.retain(|e| e.created_at >= start);
        Ok(expenses)
    }

    /// Returns this month's expenses in `category`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_by_category(&self, user_id: i64, category: &str) -> Result<Vec<Expense>> {
        let mut expenses = self.get_monthly_expenses(user_id)?;
        expenses.retain(|e| e.category == category);
        Ok(expenses)
    }

    /// Sums this month's expenses whose item contains `item`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_item_total(&self, user_id: i64, item: &str) -> Result<i64> {
        let needle = item.to_lowercase();
        Ok(self
            .get_monthly_expenses(user_id)?
            .iter()
            .filter(|e| e.item.to_lowercase().contains(&needle))
            .fold(0_i64, |acc, e| acc.saturating_add(e.amount)))
    }

    /// Returns this month's totals per category.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_category_totals(&self, user_id: i64) -> Result<BTreeMap<String, i64>> {
        Ok(category_totals(&self.get_monthly_expenses(user_id)?))
    }

    /// Returns this month's total.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_total(&self, user_id: i64) -> Result<i64> {
        Ok(self
            .get_monthly_expenses(user_id)?
            .iter()
            .fold(0_i64, |acc, e| acc.saturating_add(e.amount)))
    }

    /// Returns this month's `limit` largest categories.
    ///
    /// Sorted by total descending; equal totals are ordered by name.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_top_categories(&self, user_id: i64, limit: usize) -> Result<Vec<(String, i64)>> {
        Ok(top_categories(
            &self.get_monthly_expenses(user_id)?,
            limit,
        ))
    }

    /// Deletes the expense recorded at `created_at`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn delete_expense(&self, user_id: i64, created_at: &str) -> Result<bool> {
        let deleted = self
            .storage
            .delete(EXPENSES_TABLE, &primary_key(user_id, created_at))?;
        tracing::debug!(user_id, created_at, deleted, "Deleted expense");
        Ok(deleted)
    }

    /// Moves the expense recorded at `created_at` to another category.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty category, or a storage
    /// error.
    pub fn update_expense_category(
        &self,
        user_id: i64,
        created_at: &str,
        category: &str,
    ) -> Result<bool> {
        if category.trim().is_empty() {
            return Err(Error::InvalidInput("Category cannot be empty".to_string()));
        }

        self.storage.update(
            EXPENSES_TABLE,
            &primary_key(user_id, created_at),
            &Row::new().with("category", category),
        )
    }

    /// Returns the most recently recorded expense.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn get_last_expense(&self, user_id: i64) -> Result<Option<Expense>> {
        Ok(self
            .load(user_id, None)?
            .into_iter()
            .max_by_key(|e| e.created_at))
    }

    fn load(&self, user_id: i64, limit: Option<usize>) -> Result<Vec<Expense>> {
        let filter = Row::new().with("user_id", user_id);
        let rows = self.storage.select(EXPENSES_TABLE, Some(&filter), limit)?;
        Ok(rows.iter().map(Expense::from_row).collect())
    }
}

fn primary_key(user_id: i64, created_at: &str) -> Row {
    Row::new()
        .with("user_id", user_id)
        .with("created_at", created_at)
}

/// Sums amounts per category.
#[must_use]
pub fn category_totals(expenses: &[Expense]) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for expense in expenses {
        let total = totals.entry(expense.category.clone()).or_insert(0_i64);
        *total = total.saturating_add(expense.amount);
    }
    totals
}

/// Largest categories first, ties broken by name, truncated to `limit`.
#[must_use]
pub fn top_categories(expenses: &[Expense], limit: usize) -> Vec<(String, i64)> {
    let mut totals: Vec<(String, i64)> = category_totals(expenses).into_iter().collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    totals.truncate(limit);
    totals
}
