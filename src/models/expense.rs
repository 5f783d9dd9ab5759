//! Expense records.

use super::{Row, Value, format_timestamp, parse_timestamp};
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

/// Category used when a stored row carries none.
pub const DEFAULT_CATEGORY: &str = "Другое";

/// A single recorded expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expense {
    /// Record identifier (UUID v7).
    pub id: String,
    /// Chat user the expense belongs to.
    pub user_id: i64,
    /// What was bought.
    pub item: String,
    /// Amount in whole currency units.
    pub amount: i64,
    /// Spending category.
    pub category: String,
    /// When the expense was recorded.
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Creates an expense recorded now.
    ///
    /// The timestamp is truncated to microseconds, the precision it is
    /// stored with.
    #[must_use]
    pub fn new(
        user_id: i64,
        item: impl Into<String>,
        amount: i64,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            user_id,
            item: item.into(),
            amount,
            category: category.into(),
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Sets the creation time.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Converts the expense into a row for the `expenses` table.
    #[must_use]
    pub fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id.as_str())
            .with("user_id", self.user_id)
            .with("item", self.item.as_str())
            .with("amount", self.amount)
            .with("category", self.category.as_str())
            .with("created_at", Value::Timestamp(self.created_at))
    }

    /// Builds an expense from a stored row.
    ///
    /// Missing or unparsable fields fall back to defaults; an unreadable
    /// `created_at` becomes the current time.
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        let created_at = match row.get_str("created_at").map(|s| (s, parse_timestamp(s))) {
            Some((_, Some(t))) => t,
            Some((raw, None)) => {
                tracing::warn!(created_at = raw, "Unparsable expense timestamp, using now");
                Utc::now()
            },
            None => Utc::now(),
        };

        Self {
            id: row.get_str("id").unwrap_or_default().to_string(),
            user_id: row.get_i64("user_id").unwrap_or_default(),
            item: row.get_str("item").unwrap_or_default().to_string(),
            amount: row.get_i64("amount").unwrap_or_default(),
            category: row
                .get_str("category")
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            created_at,
        }
    }

    /// Returns `created_at` in its stored text form.
    #[must_use]
    pub fn created_at_key(&self) -> String {
        format_timestamp(&self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_row_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
        let expense = Expense::new(12345, "кофе", 300, "Еда").with_created_at(ts);

        let stored = Row::new()
            .with("id", expense.id.as_str())
            .with("user_id", 12345)
            .with("item", "кофе")
            .with("amount", 300)
            .with("category", "Еда")
            .with("created_at", expense.created_at_key());

        assert_eq!(Expense::from_row(&stored), expense);
    }

    #[test]
    fn test_from_row_defaults() {
        let row = Row::new().with("user_id", 1).with("amount", 10);
        let expense = Expense::from_row(&row);
        assert_eq!(expense.category, DEFAULT_CATEGORY);
        assert_eq!(expense.item, "");
        assert_eq!(expense.amount, 10);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Expense::new(1, "a", 1, "x");
        let b = Expense::new(1, "a", 1, "x");
        assert_ne!(a.id, b.id);
    }
}
