//! Business logic services.
//!
//! Services sit on top of [`crate::storage::Storage`] and provide the
//! expense and budget operations the chat front end needs.

mod budget;
mod expenses;

pub use budget::{BUDGETS_TABLE, BudgetLevel, BudgetService, BudgetStatus, WARNING_PERCENT};
pub use expenses::{
    DEFAULT_LIMIT, EXPENSES_TABLE, ExpenseService, category_totals, month_start, top_categories,
};
