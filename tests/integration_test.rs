//! Integration tests for spendlog.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use chrono::{Duration, Utc};
use spendlog::config::SpendlogConfig;
use spendlog::services::{BudgetLevel, month_start};
use spendlog::storage::Storage;
use spendlog::{
    BudgetService, Error, Expense, ExpenseService, Row, StorageBackendType, StorageSettings,
};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_error_types() {
    let err = Error::InvalidInput("test message".to_string());
    let display = format!("{err}");
    assert!(display.contains("invalid input"));
    assert!(display.contains("test message"));

    let err = Error::StorageUnavailable {
        operation: "insert",
        table: "expenses".to_string(),
        cause: "connection reset".to_string(),
    };
    let display = format!("{err}");
    assert!(display.contains("insert"));
    assert!(display.contains("expenses"));
    assert!(display.contains("connection reset"));
    assert!(err.is_retryable());

    let err = Error::FeatureNotEnabled("postgres".to_string());
    assert!(format!("{err}").contains("--features postgres"));
    assert!(!err.is_validation());
    assert!(!err.is_retryable());
}

#[test]
fn test_sqlite_file_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data").join("spendlog.db");

    let saved = {
        let expenses = ExpenseService::new(Storage::sqlite(&path).unwrap()).unwrap();
        let expense = Expense::new(42, "хлеб", 80, "Еда");
        assert!(expenses.save_expense(&expense).unwrap());
        expense
    };

    let expenses = ExpenseService::new(Storage::sqlite(&path).unwrap()).unwrap();
    assert_eq!(expenses.get_expenses(42, None).unwrap(), vec![saved]);
}

#[test]
fn test_services_over_every_local_backend() {
    for storage in [Storage::in_memory(), Storage::sqlite_in_memory().unwrap()] {
        let name = storage.backend_name();
        let expenses = ExpenseService::new(storage.clone()).unwrap();
        let budgets = BudgetService::new(storage).unwrap();
        let start = month_start(Utc::now());

        let rows = [
            ("кофе", 300, "Еда"),
            ("такси", 900, "Транспорт"),
            ("обед", 700, "Еда"),
        ];
        for (offset, (item, amount, category)) in (0_i64..).zip(rows) {
            let expense = Expense::new(5, item, amount, category)
                .with_created_at(start + Duration::seconds(offset));
            assert!(expenses.save_expense(&expense).unwrap(), "{name}");
        }
        let old = Expense::new(5, "книга", 1_000, "Другое")
            .with_created_at(start - Duration::days(3));
        expenses.save_expense(&old).unwrap();

        assert_eq!(expenses.get_expenses(5, None).unwrap().len(), 4, "{name}");
        assert_eq!(expenses.get_expenses(5, Some(2)).unwrap().len(), 2, "{name}");
        assert_eq!(expenses.get_total(5).unwrap(), 1_900, "{name}");
        assert_eq!(
            expenses.get_top_categories(5, 1).unwrap(),
            vec![("Еда".to_string(), 1_000)],
            "{name}"
        );

        budgets.set_budget(5, 2_000).unwrap();
        let status = budgets.budget_status(5).unwrap().unwrap();
        assert_eq!(status.spent, 1_900, "{name}");
        assert_eq!(status.level, BudgetLevel::Warning, "{name}");
        assert_eq!(status.progress_bar(), "[█████████░] 95%", "{name}");

        let last = expenses.get_last_expense(5).unwrap().unwrap();
        assert_eq!(last.item, "обед", "{name}");
        assert!(expenses.delete_expense(5, &last.created_at_key()).unwrap());
        assert_eq!(expenses.get_total(5).unwrap(), 1_200, "{name}");
    }
}

#[test]
fn test_config_file_selects_sqlite_path() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("budget.db");

    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[storage]\nbackend = \"sqlite\"\nsqlite_path = \"{}\"\ntimeout_ms = 250\n\n[logging]\nformat = \"json\"",
        db.display()
    )
    .unwrap();

    let config = SpendlogConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.storage.backend, StorageBackendType::Sqlite);
    assert_eq!(config.storage.timeout, std::time::Duration::from_millis(250));
    assert_eq!(config.logging.format.as_deref(), Some("json"));

    let storage = Storage::from_config(&config.storage).unwrap();
    storage
        .insert("users", &Row::new().with("id", 1).with("name", "Alice"))
        .unwrap();
    assert!(db.exists());
}

#[test]
fn test_postgres_without_feature_or_url() {
    let settings = StorageSettings {
        backend: StorageBackendType::Postgres,
        ..StorageSettings::default()
    };
    assert!(matches!(
        Storage::from_config(&settings),
        Err(Error::InvalidInput(_))
    ));

    if !cfg!(feature = "postgres") {
        assert!(matches!(
            Storage::postgres("postgres://localhost/none", None, std::time::Duration::from_secs(1)),
            Err(Error::FeatureNotEnabled(_))
        ));
    }
}
