//! Parameterized statement construction.
//!
//! The builder turns `(table, filter, values, limit)` into a
//! [`BuiltStatement`]: a template made only of fixed keywords, validated
//! identifiers and placeholder tokens, plus an out-of-band parameter map.
//! Values never appear in the template text.
//!
//! Placeholders are named after the column they bind:
//!
//! | Group | Placeholder |
//! |-------|-------------|
//! | filter / insert value | `$p_<column>` |
//! | update assignment | `$set_<column>` |
//!
//! The template opens with a `DECLARE` manifest so drivers can bind every
//! parameter with an explicit type:
//!
//! ```text
//! DECLARE $p_user_id AS Int64;
//! DECLARE $p_category AS Utf8;
//! SELECT * FROM expenses WHERE user_id = $p_user_id AND category = $p_category ORDER BY row_seq LIMIT 100
//! ```

use super::identifier::validate;
use super::schema::{ROW_SEQ_COLUMN, SchemaRegistry, TableSchema};
use crate::models::{ColumnType, Filter, Row, Value};
use crate::{Error, Result};
use std::fmt::Write as _;

/// Kind of data-manipulation statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `SELECT`.
    Select,
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
}

impl StatementKind {
    /// Lowercase operation name, used in logs, metrics and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Which part of the statement a binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingRole {
    /// Equality condition in the `WHERE` clause.
    Filter,
    /// Value written by `INSERT` or `SET`.
    Assign,
}

/// A single bound parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    placeholder: String,
    column: String,
    column_type: ColumnType,
    value: Value,
    role: BindingRole,
}

impl Binding {
    /// Placeholder token including the `$` sigil.
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Column the parameter binds to.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Declared type of the column.
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Value after coercion to the column type.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Role of the binding.
    #[must_use]
    pub const fn role(&self) -> BindingRole {
        self.role
    }
}

/// A statement template plus its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltStatement {
    kind: StatementKind,
    table: String,
    body: String,
    bindings: Vec<Binding>,
    limit: Option<usize>,
}

impl BuiltStatement {
    /// Statement kind.
    #[must_use]
    pub const fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Target table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Statement text without the `DECLARE` manifest.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Full template: one `DECLARE` line per parameter, then the body.
    #[must_use]
    pub fn template(&self) -> String {
        let mut out = String::new();
        for binding in &self.bindings {
            let _ = writeln!(
                out,
                "DECLARE {} AS {};",
                binding.placeholder,
                binding.column_type.declare_name()
            );
        }
        out.push_str(&self.body);
        out
    }

    /// All bindings in placeholder order.
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Parameter map: placeholder to bound value, in declaration order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings
            .iter()
            .map(|b| (b.placeholder.as_str(), &b.value))
    }

    /// Looks up the value bound to `placeholder` (with or without `$`).
    #[must_use]
    pub fn param(&self, placeholder: &str) -> Option<&Value> {
        let name = placeholder.strip_prefix('$').unwrap_or(placeholder);
        self.bindings
            .iter()
            .find(|b| &b.placeholder[1..] == name)
            .map(|b| &b.value)
    }

    /// Filter bindings (the `WHERE` clause).
    pub fn filters(&self) -> impl Iterator<Item = &Binding> {
        self.bindings
            .iter()
            .filter(|b| b.role == BindingRole::Filter)
    }

    /// Assignment bindings (insert values or `SET` list).
    pub fn assignments(&self) -> impl Iterator<Item = &Binding> {
        self.bindings
            .iter()
            .filter(|b| b.role == BindingRole::Assign)
    }

    /// Row limit for selects.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Rewrites named placeholders to positional `$1..$n`.
    ///
    /// Position `n` refers to `bindings()[n - 1]`. Used for drivers that
    /// cannot bind by name.
    #[must_use]
    pub fn to_positional(&self) -> String {
        let body = self.body.as_str();
        let mut out = String::with_capacity(body.len());
        let mut chars = body.char_indices().peekable();

        while let Some((start, ch)) = chars.next() {
            if ch != '$' {
                out.push(ch);
                continue;
            }

            let mut end = start + 1;
            while let Some(&(idx, c)) = chars.peek() {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                end = idx + c.len_utf8();
                chars.next();
            }

            let token = &body[start..end];
            match self.bindings.iter().position(|b| b.placeholder == token) {
                Some(pos) => {
                    let _ = write!(out, "${}", pos + 1);
                },
                None => out.push_str(token),
            }
        }

        out
    }
}

/// Builds parameterized statements against a schema registry.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> QueryBuilder<'a> {
    /// Creates a builder over `registry`.
    #[must_use]
    pub const fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Builds `SELECT * FROM <table> [WHERE ...] ORDER BY row_seq [LIMIT n]`.
    ///
    /// An absent or empty filter selects every row; the limit is inlined
    /// because it is a builder-controlled integer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`], [`Error::UnknownTable`],
    /// [`Error::UnknownColumn`] or [`Error::TypeMismatch`].
    pub fn build_select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<BuiltStatement> {
        let schema = self.schema(table)?;
        let mut bindings = Vec::new();
        if let Some(filter) = filter {
            bind_all(schema, filter, "p", BindingRole::Filter, &mut bindings)?;
        }

        let mut body = format!("SELECT * FROM {}", schema.name());
        push_where(&mut body, &bindings);
        let _ = write!(body, " ORDER BY {ROW_SEQ_COLUMN}");
        if let Some(n) = limit {
            // SQL limits are signed 64-bit; larger values mean "no limit".
            let n = i64::try_from(n).unwrap_or(i64::MAX);
            let _ = write!(body, " LIMIT {n}");
        }

        Ok(BuiltStatement {
            kind: StatementKind::Select,
            table: schema.name().to_string(),
            body,
            bindings,
            limit,
        })
    }

    /// Builds a single-row `INSERT` with one parameter per column.
    ///
    /// A row whose primary key already exists is skipped
    /// (`ON CONFLICT DO NOTHING`).
    ///
    /// # Errors
    ///
    /// Returns the identifier, schema and type errors of
    /// [`build_select`](Self::build_select), and [`Error::InvalidInput`] if
    /// `values` is empty or omits a primary key column.
    pub fn build_insert(&self, table: &str, values: &Row) -> Result<BuiltStatement> {
        let schema = self.schema(table)?;
        if values.is_empty() {
            return Err(Error::InvalidInput(format!(
                "insert into '{}' requires at least one column",
                schema.name()
            )));
        }

        let mut bindings = Vec::new();
        bind_all(schema, values, "p", BindingRole::Assign, &mut bindings)?;

        if let Some(missing) = schema
            .primary_key()
            .iter()
            .find(|key| !values.contains(key))
        {
            return Err(Error::InvalidInput(format!(
                "insert into '{}' is missing primary key column '{missing}'",
                schema.name()
            )));
        }

        let columns: Vec<&str> = bindings.iter().map(|b| b.column.as_str()).collect();
        let placeholders: Vec<&str> = bindings.iter().map(|b| b.placeholder.as_str()).collect();
        let body = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            schema.name(),
            columns.join(", "),
            placeholders.join(", ")
        );

        Ok(BuiltStatement {
            kind: StatementKind::Insert,
            table: schema.name().to_string(),
            body,
            bindings,
            limit: None,
        })
    }

    /// Builds `UPDATE <table> SET ... WHERE ...`.
    ///
    /// Filter and assignment values are validated independently and bound
    /// under separate placeholder groups.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafeOperation`] for an empty filter,
    /// [`Error::InvalidInput`] for an empty write set or an assignment to a
    /// primary key column, plus the usual identifier, schema and type errors.
    pub fn build_update(&self, table: &str, filter: &Filter, values: &Row) -> Result<BuiltStatement> {
        let schema = self.schema(table)?;
        if filter.is_empty() {
            return Err(Error::UnsafeOperation {
                operation: "update",
                table: schema.name().to_string(),
            });
        }

        let mut filters = Vec::new();
        bind_all(schema, filter, "p", BindingRole::Filter, &mut filters)?;

        if values.is_empty() {
            return Err(Error::InvalidInput(format!(
                "update of '{}' requires at least one assignment",
                schema.name()
            )));
        }
        let mut assignments = Vec::new();
        bind_all(schema, values, "set", BindingRole::Assign, &mut assignments)?;

        if let Some(key) = assignments.iter().find(|b| schema.is_primary_key(&b.column)) {
            return Err(Error::InvalidInput(format!(
                "primary key column '{}' of '{}' cannot be updated",
                key.column,
                schema.name()
            )));
        }

        let set: Vec<String> = assignments
            .iter()
            .map(|b| format!("{} = {}", b.column, b.placeholder))
            .collect();
        let mut body = format!("UPDATE {} SET {}", schema.name(), set.join(", "));
        push_where(&mut body, &filters);

        let mut bindings = assignments;
        bindings.extend(filters);

        Ok(BuiltStatement {
            kind: StatementKind::Update,
            table: schema.name().to_string(),
            body,
            bindings,
            limit: None,
        })
    }

    /// Builds `DELETE FROM <table> WHERE ...`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafeOperation`] for an empty filter, plus the
    /// usual identifier, schema and type errors.
    pub fn build_delete(&self, table: &str, filter: &Filter) -> Result<BuiltStatement> {
        let schema = self.schema(table)?;
        if filter.is_empty() {
            return Err(Error::UnsafeOperation {
                operation: "delete",
                table: schema.name().to_string(),
            });
        }

        let mut bindings = Vec::new();
        bind_all(schema, filter, "p", BindingRole::Filter, &mut bindings)?;

        let mut body = format!("DELETE FROM {}", schema.name());
        push_where(&mut body, &bindings);

        Ok(BuiltStatement {
            kind: StatementKind::Delete,
            table: schema.name().to_string(),
            body,
            bindings,
            limit: None,
        })
    }

    /// Validates the table identifier, then resolves its schema.
    fn schema(&self, table: &str) -> Result<&'a TableSchema> {
        validate(table)?;
        self.registry.table(table)
    }
}

/// Validates and coerces every `(column, value)` pair of `row`.
fn bind_all(
    schema: &TableSchema,
    row: &Row,
    prefix: &str,
    role: BindingRole,
    out: &mut Vec<Binding>,
) -> Result<()> {
    for (column, value) in row.iter() {
        validate(column)?;
        let column_type = schema.type_of(column)?;
        let coerced = column_type
            .coerce(value)
            .ok_or_else(|| Error::TypeMismatch {
                table: schema.name().to_string(),
                column: column.to_string(),
                expected: column_type,
                value: format!("{value:?}"),
            })?;

        out.push(Binding {
            placeholder: format!("${prefix}_{column}"),
            column: column.to_string(),
            column_type,
            value: coerced,
            role,
        });
    }
    Ok(())
}

/// Appends ` WHERE a = $p_a AND ...` when there are filter bindings.
fn push_where(body: &mut String, filters: &[Binding]) {
    if filters.is_empty() {
        return;
    }
    let conditions: Vec<String> = filters
        .iter()
        .map(|b| format!("{} = {}", b.column, b.placeholder))
        .collect();
    let _ = write!(body, " WHERE {}", conditions.join(" AND "));
}
