//! Per-database rendering of identifiers, ranges, text predicates and
//! temporary tables.

use crate::config::DialectKind;
use crate::graph_catalog::{PropertyType, TableRef};
use crate::traversal::{RangeSpec, TextPredicate, Value};

use super::errors::SqlGenerationError;

pub trait SqlDialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Fully qualified table reference, e.g. `"public"."V_Person"`.
    fn table(&self, table: &TableRef) -> String {
        format!("{}.{}", self.quote(&table.schema), self.quote(&table.table_name()))
    }

    /// Trailing `LIMIT`/`OFFSET` clause, or `None` for the full range.
    fn range_clause(&self, range: &RangeSpec) -> Option<String>;

    /// Condition plus its single bound value.
    fn text_predicate(&self, column: &str, predicate: TextPredicate, text: &str) -> (String, Value);

    fn supports_full_text(&self) -> bool {
        false
    }

    fn full_text(
        &self,
        _column: &str,
        _query: &str,
        _configuration: Option<&str>,
    ) -> Result<(String, Vec<Value>), SqlGenerationError> {
        Err(SqlGenerationError::FullTextUnsupported(self.name()))
    }

    fn column_type(&self, column_type: PropertyType) -> &'static str;

    fn create_temp_table(&self, name: &str, column: &str, column_type: PropertyType) -> String;

    /// Single-row insert; executors bind one value per execution.
    fn insert_temp_row(&self, name: &str, column: &str) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES (?)",
            self.quote(name),
            self.quote(column)
        )
    }

    fn drop_temp_table(&self, name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(name))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

/// Escape GLOB metacharacters so the pattern matches literally.
fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn range_clause(&self, range: &RangeSpec) -> Option<String> {
        match (range.low, range.count()) {
            (0, None) => None,
            (low, None) => Some(format!(" LIMIT -1 OFFSET {}", low)),
            (0, Some(count)) => Some(format!(" LIMIT {}", count)),
            (low, Some(count)) => Some(format!(" LIMIT {} OFFSET {}", count, low)),
        }
    }

    fn text_predicate(&self, column: &str, predicate: TextPredicate, text: &str) -> (String, Value) {
        let escaped = escape_glob(text);
        match predicate {
            TextPredicate::Containing => (format!("instr({}, ?) > 0", column), text.into()),
            TextPredicate::NotContaining => (format!("instr({}, ?) = 0", column), text.into()),
            TextPredicate::StartingWith => {
                (format!("{} GLOB ?", column), Value::String(format!("{}*", escaped)))
            }
            TextPredicate::NotStartingWith => (
                format!("{} NOT GLOB ?", column),
                Value::String(format!("{}*", escaped)),
            ),
            TextPredicate::EndingWith => {
                (format!("{} GLOB ?", column), Value::String(format!("*{}", escaped)))
            }
            TextPredicate::NotEndingWith => (
                format!("{} NOT GLOB ?", column),
                Value::String(format!("*{}", escaped)),
            ),
        }
    }

    fn column_type(&self, column_type: PropertyType) -> &'static str {
        match column_type {
            PropertyType::Integer | PropertyType::Boolean => "INTEGER",
            PropertyType::Float => "REAL",
            PropertyType::String => "TEXT",
        }
    }

    fn create_temp_table(&self, name: &str, column: &str, column_type: PropertyType) -> String {
        format!(
            "CREATE TEMPORARY TABLE {} ({} {})",
            self.quote(name),
            self.quote(column),
            self.column_type(column_type)
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouseDialect;

impl SqlDialect for ClickHouseDialect {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "\\`"))
    }

    fn range_clause(&self, range: &RangeSpec) -> Option<String> {
        match (range.low, range.count()) {
            (0, None) => None,
            (low, None) => Some(format!(" OFFSET {} ROWS", low)),
            (0, Some(count)) => Some(format!(" LIMIT {}", count)),
            (low, Some(count)) => Some(format!(" LIMIT {} OFFSET {}", count, low)),
        }
    }

    fn text_predicate(&self, column: &str, predicate: TextPredicate, text: &str) -> (String, Value) {
        let sql = match predicate {
            TextPredicate::Containing => format!("position({}, ?) > 0", column),
            TextPredicate::NotContaining => format!("position({}, ?) = 0", column),
            TextPredicate::StartingWith => format!("startsWith({}, ?)", column),
            TextPredicate::NotStartingWith => format!("NOT startsWith({}, ?)", column),
            TextPredicate::EndingWith => format!("endsWith({}, ?)", column),
            TextPredicate::NotEndingWith => format!("NOT endsWith({}, ?)", column),
        };
        (sql, text.into())
    }

    fn supports_full_text(&self) -> bool {
        true
    }

    fn full_text(
        &self,
        column: &str,
        query: &str,
        configuration: Option<&str>,
    ) -> Result<(String, Vec<Value>), SqlGenerationError> {
        if let Some(configuration) = configuration {
            log::debug!(
                "Ignoring full-text configuration '{}' for token search",
                configuration
            );
        }
        let tokens = query.split_whitespace().collect::<Vec<_>>();
        if tokens.is_empty() {
            return Err(SqlGenerationError::untranslatable_with_context(
                format!("fullText('{}')", query),
                "empty full-text query",
            ));
        }
        let sql = tokens
            .iter()
            .map(|_| format!("hasToken({}, ?)", column))
            .collect::<Vec<_>>()
            .join(" AND ");
        let values = tokens.into_iter().map(Value::from).collect();
        Ok((format!("({})", sql), values))
    }

    fn column_type(&self, column_type: PropertyType) -> &'static str {
        match column_type {
            PropertyType::Integer => "Int64",
            PropertyType::Float => "Float64",
            PropertyType::String => "String",
            PropertyType::Boolean => "Bool",
        }
    }

    fn create_temp_table(&self, name: &str, column: &str, column_type: PropertyType) -> String {
        format!(
            "CREATE TEMPORARY TABLE {} ({} {}) ENGINE = Memory",
            self.quote(name),
            self.quote(column),
            self.column_type(column_type)
        )
    }
}

pub fn dialect_for(kind: DialectKind) -> Box<dyn SqlDialect> {
    match kind {
        DialectKind::Sqlite => Box::new(SqliteDialect),
        DialectKind::Clickhouse => Box::new(ClickHouseDialect),
    }
}
