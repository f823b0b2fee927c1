//! The connection seam between compiled statements and a database.

use super::errors::ExecutionError;
use crate::traversal::Value;

/// Columns and rows of one executed `SELECT`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        ResultSet { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes positional-parameter SQL. Implementations own the connection;
/// the assembler borrows it for one traversal.
#[cfg_attr(test, mockall::automock)]
pub trait SqlExecutor {
    fn query(&self, sql: &str, params: &[Value]) -> Result<ResultSet, ExecutionError>;

    /// Returns the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, ExecutionError>;

    /// Create a temp table and fill it with one row per value.
    fn materialize_bulk_table(
        &self,
        create_sql: &str,
        insert_sql: &str,
        rows: &[Value],
    ) -> Result<(), ExecutionError> {
        self.execute(create_sql, &[])?;
        for value in rows {
            self.execute(insert_sql, std::slice::from_ref(value))?;
        }
        Ok(())
    }
}
