use thiserror::Error;

use crate::graph_catalog::GraphSchemaError;
use crate::query_tree::QueryTreeError;
use crate::sql_generator::SqlGenerationError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("SQL execution failed: {message}\n  SQL: {sql}")]
    Sql { sql: String, message: String },
    #[error("Cannot decode result row: {0}")]
    Decode(String),
    #[error(transparent)]
    Compile(#[from] SqlGenerationError),
    #[error("Statement needs incoming root ids but none were supplied: {0}")]
    MissingBinding(String),
    #[error(transparent)]
    Schema(#[from] GraphSchemaError),
}

impl From<QueryTreeError> for ExecutionError {
    fn from(err: QueryTreeError) -> Self {
        ExecutionError::Compile(SqlGenerationError::Tree(err))
    }
}

impl ExecutionError {
    pub fn sql_with_context(sql: impl Into<String>, message: impl ToString) -> Self {
        ExecutionError::Sql {
            sql: sql.into(),
            message: message.to_string(),
        }
    }
}
