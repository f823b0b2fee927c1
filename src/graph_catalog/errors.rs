//! # Graph Schema Error Types
//!
//! Errors raised while loading the vertex/edge topology from YAML and while
//! resolving tables and foreign keys against it.
//!
//! When returning schema errors from deeper layers, use the context helpers so
//! the message says what was being resolved:
//!
//! ```ignore
//! GraphSchemaError::table_error_with_context(
//!     "public.V_Person",
//!     "While expanding out('knows') from the traversal root"
//! )
//! ```

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphSchemaError {
    #[error("No vertex table found for `{label}`")]
    Vertex { label: String },
    #[error("No edge table found for `{label}`.")]
    Edge { label: String },
    #[error("Unknown table `{table}`")]
    UnknownTable { table: String },
    #[error("Invalid identifier '{identifier}' ({reason})")]
    InvalidIdentifier { identifier: String, reason: String },
    #[error("Edge `{edge}` references unknown vertex label `{vertex}`")]
    InvalidConnection { edge: String, vertex: String },
    #[error("Duplicate label `{label}` in schema `{schema}`")]
    DuplicateLabel { schema: String, label: String },
    #[error("Failed to read configuration file: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse configuration: {error}")]
    ConfigParseError { error: String },
}

/// Helper methods for creating errors with context information
impl GraphSchemaError {
    /// Create an UnknownTable error with context information
    pub fn table_error_with_context(table: impl Into<String>, context: impl Into<String>) -> Self {
        let table = table.into();
        let ctx = context.into();
        GraphSchemaError::UnknownTable {
            table: format!("{}\n  Context: {}", table, ctx),
        }
    }

    /// Create a Vertex error with context information
    pub fn vertex_error_with_context(label: impl Into<String>, context: impl Into<String>) -> Self {
        let label = label.into();
        let ctx = context.into();
        GraphSchemaError::Vertex {
            label: format!("{}\n  Context: {}", label, ctx),
        }
    }
}
