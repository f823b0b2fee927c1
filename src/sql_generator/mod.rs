//! SQL generation for query-tree path-stacks.
//!
//! Every [`PathStack`](crate::query_tree::PathStack) compiles into one
//! [`CompiledQuery`]: the statement text, its positional parameters, and the
//! alias map the result assembler needs to turn rows back into elements.

pub mod bulk;
pub mod composition;
pub mod dialect;
pub mod drop;
pub mod errors;
pub mod plan;
pub mod predicate_sql;
pub mod select_builder;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::graph_catalog::TableRef;
use crate::query_tree::{AliasKey, Phase, RootBinding, StepLabel};
use crate::traversal::{RangeSpec, SortOrder, Value};

pub use bulk::{BulkKind, BulkTable};
pub use dialect::{dialect_for, ClickHouseDialect, SqlDialect, SqliteDialect};
pub use drop::DropPlan;
pub use errors::SqlGenerationError;
pub use plan::{plan_runs, QueryPlan, ResultWindow};

/// Positional `?` parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Bound per execution to one root id.
    RootId,
    Value(Value),
}

/// SQL text with its parameters in textual order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        SqlFragment {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn push_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn push_value(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(SqlParam::Value(value));
    }

    pub fn push_root_id(&mut self) {
        self.sql.push('?');
        self.params.push(SqlParam::RootId);
    }

    /// Append SQL that already contains one `?` per value.
    pub fn push_sql_with_values(&mut self, sql: &str, values: Vec<Value>) {
        self.sql.push_str(sql);
        self.params.extend(values.into_iter().map(SqlParam::Value));
    }

    pub fn append(&mut self, other: SqlFragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }
}

/// Identity of one element fragment in a result row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FragmentKey {
    pub depth: usize,
    pub table: TableRef,
    pub labels: BTreeSet<StepLabel>,
}

impl FragmentKey {
    pub fn owns(&self, key: &AliasKey) -> bool {
        key.depth == self.depth && key.table == self.table && key.labels == self.labels
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub phase: Phase,
    pub sql: String,
    pub parameters: Vec<SqlParam>,
    pub aliases: BTreeMap<String, AliasKey>,
    /// Projected elements, root side first; the last one is the terminal.
    pub fragments: Vec<FragmentKey>,
    /// Result column aliases in `ORDER BY` order.
    pub order_by: Vec<(String, SortOrder)>,
    pub range: Option<RangeSpec>,
    /// The range was left out of the SQL and is applied in memory.
    pub range_stripped: bool,
    pub bulk_tables: Vec<BulkTable>,
    pub root_table: TableRef,
    pub root_binding: RootBinding,
}

impl CompiledQuery {
    pub fn terminal(&self) -> Option<&FragmentKey> {
        self.fragments.last()
    }

    pub fn binds_root_id(&self) -> bool {
        self.parameters.iter().any(|p| *p == SqlParam::RootId)
    }

    /// Parameter values for one execution.
    pub fn bind(&self, root_id: Option<i64>) -> Result<Vec<Value>, SqlGenerationError> {
        self.parameters
            .iter()
            .map(|param| match param {
                SqlParam::Value(value) => Ok(value.clone()),
                SqlParam::RootId => root_id.map(Value::Int).ok_or_else(|| {
                    SqlGenerationError::InvalidPlan(format!(
                        "statement needs a root id but none was supplied: {}",
                        self.sql
                    ))
                }),
            })
            .collect()
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.phase, self.sql)
    }
}
