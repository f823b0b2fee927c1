//! Large `within`/`without` lists streamed through temporary tables.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::graph_catalog::PropertyType;
use crate::traversal::{Predicate, Value};

pub const WITHIN_COLUMN: &str = "within";
pub const WITHOUT_COLUMN: &str = "without";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkKind {
    /// INNER JOIN against the temp table
    Within,
    /// LEFT JOIN plus an IS NULL test
    Without,
}

impl BulkKind {
    pub fn column(&self) -> &'static str {
        match self {
            BulkKind::Within => WITHIN_COLUMN,
            BulkKind::Without => WITHOUT_COLUMN,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkTable {
    pub name: String,
    pub kind: BulkKind,
    pub column_type: PropertyType,
    pub values: Vec<Value>,
}

impl BulkTable {
    pub fn new(kind: BulkKind, values: Vec<Value>) -> Self {
        BulkTable {
            name: format!("bulk_{}", uuid::Uuid::new_v4().simple()),
            kind,
            column_type: infer_type(&values),
            values,
        }
    }

    pub fn column(&self) -> &'static str {
        self.kind.column()
    }
}

impl fmt::Display for BulkTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} {} values)", self.name, self.column(), self.values.len())
    }
}

/// Column type able to hold every value; mixed or textual lists fall back
/// to strings.
pub fn infer_type(values: &[Value]) -> PropertyType {
    let mut inferred: Option<PropertyType> = None;
    for value in values {
        let current = match value {
            Value::Null => continue,
            Value::Bool(_) => PropertyType::Boolean,
            Value::Int(_) | Value::Id(_) => PropertyType::Integer,
            Value::Float(_) => PropertyType::Float,
            Value::String(_) => return PropertyType::String,
        };
        inferred = Some(match (inferred, current) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some(PropertyType::Integer), PropertyType::Float)
            | (Some(PropertyType::Float), PropertyType::Integer) => PropertyType::Float,
            _ => return PropertyType::String,
        });
    }
    inferred.unwrap_or(PropertyType::Integer)
}

/// `Value` ordered by `sql_cmp`, so values SQL compares equal collapse in a
/// set.
struct SqlOrdered(Value);

impl PartialEq for SqlOrdered {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SqlOrdered {}

impl PartialOrd for SqlOrdered {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SqlOrdered {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.sql_cmp(&other.0)
    }
}

/// Values of a membership test large enough to go through a temp table.
///
/// The list is deduplicated before the size check, and an `or` of
/// `within`s is merged into one list first. A temp table holding the same
/// value twice would repeat every joined row.
pub fn bulk_candidate(predicate: &Predicate, threshold: usize) -> Option<(BulkKind, Vec<Value>)> {
    let (kind, values): (BulkKind, Vec<&Value>) = match predicate {
        Predicate::Within(values) => (BulkKind::Within, values.iter().collect()),
        Predicate::Without(values) => (BulkKind::Without, values.iter().collect()),
        Predicate::Or(parts)
            if !parts.is_empty() && parts.iter().all(|p| matches!(p, Predicate::Within(_))) =>
        {
            (BulkKind::Within, predicate.values())
        }
        _ => return None,
    };
    let distinct: BTreeSet<SqlOrdered> = values
        .into_iter()
        .map(|v| match v {
            Value::Id(record) => SqlOrdered(Value::Int(record.id)),
            other => SqlOrdered(other.clone()),
        })
        .collect();
    (distinct.len() > threshold).then(|| (kind, distinct.into_iter().map(|v| v.0).collect()))
}
