use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use crate::graph_catalog::{ElementKind, TableRef};

pub const ID_KEY: &str = "id";
pub const LABEL_KEY: &str = "label";

/// Identity of one stored element: its table plus the `ID` column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordId {
    pub table: TableRef,
    pub id: i64,
}

impl RecordId {
    pub fn new(table: TableRef, id: i64) -> Self {
        RecordId { table, id }
    }

    /// Parse the `schema.Label:id` text form. A bare `Label:id` uses the
    /// `public` schema.
    pub fn parse(text: &str, kind: ElementKind) -> Option<RecordId> {
        let (qualified, id) = text.rsplit_once(':')?;
        let id = id.parse::<i64>().ok()?;
        let (schema, label) = match qualified.split_once('.') {
            Some((schema, label)) => (schema, label),
            None => (crate::graph_catalog::graph_schema::DEFAULT_SCHEMA, qualified),
        };
        if schema.is_empty() || label.is_empty() {
            return None;
        }
        let table = TableRef {
            schema: schema.to_string(),
            label: label.to_string(),
            kind,
        };
        Some(RecordId { table, id })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.table.schema, self.table.label, self.id)
    }
}

/// Scalar literal appearing in predicates, ids and decoded rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Id(RecordId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Id(record) => Some(record.id),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Id(_) => 4,
        }
    }

    /// Total order used for in-memory sorting: NULL sorts first, numbers
    /// compare across int/float, mismatched types order by type rank.
    pub fn sql_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Id(a), Value::Id(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Value::Id(record) => write!(f, "'{}'", record),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compare {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Compare {
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Compare::Eq => "=",
            Compare::Neq => "<>",
            Compare::Lt => "<",
            Compare::Lte => "<=",
            Compare::Gt => ">",
            Compare::Gte => ">=",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compare::Eq => "eq",
            Compare::Neq => "neq",
            Compare::Lt => "lt",
            Compare::Lte => "lte",
            Compare::Gt => "gt",
            Compare::Gte => "gte",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextPredicate {
    Containing,
    NotContaining,
    StartingWith,
    NotStartingWith,
    EndingWith,
    NotEndingWith,
}

impl TextPredicate {
    pub fn name(&self) -> &'static str {
        match self {
            TextPredicate::Containing => "containing",
            TextPredicate::NotContaining => "notContaining",
            TextPredicate::StartingWith => "startingWith",
            TextPredicate::NotStartingWith => "notStartingWith",
            TextPredicate::EndingWith => "endingWith",
            TextPredicate::NotEndingWith => "notEndingWith",
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            TextPredicate::NotContaining
                | TextPredicate::NotStartingWith
                | TextPredicate::NotEndingWith
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Predicate {
    Compare(Compare, Value),
    /// `has('key')`
    Exists,
    /// `hasNot('key')`
    NotExists,
    Within(Vec<Value>),
    Without(Vec<Value>),
    /// `low <= x < high`
    Between(Value, Value),
    /// `low < x < high`
    Inside(Value, Value),
    /// `x < low or x > high`
    Outside(Value, Value),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Text(TextPredicate, String),
    FullText {
        query: String,
        configuration: Option<String>,
    },
    /// Opaque user code; never translatable to SQL.
    Lambda(String),
}

impl Predicate {
    pub fn eq(value: impl Into<Value>) -> Self {
        Predicate::Compare(Compare::Eq, value.into())
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Predicate::Compare(Compare::Gt, value.into())
    }

    pub fn within<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Predicate::Within(values.into_iter().map(Into::into).collect())
    }

    /// Values a membership predicate tests against, if it is one.
    pub fn membership_values(&self) -> Option<&[Value]> {
        match self {
            Predicate::Within(values) | Predicate::Without(values) => Some(values),
            _ => None,
        }
    }

    /// Every value this predicate mentions, in textual order.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Predicate::Compare(_, v) => vec![v],
            Predicate::Within(vs) | Predicate::Without(vs) => vs.iter().collect(),
            Predicate::Between(a, b) | Predicate::Inside(a, b) | Predicate::Outside(a, b) => {
                vec![a, b]
            }
            Predicate::And(ps) | Predicate::Or(ps) => ps.iter().flat_map(|p| p.values()).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(values: &[Value]) -> String {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        }
        match self {
            Predicate::Compare(op, v) => write!(f, "{}({})", op.name(), v),
            Predicate::Exists => write!(f, "exists"),
            Predicate::NotExists => write!(f, "notExists"),
            Predicate::Within(vs) if vs.len() > 8 => write!(f, "within([{} values])", vs.len()),
            Predicate::Without(vs) if vs.len() > 8 => {
                write!(f, "without([{} values])", vs.len())
            }
            Predicate::Within(vs) => write!(f, "within({})", join(vs)),
            Predicate::Without(vs) => write!(f, "without({})", join(vs)),
            Predicate::Between(a, b) => write!(f, "between({},{})", a, b),
            Predicate::Inside(a, b) => write!(f, "inside({},{})", a, b),
            Predicate::Outside(a, b) => write!(f, "outside({},{})", a, b),
            Predicate::And(ps) | Predicate::Or(ps) => {
                let name = if matches!(self, Predicate::And(_)) {
                    "and"
                } else {
                    "or"
                };
                let parts = ps.iter().map(|p| p.to_string()).collect::<Vec<_>>();
                write!(f, "{}({})", name, parts.join(","))
            }
            Predicate::Text(t, s) => write!(f, "{}('{}')", t.name(), s),
            Predicate::FullText { query, .. } => write!(f, "fullText('{}')", query),
            Predicate::Lambda(code) => write!(f, "{{{}}}", code),
        }
    }
}

/// One `key predicate` pair of a has-filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HasContainer {
    pub key: String,
    pub predicate: Predicate,
}

impl HasContainer {
    pub fn new(key: impl Into<String>, predicate: Predicate) -> Self {
        HasContainer {
            key: key.into(),
            predicate,
        }
    }

    pub fn is_id(&self) -> bool {
        self.key == ID_KEY
    }

    pub fn is_label(&self) -> bool {
        self.key == LABEL_KEY
    }
}

impl fmt::Display for HasContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.key, self.predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_parse() {
        let record = RecordId::parse("public.Person:7", ElementKind::Vertex).unwrap();
        assert_eq!(record.table, TableRef::vertex("public", "Person"));
        assert_eq!(record.id, 7);
        assert_eq!(record.to_string(), "public.Person:7");

        let bare = RecordId::parse("knows:3", ElementKind::Edge).unwrap();
        assert_eq!(bare.table, TableRef::edge("public", "knows"));
        assert!(RecordId::parse("Person", ElementKind::Vertex).is_none());
        assert!(RecordId::parse("Person:x", ElementKind::Vertex).is_none());
    }

    #[test]
    fn test_sql_cmp_mixed_numbers_and_nulls() {
        assert_eq!(Value::Int(2).sql_cmp(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Null.sql_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(
            Value::from("b").sql_cmp(&Value::from("a")),
            Ordering::Greater
        );
    }

    #[test]
    fn test_predicate_values_in_textual_order() {
        let p = Predicate::Or(vec![
            Predicate::Compare(Compare::Lt, Value::Int(1)),
            Predicate::Compare(Compare::Gt, Value::Int(9)),
        ]);
        let values = p.values();
        assert_eq!(values, vec![&Value::Int(1), &Value::Int(9)]);
    }
}
