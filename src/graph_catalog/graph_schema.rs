use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::errors::GraphSchemaError;

pub const VERTEX_PREFIX: &str = "V_";
pub const EDGE_PREFIX: &str = "E_";
pub const ID_COLUMN: &str = "ID";
pub const IN_VERTEX_SUFFIX: &str = "__I";
pub const OUT_VERTEX_SUFFIX: &str = "__O";
pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Vertex,
    Edge,
}

impl ElementKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ElementKind::Vertex => VERTEX_PREFIX,
            ElementKind::Edge => EDGE_PREFIX,
        }
    }
}

/// Traversal direction. `Both` is only valid in step definitions; every
/// query tree node carries a resolved `Out` or `In`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }

    /// Foreign-key column suffix for a resolved direction.
    pub fn fk_suffix(&self) -> Option<&'static str> {
        match self {
            Direction::Out => Some(OUT_VERTEX_SUFFIX),
            Direction::In => Some(IN_VERTEX_SUFFIX),
            Direction::Both => None,
        }
    }

    /// Directions a step direction resolves to, in emission order.
    pub fn resolved(&self) -> &'static [Direction] {
        match self {
            Direction::Out => &[Direction::Out],
            Direction::In => &[Direction::In],
            Direction::Both => &[Direction::Out, Direction::In],
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Out => write!(f, "OUT"),
            Direction::In => write!(f, "IN"),
            Direction::Both => write!(f, "BOTH"),
        }
    }
}

/// Schema-qualified vertex or edge table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub label: String,
    pub kind: ElementKind,
}

impl TableRef {
    pub fn vertex(schema: impl Into<String>, label: impl Into<String>) -> Self {
        TableRef {
            schema: schema.into(),
            label: label.into(),
            kind: ElementKind::Vertex,
        }
    }

    pub fn edge(schema: impl Into<String>, label: impl Into<String>) -> Self {
        TableRef {
            schema: schema.into(),
            label: label.into(),
            kind: ElementKind::Edge,
        }
    }

    /// Physical table name, e.g. `V_Person` or `E_knows`.
    pub fn table_name(&self) -> String {
        format!("{}{}", self.kind.prefix(), self.label)
    }

    pub fn is_vertex(&self) -> bool {
        self.kind == ElementKind::Vertex
    }

    pub fn is_edge(&self) -> bool {
        self.kind == ElementKind::Edge
    }

    /// Matches either a bare label (`knows`) or a schema-qualified one (`public.knows`).
    pub fn matches_label(&self, label: &str) -> bool {
        match label.split_once('.') {
            Some((schema, bare)) => self.schema == schema && self.label == bare,
            None => self.label == label,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table_name())
    }
}

/// Foreign-key column on an edge table pointing at one endpoint vertex table.
/// The column is named `<schema>.<label>__O` for the out-vertex and `__I` for
/// the in-vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForeignKey {
    pub vertex: TableRef,
    pub direction: Direction,
}

impl ForeignKey {
    pub fn new(vertex: TableRef, direction: Direction) -> Self {
        ForeignKey { vertex, direction }
    }

    pub fn column(&self) -> String {
        format!(
            "{}.{}{}",
            self.vertex.schema,
            self.vertex.label,
            self.direction.fk_suffix().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Integer,
    Float,
    String,
    Boolean,
}

/// In and out edge tables incident to one vertex table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableLabels {
    pub in_edges: BTreeSet<TableRef>,
    pub out_edges: BTreeSet<TableRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeTable {
    pub properties: BTreeMap<String, PropertyType>,
    pub foreign_keys: BTreeSet<ForeignKey>,
}

/// Read-only snapshot of the vertex/edge tables and the foreign-key graph
/// between them.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    vertices: BTreeMap<TableRef, BTreeMap<String, PropertyType>>,
    edges: BTreeMap<TableRef, EdgeTable>,
    table_labels: BTreeMap<TableRef, TableLabels>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex_label(
        &mut self,
        schema: &str,
        label: &str,
        properties: BTreeMap<String, PropertyType>,
    ) -> Result<TableRef, GraphSchemaError> {
        let table = TableRef::vertex(schema, label);
        if self.vertices.contains_key(&table) {
            return Err(GraphSchemaError::DuplicateLabel {
                schema: schema.to_string(),
                label: label.to_string(),
            });
        }
        self.vertices.insert(table.clone(), properties);
        self.table_labels.entry(table.clone()).or_default();
        Ok(table)
    }

    /// Register an edge label connecting `(out, in)` vertex table pairs.
    /// Adding the same edge label again merges its connections.
    pub fn add_edge_label(
        &mut self,
        schema: &str,
        label: &str,
        properties: BTreeMap<String, PropertyType>,
        connections: &[(TableRef, TableRef)],
    ) -> Result<TableRef, GraphSchemaError> {
        let table = TableRef::edge(schema, label);
        for (out_vertex, in_vertex) in connections {
            for vertex in [out_vertex, in_vertex] {
                if !self.vertices.contains_key(vertex) {
                    return Err(GraphSchemaError::InvalidConnection {
                        edge: table.to_string(),
                        vertex: vertex.to_string(),
                    });
                }
            }
        }

        let entry = self.edges.entry(table.clone()).or_default();
        entry.properties.extend(properties);
        for (out_vertex, in_vertex) in connections {
            entry
                .foreign_keys
                .insert(ForeignKey::new(out_vertex.clone(), Direction::Out));
            entry
                .foreign_keys
                .insert(ForeignKey::new(in_vertex.clone(), Direction::In));
            self.table_labels
                .entry(out_vertex.clone())
                .or_default()
                .out_edges
                .insert(table.clone());
            self.table_labels
                .entry(in_vertex.clone())
                .or_default()
                .in_edges
                .insert(table.clone());
        }
        Ok(table)
    }

    pub fn contains(&self, table: &TableRef) -> bool {
        match table.kind {
            ElementKind::Vertex => self.vertices.contains_key(table),
            ElementKind::Edge => self.edges.contains_key(table),
        }
    }

    /// Columns available for projection and filtering, excluding `ID` and
    /// foreign keys.
    pub fn properties(&self, table: &TableRef) -> Option<&BTreeMap<String, PropertyType>> {
        match table.kind {
            ElementKind::Vertex => self.vertices.get(table),
            ElementKind::Edge => self.edges.get(table).map(|e| &e.properties),
        }
    }

    pub fn table_labels(&self, vertex: &TableRef) -> Option<&TableLabels> {
        self.table_labels.get(vertex)
    }

    pub fn edge_foreign_keys(&self, edge: &TableRef) -> Option<&BTreeSet<ForeignKey>> {
        self.edges.get(edge).map(|e| &e.foreign_keys)
    }

    /// Edge tables holding a foreign key into `vertex`, with that key.
    pub fn foreign_keys_into(&self, vertex: &TableRef) -> Vec<(TableRef, ForeignKey)> {
        self.edges
            .iter()
            .flat_map(|(edge, def)| {
                def.foreign_keys
                    .iter()
                    .filter(|fk| &fk.vertex == vertex)
                    .map(move |fk| (edge.clone(), fk.clone()))
            })
            .collect()
    }

    pub fn tables(&self, kind: ElementKind) -> Vec<TableRef> {
        match kind {
            ElementKind::Vertex => self.vertices.keys().cloned().collect(),
            ElementKind::Edge => self.edges.keys().cloned().collect(),
        }
    }

    /// Resolve a `schema.label` or bare label to a table of the given kind.
    pub fn resolve(&self, kind: ElementKind, label: &str) -> Result<TableRef, GraphSchemaError> {
        self.tables(kind)
            .into_iter()
            .find(|t| t.matches_label(label))
            .ok_or_else(|| match kind {
                ElementKind::Vertex => GraphSchemaError::Vertex {
                    label: label.to_string(),
                },
                ElementKind::Edge => GraphSchemaError::Edge {
                    label: label.to_string(),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_knows_person() -> Topology {
        let mut topology = Topology::new();
        let person = topology
            .add_vertex_label(
                "public",
                "Person",
                [("age".to_string(), PropertyType::Integer)].into_iter().collect(),
            )
            .unwrap();
        topology
            .add_edge_label("public", "knows", BTreeMap::new(), &[(person.clone(), person)])
            .unwrap();
        topology
    }

    #[test]
    fn test_foreign_key_column_naming() {
        let fk = ForeignKey::new(TableRef::vertex("public", "Person"), Direction::Out);
        assert_eq!(fk.column(), "public.Person__O");
        let fk = ForeignKey::new(TableRef::vertex("geo", "City"), Direction::In);
        assert_eq!(fk.column(), "geo.City__I");
    }

    #[test]
    fn test_self_loop_edge_registers_both_sides() {
        let topology = person_knows_person();
        let person = TableRef::vertex("public", "Person");
        let knows = TableRef::edge("public", "knows");

        let labels = topology.table_labels(&person).unwrap();
        assert!(labels.in_edges.contains(&knows));
        assert!(labels.out_edges.contains(&knows));
        assert_eq!(topology.edge_foreign_keys(&knows).unwrap().len(), 2);
    }

    #[test]
    fn test_edge_to_unknown_vertex_is_rejected() {
        let mut topology = Topology::new();
        let err = topology
            .add_edge_label(
                "public",
                "knows",
                BTreeMap::new(),
                &[(
                    TableRef::vertex("public", "Ghost"),
                    TableRef::vertex("public", "Ghost"),
                )],
            )
            .unwrap_err();
        assert!(matches!(err, GraphSchemaError::InvalidConnection { .. }));
    }

    #[test]
    fn test_matches_label_with_schema() {
        let table = TableRef::vertex("public", "Person");
        assert!(table.matches_label("Person"));
        assert!(table.matches_label("public.Person"));
        assert!(!table.matches_label("other.Person"));
        assert_eq!(table.to_string(), "public.V_Person");
    }
}
