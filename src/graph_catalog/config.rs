//! YAML description of the vertex and edge labels backing a graph.
//!
//! ```yaml
//! schema: public
//! vertices:
//!   - label: Person
//!     properties: { name: string, age: integer }
//! edges:
//!   - label: knows
//!     properties: { since: integer }
//!     connections:
//!       - { out: Person, in: Person }
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::errors::GraphSchemaError;
use super::graph_schema::{PropertyType, TableRef, Topology, DEFAULT_SCHEMA};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSchemaConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub vertices: Vec<VertexLabelConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeLabelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexLabelConfig {
    pub label: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeLabelConfig {
    pub label: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyType>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// One `(out vertex, in vertex)` pair an edge label may connect.
/// Labels are bare (`Person`) or schema-qualified (`geo.City`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub out: String,
    #[serde(rename = "in")]
    pub in_label: String,
}

fn validate_identifier(identifier: &str, what: &str) -> Result<(), GraphSchemaError> {
    if IDENTIFIER.is_match(identifier) {
        Ok(())
    } else {
        Err(GraphSchemaError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: format!("{} must match [A-Za-z_][A-Za-z0-9_]*", what),
        })
    }
}

impl GraphSchemaConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, GraphSchemaError> {
        serde_yaml::from_str(content).map_err(|e| GraphSchemaError::ConfigParseError {
            error: e.to_string(),
        })
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, GraphSchemaError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GraphSchemaError::ConfigReadError {
                error: e.to_string(),
            })?;
        Self::from_yaml_str(&content)
    }

    fn qualify(&self, label: &str) -> (String, String) {
        match label.split_once('.') {
            Some((schema, bare)) => (schema.to_string(), bare.to_string()),
            None => (self.schema.clone(), label.to_string()),
        }
    }

    /// Validate identifiers and build the topology snapshot.
    pub fn build_topology(&self) -> Result<Topology, GraphSchemaError> {
        validate_identifier(&self.schema, "schema")?;
        let mut topology = Topology::new();

        for vertex in &self.vertices {
            let schema = vertex.schema.clone().unwrap_or_else(|| self.schema.clone());
            validate_identifier(&schema, "schema")?;
            validate_identifier(&vertex.label, "vertex label")?;
            for property in vertex.properties.keys() {
                validate_identifier(property, "property name")?;
            }
            topology.add_vertex_label(&schema, &vertex.label, vertex.properties.clone())?;
        }

        for edge in &self.edges {
            let schema = edge.schema.clone().unwrap_or_else(|| self.schema.clone());
            validate_identifier(&schema, "schema")?;
            validate_identifier(&edge.label, "edge label")?;
            for property in edge.properties.keys() {
                validate_identifier(property, "property name")?;
            }
            let connections = edge
                .connections
                .iter()
                .map(|c| {
                    let (out_schema, out_label) = self.qualify(&c.out);
                    let (in_schema, in_label) = self.qualify(&c.in_label);
                    (
                        TableRef::vertex(out_schema, out_label),
                        TableRef::vertex(in_schema, in_label),
                    )
                })
                .collect::<Vec<_>>();
            topology.add_edge_label(&schema, &edge.label, edge.properties.clone(), &connections)?;
        }

        log::debug!(
            "Built topology: {} vertex tables, {} edge tables",
            topology.tables(super::ElementKind::Vertex).len(),
            topology.tables(super::ElementKind::Edge).len()
        );
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::graph_schema::ElementKind;

    const SCHEMA: &str = r#"
schema: public
vertices:
  - label: Person
    properties: { name: string, age: integer }
  - label: City
    schema: geo
    properties: { name: string }
edges:
  - label: knows
    properties: { since: integer }
    connections:
      - { out: Person, in: Person }
  - label: livesIn
    connections:
      - { out: Person, in: geo.City }
"#;

    #[test]
    fn test_parse_and_build() {
        let config = GraphSchemaConfig::from_yaml_str(SCHEMA).unwrap();
        let topology = config.build_topology().unwrap();

        let city = TableRef::vertex("geo", "City");
        assert!(topology.contains(&city));
        let labels = topology.table_labels(&city).unwrap();
        assert!(labels.in_edges.contains(&TableRef::edge("public", "livesIn")));
        assert_eq!(topology.tables(ElementKind::Edge).len(), 2);
        assert_eq!(
            topology
                .properties(&TableRef::vertex("public", "Person"))
                .unwrap()
                .get("age"),
            Some(&PropertyType::Integer)
        );
    }

    #[test]
    fn test_rejects_bad_identifier() {
        let yaml = "vertices:\n  - label: \"Bad Label\"\n";
        let config = GraphSchemaConfig::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            config.build_topology(),
            Err(GraphSchemaError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_rejects_dangling_connection() {
        let yaml = "edges:\n  - label: knows\n    connections:\n      - { out: Person, in: Person }\n";
        let config = GraphSchemaConfig::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            config.build_topology(),
            Err(GraphSchemaError::InvalidConnection { .. })
        ));
    }
}
