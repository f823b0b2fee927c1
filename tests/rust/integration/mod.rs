//! Integration tests - parser, rewriter, query trees and SQL generation
//! working together over a YAML-described graph.
//!
//! Nothing here needs a database; statements are checked for shape only.

use sqlgraph::config::CompilerConfig;
use sqlgraph::graph_catalog::{GraphSchemaConfig, Topology};
use sqlgraph::query_planner::{RewriteOutcome, StepChainRewriter};
use sqlgraph::sql_generator::{plan_runs, QueryPlan};
use sqlgraph::traversal::parse_traversal;

mod fusion_tests;
mod sql_generation_tests;
mod tree_tests;

pub const SCHEMA: &str = r#"
schema: public
vertices:
  - label: Person
    properties: { name: string, age: integer }
  - label: Software
    properties: { name: string, lang: string }
  - label: City
    properties: { name: string }
edges:
  - label: knows
    properties: { since: integer }
    connections:
      - { out: Person, in: Person }
  - label: created
    properties: { weight: float }
    connections:
      - { out: Person, in: Software }
  - label: livesIn
    connections:
      - { out: Person, in: City }
"#;

pub fn topology() -> Topology {
    GraphSchemaConfig::from_yaml_str(SCHEMA)
        .and_then(|config| config.build_topology())
        .expect("test schema is valid")
}

pub fn rewrite_with(text: &str, config: &CompilerConfig) -> RewriteOutcome {
    let traversal = parse_traversal(text).expect("traversal parses");
    StepChainRewriter::new(config).rewrite(traversal)
}

pub fn rewrite(text: &str) -> RewriteOutcome {
    rewrite_with(text, &CompilerConfig::default())
}

pub fn plans_with(text: &str, config: &CompilerConfig) -> Vec<QueryPlan> {
    plan_runs(&rewrite_with(text, config), &topology(), config).expect("traversal plans")
}

pub fn plans(text: &str) -> Vec<QueryPlan> {
    plans_with(text, &CompilerConfig::default())
}
