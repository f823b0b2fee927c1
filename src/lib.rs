//! sqlgraph - compiles step-chain graph traversals into SQL
//!
//! Vertices and edges live in relational tables (`V_<label>`, `E_<label>`).
//! This crate provides:
//! - A text parser for Gremlin-style traversals
//! - A rewriter fusing hop/filter/order/range runs into compiled spans
//! - Query trees over the schema's foreign-key topology
//! - SQL generation per path-stack, with SQLite and ClickHouse dialects
//! - Result assembly back into labelled paths

pub mod config;
pub mod graph_catalog;
pub mod query_planner;
pub mod query_tree;
pub mod result;
pub mod sql_generator;
pub mod traversal;
