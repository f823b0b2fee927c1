pub mod config;
pub mod errors;
pub mod graph_schema;

// Re-export commonly used types
pub use config::GraphSchemaConfig;
pub use errors::GraphSchemaError;
pub use graph_schema::{
    Direction, EdgeTable, ElementKind, ForeignKey, PropertyType, TableLabels, TableRef,
    Topology, ID_COLUMN,
};
