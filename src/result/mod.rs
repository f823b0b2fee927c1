//! Statement execution and path reconstruction.

pub mod assembler;
pub mod decoder;
pub mod element;
pub mod errors;
pub mod executor;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod window;

pub use assembler::ResultAssembler;
pub use element::{ElementFragment, PathRow};
pub use errors::ExecutionError;
pub use executor::{ResultSet, SqlExecutor};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;
