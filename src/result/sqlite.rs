//! [`SqlExecutor`] over an embedded SQLite connection.
//!
//! Graph tables are addressed as `"schema"."V_Label"`, so every graph schema
//! has to exist as an attached database.

use std::path::Path;

use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection};

use super::errors::ExecutionError;
use super::executor::{ResultSet, SqlExecutor};
use crate::graph_catalog::{ElementKind, TableRef, Topology, ID_COLUMN};
use crate::sql_generator::{SqlDialect, SqliteDialect};
use crate::traversal::Value;

const BULK_SAVEPOINT: &str = "bulk_load";

pub struct SqliteExecutor {
    conn: Connection,
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(x) => SqliteValue::Real(*x),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Id(record) => SqliteValue::Integer(record.id),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Result<Value, ExecutionError> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(x) => Value::Float(x),
        ValueRef::Text(bytes) => Value::String(
            std::str::from_utf8(bytes)
                .map_err(|e| ExecutionError::Decode(e.to_string()))?
                .to_string(),
        ),
        ValueRef::Blob(_) => {
            return Err(ExecutionError::Decode(
                "BLOB columns are not graph properties".to_string(),
            ))
        }
    })
}

impl SqliteExecutor {
    pub fn from_connection(conn: Connection) -> Self {
        SqliteExecutor { conn }
    }

    /// Fresh in-memory database with one empty attached database per schema.
    pub fn open_in_memory(schemas: &[&str]) -> Result<Self, ExecutionError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ExecutionError::sql_with_context(":memory:", e))?;
        let executor = SqliteExecutor { conn };
        for schema in schemas {
            executor.attach(":memory:", schema)?;
        }
        Ok(executor)
    }

    /// Open a database file and expose it under every schema name, so
    /// `"public"."V_Person"` resolves to the file's `V_Person` table.
    pub fn open(path: impl AsRef<Path>, schemas: &[&str]) -> Result<Self, ExecutionError> {
        let path = path.as_ref().to_string_lossy().to_string();
        let conn =
            Connection::open(&path).map_err(|e| ExecutionError::sql_with_context(&path, e))?;
        let executor = SqliteExecutor { conn };
        for schema in schemas {
            executor.attach(&path, schema)?;
        }
        Ok(executor)
    }

    fn attach(&self, location: &str, schema: &str) -> Result<(), ExecutionError> {
        let sql = format!("ATTACH DATABASE ? AS {}", SqliteDialect.quote(schema));
        self.conn
            .execute(&sql, [location])
            .map_err(|e| ExecutionError::sql_with_context(&sql, e))?;
        log::debug!("Attached {} as schema {}", location, schema);
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create every table of `topology`: `ID` primary key, typed properties
    /// and, for edges, one integer column per foreign key.
    pub fn create_tables(&self, topology: &Topology) -> Result<(), ExecutionError> {
        let dialect = SqliteDialect;
        for kind in [ElementKind::Vertex, ElementKind::Edge] {
            for table in topology.tables(kind) {
                let mut columns = vec![format!("{} INTEGER PRIMARY KEY", dialect.quote(ID_COLUMN))];
                for (name, property_type) in topology.properties(&table).into_iter().flatten() {
                    columns.push(format!(
                        "{} {}",
                        dialect.quote(name),
                        dialect.column_type(*property_type)
                    ));
                }
                for fk in topology.edge_foreign_keys(&table).into_iter().flatten() {
                    columns.push(format!("{} INTEGER", dialect.quote(&fk.column())));
                }
                let sql = format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    dialect.table(&table),
                    columns.join(", ")
                );
                self.execute(&sql, &[])?;
            }
        }
        Ok(())
    }

    /// Insert one element row; `columns` are property or foreign-key column
    /// names.
    pub fn insert_element(
        &self,
        table: &TableRef,
        id: i64,
        columns: &[(&str, Value)],
    ) -> Result<(), ExecutionError> {
        let dialect = SqliteDialect;
        let mut names = vec![dialect.quote(ID_COLUMN)];
        let mut values = vec![Value::Int(id)];
        for (name, value) in columns {
            names.push(dialect.quote(name));
            values.push(value.clone());
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.table(table),
            names.join(", "),
            placeholders
        );
        self.execute(&sql, &values)?;
        Ok(())
    }
}

impl SqlExecutor for SqliteExecutor {
    fn query(&self, sql: &str, params: &[Value]) -> Result<ResultSet, ExecutionError> {
        let wrap = |e: rusqlite::Error| ExecutionError::sql_with_context(sql, e);
        let mut statement = self.conn.prepare(sql).map_err(wrap)?;
        let columns = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();

        let mut rows = statement
            .query(params_from_iter(params.iter().map(to_sqlite)))
            .map_err(wrap)?;
        let mut decoded = Vec::new();
        while let Some(row) = rows.next().map_err(wrap)? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_sqlite(row.get_ref(i).map_err(wrap)?)?);
            }
            decoded.push(values);
        }
        log::trace!("{} row(s) from {}", decoded.len(), sql);
        Ok(ResultSet::new(columns, decoded))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, ExecutionError> {
        self.conn
            .execute(sql, params_from_iter(params.iter().map(to_sqlite)))
            .map_err(|e| ExecutionError::sql_with_context(sql, e))
    }

    fn materialize_bulk_table(
        &self,
        create_sql: &str,
        insert_sql: &str,
        rows: &[Value],
    ) -> Result<(), ExecutionError> {
        self.execute(create_sql, &[])?;
        let savepoint = format!("SAVEPOINT {}", BULK_SAVEPOINT);
        self.conn
            .execute_batch(&savepoint)
            .map_err(|e| ExecutionError::sql_with_context(&savepoint, e))?;

        let load = || -> Result<(), rusqlite::Error> {
            let mut insert = self.conn.prepare_cached(insert_sql)?;
            for value in rows {
                insert.execute([to_sqlite(value)])?;
            }
            Ok(())
        };
        let finish = match load() {
            Ok(()) => format!("RELEASE {}", BULK_SAVEPOINT),
            Err(e) => {
                let rollback = format!("ROLLBACK TO {0}; RELEASE {0}", BULK_SAVEPOINT);
                if let Err(rollback_err) = self.conn.execute_batch(&rollback) {
                    log::warn!("Rolling back bulk load failed: {}", rollback_err);
                }
                return Err(ExecutionError::sql_with_context(insert_sql, e));
            }
        };
        self.conn
            .execute_batch(&finish)
            .map_err(|e| ExecutionError::sql_with_context(&finish, e))?;
        log::debug!("Loaded {} row(s) via {}", rows.len(), insert_sql);
        Ok(())
    }
}
