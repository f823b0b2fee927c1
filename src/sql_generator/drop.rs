//! `drop()` compiled into DELETE statements.
//!
//! The ids of the dropped elements are first collected from the query
//! results into a temp table; deletes then join against it. Removing a vertex
//! also removes every edge row pointing at it.

use std::collections::BTreeSet;

use super::bulk::WITHIN_COLUMN;
use super::dialect::SqlDialect;
use crate::graph_catalog::{PropertyType, TableRef, Topology, ID_COLUMN};

/// Deletes for the elements of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct DropTarget {
    pub table: TableRef,
    pub id_table: String,
    pub create_sql: String,
    pub insert_sql: String,
    /// Dependent edges first, the table itself last.
    pub deletes: Vec<String>,
    pub cleanup_sql: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropPlan {
    pub targets: Vec<DropTarget>,
}

impl DropPlan {
    pub fn build<'a>(
        tables: impl IntoIterator<Item = &'a TableRef>,
        topology: &Topology,
        dialect: &dyn SqlDialect,
    ) -> Self {
        let tables: BTreeSet<&TableRef> = tables.into_iter().collect();
        let targets = tables
            .into_iter()
            .map(|table| DropTarget::new(table, topology, dialect))
            .collect();
        DropPlan { targets }
    }

    pub fn target(&self, table: &TableRef) -> Option<&DropTarget> {
        self.targets.iter().find(|t| &t.table == table)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl DropTarget {
    fn new(table: &TableRef, topology: &Topology, dialect: &dyn SqlDialect) -> Self {
        let id_table = format!("drop_{}", uuid::Uuid::new_v4().simple());
        let ids = format!(
            "SELECT {} FROM {}",
            dialect.quote(WITHIN_COLUMN),
            dialect.quote(&id_table)
        );

        let mut deletes = Vec::new();
        if table.is_vertex() {
            for (edge, fk) in topology.foreign_keys_into(table) {
                deletes.push(format!(
                    "DELETE FROM {} WHERE {} IN ({})",
                    dialect.table(&edge),
                    dialect.quote(&fk.column()),
                    ids
                ));
            }
        }
        deletes.push(format!(
            "DELETE FROM {} WHERE {} IN ({})",
            dialect.table(table),
            dialect.quote(ID_COLUMN),
            ids
        ));

        DropTarget {
            table: table.clone(),
            create_sql: dialect.create_temp_table(&id_table, WITHIN_COLUMN, PropertyType::Integer),
            insert_sql: dialect.insert_temp_row(&id_table, WITHIN_COLUMN),
            cleanup_sql: dialect.drop_temp_table(&id_table),
            id_table,
            deletes,
        }
    }
}
