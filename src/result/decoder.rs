//! Result rows back into element fragments.
//!
//! Column names are aliases; the statement's alias map says which element,
//! which depth and which column each one belongs to.

use std::collections::BTreeMap;

use super::element::ElementFragment;
use super::errors::ExecutionError;
use crate::graph_catalog::{Direction, TableRef};
use crate::query_tree::AliasColumn;
use crate::sql_generator::{CompiledQuery, FragmentKey};
use crate::traversal::{RecordId, SortOrder, Value};

#[derive(Debug)]
struct FragmentLayout {
    key: FragmentKey,
    id: usize,
    properties: Vec<(String, usize)>,
    out_vertices: Vec<(TableRef, usize)>,
    in_vertices: Vec<(TableRef, usize)>,
}

/// Column positions for one statement's result set, resolved once.
#[derive(Debug)]
pub struct RowDecoder {
    layouts: Vec<FragmentLayout>,
    sort_columns: Vec<(usize, SortOrder)>,
}

/// Fragments of one row plus its in-memory sort key.
pub type DecodedRow = (Vec<ElementFragment>, Vec<(Value, SortOrder)>);

impl RowDecoder {
    pub fn new(query: &CompiledQuery, columns: &[String]) -> Result<Self, ExecutionError> {
        let position = |alias: &str| columns.iter().position(|c| c == alias);

        let mut layouts = Vec::with_capacity(query.fragments.len());
        for fragment in &query.fragments {
            let mut id = None;
            let mut properties = Vec::new();
            let mut out_vertices = Vec::new();
            let mut in_vertices = Vec::new();
            for (alias, key) in query.aliases.iter().filter(|(_, k)| fragment.owns(k)) {
                // carry-only columns stay inside sub-selects
                let Some(index) = position(alias) else {
                    continue;
                };
                match &key.column {
                    AliasColumn::Id => id = Some(index),
                    AliasColumn::Property(name) => properties.push((name.clone(), index)),
                    AliasColumn::ForeignKey(fk) => match fk.direction {
                        Direction::Out => out_vertices.push((fk.vertex.clone(), index)),
                        Direction::In => in_vertices.push((fk.vertex.clone(), index)),
                        Direction::Both => {
                            return Err(ExecutionError::Decode(format!(
                                "column {} has no single endpoint",
                                alias
                            )))
                        }
                    },
                }
            }
            let id = id.ok_or_else(|| {
                ExecutionError::Decode(format!(
                    "no ID column for {} at depth {}",
                    fragment.table, fragment.depth
                ))
            })?;
            layouts.push(FragmentLayout {
                key: fragment.clone(),
                id,
                properties,
                out_vertices,
                in_vertices,
            });
        }

        let mut sort_columns = Vec::with_capacity(query.order_by.len());
        for (alias, order) in &query.order_by {
            let index = position(alias).ok_or_else(|| {
                ExecutionError::Decode(format!("sort column {} is not in the result", alias))
            })?;
            sort_columns.push((index, *order));
        }

        Ok(RowDecoder {
            layouts,
            sort_columns,
        })
    }

    fn cell<'r>(row: &'r [Value], index: usize) -> Result<&'r Value, ExecutionError> {
        row.get(index).ok_or_else(|| {
            ExecutionError::Decode(format!("row has {} column(s), wanted #{}", row.len(), index))
        })
    }

    fn endpoint(
        row: &[Value],
        candidates: &[(TableRef, usize)],
    ) -> Result<Option<RecordId>, ExecutionError> {
        for (table, index) in candidates {
            if let Some(id) = Self::cell(row, *index)?.as_i64() {
                return Ok(Some(RecordId::new(table.clone(), id)));
            }
        }
        Ok(None)
    }

    /// Fragments whose `ID` is NULL are left out.
    pub fn decode(&self, row: &[Value]) -> Result<DecodedRow, ExecutionError> {
        let mut fragments = Vec::with_capacity(self.layouts.len());
        for layout in &self.layouts {
            let id = match Self::cell(row, layout.id)? {
                Value::Null => {
                    log::trace!("NULL id for {}, skipping fragment", layout.key.table);
                    continue;
                }
                value => value.as_i64().ok_or_else(|| {
                    ExecutionError::Decode(format!(
                        "ID of {} is not an integer: {}",
                        layout.key.table, value
                    ))
                })?,
            };

            let mut properties = BTreeMap::new();
            for (name, index) in &layout.properties {
                properties.insert(name.clone(), Self::cell(row, *index)?.clone());
            }
            fragments.push(ElementFragment {
                kind: layout.key.table.kind,
                record: RecordId::new(layout.key.table.clone(), id),
                properties,
                labels: layout
                    .key
                    .labels
                    .iter()
                    .filter(|l| l.is_user())
                    .map(|l| l.name.clone())
                    .collect(),
                depth: layout.key.depth,
                out_vertex: Self::endpoint(row, &layout.out_vertices)?,
                in_vertex: Self::endpoint(row, &layout.in_vertices)?,
            });
        }

        let mut sort_key = Vec::with_capacity(self.sort_columns.len());
        for (index, order) in &self.sort_columns {
            sort_key.push((Self::cell(row, *index)?.clone(), *order));
        }
        Ok((fragments, sort_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::{ForeignKey, TableRef};
    use crate::query_tree::{AliasKey, LabelKind, Phase, RootBinding, StepLabel};
    use std::collections::BTreeSet;

    fn query() -> CompiledQuery {
        let person = TableRef::vertex("public", "Person");
        let knows = TableRef::edge("public", "knows");
        let labels = BTreeSet::from([StepLabel::new(1, "e", LabelKind::User)]);
        let key = |table: &TableRef, column, labels: &BTreeSet<StepLabel>, depth| AliasKey {
            depth,
            table: table.clone(),
            column,
            labels: labels.clone(),
        };
        let aliases = BTreeMap::from([
            ("alias1".to_string(), key(&knows, AliasColumn::Id, &labels, 1)),
            (
                "alias2".to_string(),
                key(
                    &knows,
                    AliasColumn::ForeignKey(ForeignKey::new(person.clone(), Direction::Out)),
                    &labels,
                    1,
                ),
            ),
            ("alias3".to_string(), key(&person, AliasColumn::Id, &BTreeSet::new(), 2)),
            (
                "alias4".to_string(),
                key(&person, AliasColumn::Property("age".into()), &BTreeSet::new(), 2),
            ),
        ]);
        CompiledQuery {
            phase: Phase::Regular,
            sql: String::new(),
            parameters: Vec::new(),
            aliases,
            fragments: vec![
                FragmentKey {
                    depth: 1,
                    table: knows,
                    labels,
                },
                FragmentKey {
                    depth: 2,
                    table: person,
                    labels: BTreeSet::new(),
                },
            ],
            order_by: vec![("alias4".to_string(), SortOrder::Desc)],
            range: None,
            range_stripped: false,
            bulk_tables: Vec::new(),
            root_table: TableRef::vertex("public", "Person"),
            root_binding: RootBinding::Unconstrained,
        }
    }

    fn columns() -> Vec<String> {
        ["alias1", "alias2", "alias3", "alias4"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_decode_edge_and_vertex() {
        let decoder = RowDecoder::new(&query(), &columns()).unwrap();
        let (fragments, sort_key) = decoder
            .decode(&[Value::Int(10), Value::Int(1), Value::Int(3), Value::Int(35)])
            .unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].labels, BTreeSet::from(["e".to_string()]));
        assert_eq!(fragments[0].out_vertex.as_ref().map(|r| r.id), Some(1));
        assert_eq!(fragments[0].in_vertex, None);
        assert_eq!(fragments[1].id(), 3);
        assert_eq!(fragments[1].property("age"), Some(&Value::Int(35)));
        assert_eq!(sort_key, vec![(Value::Int(35), SortOrder::Desc)]);
    }

    #[test]
    fn test_null_id_skips_fragment() {
        let decoder = RowDecoder::new(&query(), &columns()).unwrap();
        let (fragments, _) = decoder
            .decode(&[Value::Null, Value::Null, Value::Int(3), Value::Int(35)])
            .unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].depth, 2);
    }

    #[test]
    fn test_missing_sort_column_is_an_error() {
        let mut columns = columns();
        columns.pop();
        let err = RowDecoder::new(&query(), &columns).unwrap_err();
        assert!(matches!(err, ExecutionError::Decode(_)));
    }
}
