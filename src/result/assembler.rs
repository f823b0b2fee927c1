//! Executes a [`QueryPlan`] and turns its rows into result paths.
//!
//! Statements run in plan order, so REGULAR rows come before OPTIONAL rows
//! and those before EMIT rows. Lazy mode holds one statement's rows at a
//! time. Eager mode, and any plan with an in-memory window, reads everything
//! before the first row is handed out.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use super::decoder::RowDecoder;
use super::element::{ElementFragment, PathRow};
use super::errors::ExecutionError;
use super::executor::SqlExecutor;
use super::window::apply_window;
use crate::config::CompilerConfig;
use crate::graph_catalog::TableRef;
use crate::query_tree::RootBinding;
use crate::sql_generator::{DropPlan, QueryPlan, SqlDialect};
use crate::traversal::{RecordId, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Execution {
    statement: usize,
    root_id: Option<i64>,
}

pub struct ResultAssembler<'a> {
    executor: &'a dyn SqlExecutor,
    dialect: &'a dyn SqlDialect,
    plan: QueryPlan,
    lazy: bool,
    incoming: Option<Vec<RecordId>>,
    pending: Option<VecDeque<Execution>>,
    buffer: VecDeque<PathRow>,
    loaded: HashSet<usize>,
    temp_tables: Vec<String>,
    previous: Vec<ElementFragment>,
    finished: bool,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(
        executor: &'a dyn SqlExecutor,
        dialect: &'a dyn SqlDialect,
        plan: QueryPlan,
        config: &CompilerConfig,
    ) -> Self {
        ResultAssembler {
            executor,
            dialect,
            plan,
            lazy: config.lazy_results,
            incoming: None,
            pending: None,
            buffer: VecDeque::new(),
            loaded: HashSet::new(),
            temp_tables: Vec::new(),
            previous: Vec::new(),
            finished: false,
        }
    }

    /// Elements arriving from the previous step; each statement rooted at an
    /// incoming step runs once per element of its root table.
    pub fn with_incoming(mut self, records: impl IntoIterator<Item = RecordId>) -> Self {
        self.incoming = Some(records.into_iter().collect());
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    fn schedule(&self) -> Result<VecDeque<Execution>, ExecutionError> {
        let mut executions = VecDeque::new();
        for (statement, query) in self.plan.statements.iter().enumerate() {
            match &query.root_binding {
                RootBinding::Unconstrained => executions.push_back(Execution {
                    statement,
                    root_id: None,
                }),
                RootBinding::Ids(ids) => executions.extend(ids.iter().map(|id| Execution {
                    statement,
                    root_id: Some(*id),
                })),
                RootBinding::Incoming => {
                    let incoming = self
                        .incoming
                        .as_ref()
                        .ok_or_else(|| ExecutionError::MissingBinding(query.sql.clone()))?;
                    executions.extend(
                        incoming
                            .iter()
                            .filter(|r| r.table == query.root_table)
                            .map(|r| Execution {
                                statement,
                                root_id: Some(r.id),
                            }),
                    );
                }
            }
        }
        Ok(executions)
    }

    fn load_bulk_tables(&mut self, statement: usize) -> Result<(), ExecutionError> {
        if !self.loaded.insert(statement) {
            return Ok(());
        }
        let Some(query) = self.plan.statements.get(statement) else {
            return Ok(());
        };
        for bulk in &query.bulk_tables {
            let create = self
                .dialect
                .create_temp_table(&bulk.name, bulk.column(), bulk.column_type);
            let insert = self.dialect.insert_temp_row(&bulk.name, bulk.column());
            self.executor
                .materialize_bulk_table(&create, &insert, &bulk.values)?;
            self.temp_tables.push(bulk.name.clone());
            log::debug!("Materialized {}", bulk);
        }
        Ok(())
    }

    /// Full (unshared) rows of one execution.
    fn run(&mut self, execution: Execution) -> Result<Vec<PathRow>, ExecutionError> {
        self.load_bulk_tables(execution.statement)?;
        let query = self.plan.statements.get(execution.statement).ok_or_else(|| {
            ExecutionError::Decode(format!("no statement #{}", execution.statement))
        })?;

        let params = query.bind(execution.root_id)?;
        log::debug!("Executing {} with {:?}", query, params);
        let result = self.executor.query(&query.sql, &params)?;
        let decoder = RowDecoder::new(query, &result.columns)?;

        let mut rows = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let (fragments, sort_key) = decoder.decode(row)?;
            if fragments.is_empty() {
                continue;
            }
            rows.push(PathRow {
                phase: query.phase,
                shared_prefix: 0,
                fragments,
                sort_key,
            });
        }
        log::trace!("{} row(s) decoded for {}", rows.len(), query.phase);
        Ok(rows)
    }

    fn drain(&mut self, pending: &mut VecDeque<Execution>) -> Result<Vec<PathRow>, ExecutionError> {
        let mut rows = Vec::new();
        while let Some(execution) = pending.pop_front() {
            rows.extend(self.run(execution)?);
        }
        Ok(rows)
    }

    fn run_drop(&mut self, drop: &DropPlan, rows: Vec<PathRow>) -> Result<(), ExecutionError> {
        let mut ids: BTreeMap<TableRef, BTreeSet<i64>> = BTreeMap::new();
        for row in rows {
            if let Some(terminal) = row.terminal() {
                ids.entry(terminal.record.table.clone())
                    .or_default()
                    .insert(terminal.id());
            }
        }

        for target in &drop.targets {
            let Some(table_ids) = ids.get(&target.table) else {
                continue;
            };
            let values: Vec<Value> = table_ids.iter().copied().map(Value::Int).collect();
            self.executor
                .materialize_bulk_table(&target.create_sql, &target.insert_sql, &values)?;
            let mut removed = 0;
            let result = target
                .deletes
                .iter()
                .try_for_each(|delete| self.executor.execute(delete, &[]).map(|n| removed += n));
            if let Err(e) = self.executor.execute(&target.cleanup_sql, &[]) {
                log::warn!("Could not drop {}: {}", target.id_table, e);
            }
            result?;
            log::info!(
                "Dropped {} {} element(s), {} row(s) deleted",
                values.len(),
                target.table,
                removed
            );
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), ExecutionError> {
        let mut pending = self.schedule()?;
        log::debug!(
            "{} statement(s), {} execution(s), {} mode",
            self.plan.statements.len(),
            pending.len(),
            if self.lazy { "lazy" } else { "eager" }
        );

        if let Some(drop) = self.plan.drop.clone() {
            let rows = self.drain(&mut pending)?;
            self.run_drop(&drop, rows)?;
        } else if !self.lazy || self.plan.window.is_some() {
            let mut rows = self.drain(&mut pending)?;
            if let Some(window) = &self.plan.window {
                rows = apply_window(rows, window);
            }
            self.buffer.extend(rows);
        }
        self.pending = Some(pending);
        Ok(())
    }

    /// Ensure a row is buffered; `false` once everything is consumed.
    fn fill(&mut self) -> Result<bool, ExecutionError> {
        while self.buffer.is_empty() {
            let Some(execution) = self.pending.as_mut().and_then(|p| p.pop_front()) else {
                return Ok(false);
            };
            let rows = self.run(execution)?;
            self.buffer.extend(rows);
        }
        Ok(true)
    }

    /// Leave out the leading fragments this row shares with the previous
    /// one. The terminal fragment is always kept.
    fn share_prefix(&mut self, mut row: PathRow) -> PathRow {
        let limit = row.fragments.len().saturating_sub(1);
        let shared = self
            .previous
            .iter()
            .zip(&row.fragments)
            .take(limit)
            .take_while(|(a, b)| a.record == b.record && a.depth == b.depth)
            .count();
        self.previous = row.fragments.clone();
        row.fragments.drain(..shared);
        row.shared_prefix = shared;
        row
    }

    fn cleanup(&mut self) {
        for name in self.temp_tables.drain(..) {
            let sql = self.dialect.drop_temp_table(&name);
            if let Err(e) = self.executor.execute(&sql, &[]) {
                log::warn!("Could not drop temp table {}: {}", name, e);
            }
        }
    }

    fn fail(&mut self, err: ExecutionError) -> Option<Result<PathRow, ExecutionError>> {
        self.finished = true;
        self.buffer.clear();
        self.cleanup();
        Some(Err(err))
    }

    /// Consume the assembler, rebuilding every full path from the shared
    /// prefixes.
    pub fn paths(self) -> Result<Vec<Vec<ElementFragment>>, ExecutionError> {
        let mut paths: Vec<Vec<ElementFragment>> = Vec::new();
        for row in self {
            let row = row?;
            let mut path = match paths.last() {
                Some(previous) if row.shared_prefix > 0 => {
                    previous.get(..row.shared_prefix).map(<[_]>::to_vec).ok_or_else(|| {
                        ExecutionError::Decode(format!(
                            "row shares {} fragment(s) with a path of {}",
                            row.shared_prefix,
                            previous.len()
                        ))
                    })?
                }
                _ => Vec::new(),
            };
            path.extend(row.fragments);
            paths.push(path);
        }
        Ok(paths)
    }
}

impl Iterator for ResultAssembler<'_> {
    type Item = Result<PathRow, ExecutionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.pending.is_none() {
            if let Err(e) = self.start() {
                return self.fail(e);
            }
        }
        match self.fill() {
            Ok(true) => {
                let row = self.buffer.pop_front()?;
                Some(Ok(self.share_prefix(row)))
            }
            Ok(false) => {
                self.finished = true;
                self.cleanup();
                None
            }
            Err(e) => self.fail(e),
        }
    }
}

impl Drop for ResultAssembler<'_> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::{PropertyType, Topology};
    use crate::query_planner::StepChainRewriter;
    use crate::result::executor::{MockSqlExecutor, ResultSet};
    use crate::sql_generator::SqliteDialect;
    use crate::traversal::parse_traversal;
    use mockall::predicate::eq;
    use std::collections::BTreeMap;

    fn plan(text: &str) -> QueryPlan {
        plan_nth(text, 0)
    }

    fn plan_nth(text: &str, run: usize) -> QueryPlan {
        let mut topology = Topology::new();
        let person = topology
            .add_vertex_label(
                "public",
                "Person",
                BTreeMap::from([("age".to_string(), PropertyType::Integer)]),
            )
            .unwrap();
        topology
            .add_edge_label("public", "knows", BTreeMap::new(), &[(person.clone(), person)])
            .unwrap();
        let config = CompilerConfig::default();
        let outcome = StepChainRewriter::new(&config).rewrite(parse_traversal(text).unwrap());
        let compiled = outcome.compiled().nth(run).unwrap().clone();
        QueryPlan::build(&compiled, &topology, &config, &SqliteDialect).unwrap()
    }

    fn alias_of(plan: &QueryPlan, depth: usize, column: &str) -> String {
        plan.statements[0]
            .aliases
            .iter()
            .find(|(_, k)| k.depth == depth && k.column.to_string() == column)
            .map(|(a, _)| a.clone())
            .unwrap()
    }

    #[test]
    fn test_rows_share_their_common_prefix() {
        let plan = plan("g.V(1).as('a').out('knows')");
        let columns = vec![
            alias_of(&plan, 0, "ID"),
            alias_of(&plan, 0, "age"),
            alias_of(&plan, 1, "ID"),
            alias_of(&plan, 1, "age"),
        ];
        let sql = plan.statements[0].sql.clone();

        let mut executor = MockSqlExecutor::new();
        executor
            .expect_query()
            .with(eq(sql), eq(vec![Value::Int(1)]))
            .times(1)
            .returning(move |_, _| {
                Ok(ResultSet::new(
                    columns.clone(),
                    vec![
                        vec![Value::Int(1), Value::Int(40), Value::Int(2), Value::Int(25)],
                        vec![Value::Int(1), Value::Int(40), Value::Int(3), Value::Int(35)],
                    ],
                ))
            });

        let config = CompilerConfig::default();
        let rows: Vec<PathRow> = ResultAssembler::new(&executor, &SqliteDialect, plan, &config)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].shared_prefix, 0);
        assert_eq!(rows[0].fragments.len(), 2);
        assert_eq!(rows[1].shared_prefix, 1);
        assert_eq!(rows[1].fragments.len(), 1);
        assert_eq!(rows[1].terminal().unwrap().id(), 3);
    }

    #[test]
    fn test_paths_restore_shared_prefix() {
        let plan = plan("g.V(1).as('a').out('knows')");
        let columns = vec![alias_of(&plan, 0, "ID"), alias_of(&plan, 1, "ID")];
        let mut executor = MockSqlExecutor::new();
        executor.expect_query().returning(move |_, _| {
            Ok(ResultSet::new(
                columns.clone(),
                vec![
                    vec![Value::Int(1), Value::Int(2)],
                    vec![Value::Int(1), Value::Int(3)],
                ],
            ))
        });
        let config = CompilerConfig::default();
        let paths = ResultAssembler::new(&executor, &SqliteDialect, plan, &config)
            .paths()
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.len() == 2 && p[0].id() == 1));
        assert_eq!(paths[1][1].id(), 3);
    }

    #[test]
    fn test_sql_error_ends_iteration() {
        let plan = plan("g.V().out('knows')");
        let mut executor = MockSqlExecutor::new();
        executor
            .expect_query()
            .times(1)
            .returning(|sql, _| Err(ExecutionError::sql_with_context(sql, "disk I/O error")));
        let config = CompilerConfig::default();
        let mut assembler = ResultAssembler::new(&executor, &SqliteDialect, plan, &config);
        assert!(matches!(assembler.next(), Some(Err(ExecutionError::Sql { .. }))));
        assert!(assembler.next().is_none());
    }

    #[test]
    fn test_incoming_roots_need_a_binding() {
        let plan = plan_nth("g.V().has('age', {it > 1}).out('knows')", 1);
        let executor = MockSqlExecutor::new();
        let config = CompilerConfig::default();
        let mut assembler = ResultAssembler::new(&executor, &SqliteDialect, plan, &config);
        assert!(matches!(
            assembler.next(),
            Some(Err(ExecutionError::MissingBinding(_)))
        ));
    }

    #[test]
    fn test_incoming_roots_run_per_matching_record() {
        let plan = plan_nth("g.V().has('age', {it > 1}).out('knows')", 1);
        let columns: Vec<String> = plan.statements[0].aliases.keys().cloned().collect();
        let mut executor = MockSqlExecutor::new();
        executor
            .expect_query()
            .times(2)
            .returning(move |_, _| Ok(ResultSet::new(columns.clone(), Vec::new())));
        let config = CompilerConfig::default();
        let person = TableRef::vertex("public", "Person");
        let rows = ResultAssembler::new(&executor, &SqliteDialect, plan, &config)
            .with_incoming(vec![
                RecordId::new(person.clone(), 1),
                RecordId::new(person, 2),
                RecordId::new(TableRef::vertex("public", "City"), 3),
            ])
            .count();
        assert_eq!(rows, 0);
    }
}
