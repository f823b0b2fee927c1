//! Path-stack to `SELECT` compilation.
//!
//! A stack is a root-to-leaf chain of alternating vertex and edge tables.
//! Consecutive nodes are INNER JOINed on their foreign key. A table may
//! appear only once per `FROM` scope, so a chain that revisits a table is
//! split into segments; each segment becomes a sub-select and neighbouring
//! segments are joined on carried key columns.
//!
//! When the root id is bound and nothing is read from the root vertex, the
//! root table is left out and its id is matched against the first edge's
//! foreign key instead.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::bulk::{bulk_candidate, BulkKind, BulkTable};
use super::dialect::SqlDialect;
use super::errors::SqlGenerationError;
use super::predicate_sql::render_predicate;
use super::{CompiledQuery, FragmentKey, SqlFragment};
use crate::config::CompilerConfig;
use crate::graph_catalog::ID_COLUMN;
use crate::query_tree::{
    AliasColumn, AliasKey, AliasState, NodeId, PathStack, Phase, QueryNode, QueryTree,
    QueryTreeError,
};
use crate::traversal::{OrderKey, Predicate, SortOrder};

/// `column = ?` bound to the root id at execution time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RootCondition {
    pub node: NodeId,
    pub column: AliasColumn,
}

/// `FROM` clause over segment sub-selects plus the outer select list.
pub(crate) struct SegmentedFrom {
    pub select: Vec<String>,
    pub from: SqlFragment,
    pub segment_of: HashMap<NodeId, String>,
}

pub(crate) struct StackCompiler<'a> {
    pub tree: &'a QueryTree,
    pub dialect: &'a dyn SqlDialect,
    pub config: &'a CompilerConfig,
    pub aliases: AliasState,
    pub bulk_tables: Vec<BulkTable>,
    sub_selects: usize,
    /// Columns each node exposes from its segment, first request first.
    wanted: BTreeMap<NodeId, Vec<AliasColumn>>,
}

impl<'a> StackCompiler<'a> {
    pub fn new(
        tree: &'a QueryTree,
        dialect: &'a dyn SqlDialect,
        config: &'a CompilerConfig,
        aliases: AliasState,
    ) -> Self {
        StackCompiler {
            tree,
            dialect,
            config,
            aliases,
            bulk_tables: Vec::new(),
            sub_selects: 0,
            wanted: BTreeMap::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&'a QueryNode, SqlGenerationError> {
        Ok(self.tree.node(id)?)
    }

    pub fn want(&mut self, id: NodeId, column: AliasColumn) {
        let columns = self.wanted.entry(id).or_default();
        if !columns.contains(&column) {
            columns.push(column);
        }
    }

    pub fn alias(&mut self, id: NodeId, column: &AliasColumn) -> Result<String, SqlGenerationError> {
        let node = self.node(id)?;
        Ok(self.aliases.alias_for(AliasKey {
            depth: node.depth,
            table: node.table.clone(),
            column: column.clone(),
            labels: node.labels.clone(),
        }))
    }

    pub fn quote(&self, identifier: &str) -> String {
        self.dialect.quote(identifier)
    }

    fn column_name(column: &AliasColumn) -> String {
        match column {
            AliasColumn::Id => ID_COLUMN.to_string(),
            AliasColumn::Property(name) => name.clone(),
            AliasColumn::ForeignKey(fk) => fk.column(),
        }
    }

    pub fn column_ref(&self, id: NodeId, column: &AliasColumn) -> Result<String, SqlGenerationError> {
        let node = self.node(id)?;
        Ok(format!(
            "{}.{}",
            self.dialect.table(&node.table),
            self.quote(&Self::column_name(column))
        ))
    }

    pub fn next_sub_select(&mut self) -> String {
        self.sub_selects += 1;
        format!("a{}", self.sub_selects)
    }

    /// Every column needed to rebuild the element a node stands for.
    fn element_columns(node: &QueryNode) -> Vec<AliasColumn> {
        let mut columns = vec![AliasColumn::Id];
        columns.extend(node.properties.keys().cloned().map(AliasColumn::Property));
        if node.table.is_edge() {
            columns.extend(node.foreign_keys.iter().cloned().map(AliasColumn::ForeignKey));
        }
        columns
    }

    /// Columns equated when `right` follows its parent on a path: the edge
    /// side holds the foreign key, the vertex side its `ID`.
    pub fn join_columns(
        &self,
        right: NodeId,
    ) -> Result<(AliasColumn, AliasColumn), SqlGenerationError> {
        let node = self.node(right)?;
        let fk = node.join_key.clone().ok_or_else(|| {
            SqlGenerationError::InvalidPlan(format!("{} has no join key", node.table))
        })?;
        Ok(if node.table.is_edge() {
            (AliasColumn::Id, AliasColumn::ForeignKey(fk))
        } else {
            (AliasColumn::ForeignKey(fk), AliasColumn::Id)
        })
    }

    fn join_condition(&self, left: NodeId, right: NodeId) -> Result<String, SqlGenerationError> {
        let (l, r) = self.join_columns(right)?;
        Ok(format!(
            "{} = {}",
            self.column_ref(left, &l)?,
            self.column_ref(right, &r)?
        ))
    }

    /// Greedy split: a new segment starts whenever a table would repeat.
    pub fn split_segments(&self, nodes: &[NodeId]) -> Result<Vec<Vec<NodeId>>, SqlGenerationError> {
        let mut segments = Vec::new();
        let mut current: Vec<NodeId> = Vec::new();
        let mut tables = HashSet::new();
        for id in nodes {
            let table = &self.node(*id)?.table;
            if tables.contains(table) {
                segments.push(std::mem::take(&mut current));
                tables.clear();
            }
            tables.insert(table.clone());
            current.push(*id);
        }
        if !current.is_empty() {
            segments.push(current);
        }
        Ok(segments)
    }

    /// Request the key columns neighbouring segments are joined on.
    pub fn prepare_carries(&mut self, segments: &[Vec<NodeId>]) -> Result<(), SqlGenerationError> {
        for pair in segments.windows(2) {
            let (Some(left), Some(right)) = (pair[0].last(), pair[1].first()) else {
                continue;
            };
            let (l, r) = self.join_columns(*right)?;
            self.want(*left, l);
            self.want(*right, r);
        }
        Ok(())
    }

    fn filter(
        &mut self,
        id: NodeId,
        column: AliasColumn,
        predicate: &Predicate,
        joins: &mut Vec<String>,
        conditions: &mut Vec<SqlFragment>,
    ) -> Result<(), SqlGenerationError> {
        let column_ref = self.column_ref(id, &column)?;
        if let Some((kind, values)) = bulk_candidate(predicate, self.config.bulk_within_threshold) {
            let table = BulkTable::new(kind, values);
            let bulk_column = format!("{}.{}", self.quote(&table.name), self.quote(table.column()));
            match kind {
                BulkKind::Within => joins.push(format!(
                    " INNER JOIN {} ON {} = {}",
                    self.quote(&table.name),
                    column_ref,
                    bulk_column
                )),
                BulkKind::Without => {
                    joins.push(format!(
                        " LEFT JOIN {} ON {} = {}",
                        self.quote(&table.name),
                        column_ref,
                        bulk_column
                    ));
                    conditions.push(SqlFragment::new(format!("{} IS NULL", bulk_column)));
                }
            }
            log::debug!("Filter on {} goes through {}", column_ref, table);
            self.bulk_tables.push(table);
            return Ok(());
        }

        let mut fragment = SqlFragment::default();
        render_predicate(&column_ref, predicate, self.dialect, &mut fragment)?;
        conditions.push(fragment);
        Ok(())
    }

    fn node_filters(
        &mut self,
        id: NodeId,
        joins: &mut Vec<String>,
        conditions: &mut Vec<SqlFragment>,
    ) -> Result<(), SqlGenerationError> {
        let node = self.node(id)?;
        for predicate in &node.id_predicates {
            self.filter(id, AliasColumn::Id, predicate, joins, conditions)?;
        }
        for container in &node.has_containers {
            self.filter(
                id,
                AliasColumn::Property(container.key.clone()),
                &container.predicate,
                joins,
                conditions,
            )?;
        }
        Ok(())
    }

    /// One flat `SELECT .. FROM .. JOIN .. WHERE ..` over tables that are
    /// all distinct.
    pub fn render_segment(
        &mut self,
        nodes: &[NodeId],
        root: Option<&RootCondition>,
        columns: &[(NodeId, AliasColumn)],
    ) -> Result<SqlFragment, SqlGenerationError> {
        let first = *nodes.first().ok_or(SqlGenerationError::EmptyStack)?;

        let mut select = Vec::with_capacity(columns.len());
        let mut seen = HashSet::new();
        for (id, column) in columns {
            let alias = self.alias(*id, column)?;
            if seen.insert(alias.clone()) {
                select.push(format!(
                    "{} AS {}",
                    self.column_ref(*id, column)?,
                    self.quote(&alias)
                ));
            }
        }

        let mut sql = SqlFragment::new(format!(
            "SELECT {} FROM {}",
            select.join(", "),
            self.dialect.table(&self.node(first)?.table)
        ));
        for pair in nodes.windows(2) {
            sql.push_str(&format!(
                " INNER JOIN {} ON {}",
                self.dialect.table(&self.node(pair[1])?.table),
                self.join_condition(pair[0], pair[1])?
            ));
        }

        let mut joins = Vec::new();
        let mut conditions = Vec::new();
        if let Some(root) = root.filter(|r| nodes.contains(&r.node)) {
            let mut condition = SqlFragment::new(format!("{} = ", self.column_ref(root.node, &root.column)?));
            condition.push_root_id();
            conditions.push(condition);
        }
        for id in nodes {
            self.node_filters(*id, &mut joins, &mut conditions)?;
        }
        for join in joins {
            sql.push_str(&join);
        }
        push_where(&mut sql, conditions);
        Ok(sql)
    }

    /// Sub-select per segment, joined on carried columns; `outputs` are
    /// re-exported under their own alias.
    pub fn render_segmented(
        &mut self,
        segments: &[Vec<NodeId>],
        outputs: &[(NodeId, AliasColumn)],
        root: Option<&RootCondition>,
    ) -> Result<SegmentedFrom, SqlGenerationError> {
        let mut from = SqlFragment::default();
        let mut segment_of = HashMap::new();
        let mut previous: Option<(NodeId, String)> = None;

        for segment in segments {
            let columns = segment
                .iter()
                .flat_map(|id| {
                    self.wanted
                        .get(id)
                        .into_iter()
                        .flatten()
                        .map(move |c| (*id, c.clone()))
                })
                .collect::<Vec<_>>();
            let body = self.render_segment(segment, root, &columns)?;
            let name = self.next_sub_select();

            from.push_str(if previous.is_none() { " FROM (" } else { " INNER JOIN (" });
            from.append(body);
            from.push_str(&format!(") AS {}", self.quote(&name)));

            let first = *segment.first().ok_or(SqlGenerationError::EmptyStack)?;
            if let Some((left, left_name)) = &previous {
                let (l, r) = self.join_columns(first)?;
                let left_alias = self.alias(*left, &l)?;
                let right_alias = self.alias(first, &r)?;
                from.push_str(&format!(
                    " ON {}.{} = {}.{}",
                    self.quote(left_name),
                    self.quote(&left_alias),
                    self.quote(&name),
                    self.quote(&right_alias)
                ));
            }
            for id in segment {
                segment_of.insert(*id, name.clone());
            }
            let last = *segment.last().ok_or(SqlGenerationError::EmptyStack)?;
            previous = Some((last, name));
        }

        let mut select = Vec::new();
        let mut seen = HashSet::new();
        for (id, column) in outputs {
            let alias = self.alias(*id, column)?;
            let owner = segment_of.get(id).ok_or_else(|| {
                SqlGenerationError::InvalidPlan(format!("output node {} is in no segment", id))
            })?;
            if seen.insert(alias.clone()) {
                select.push(format!(
                    "{}.{} AS {}",
                    self.quote(owner),
                    self.quote(&alias),
                    self.quote(&alias)
                ));
            }
        }

        Ok(SegmentedFrom {
            select,
            from,
            segment_of,
        })
    }

    /// Complete `SELECT` over a chain, flat when no table repeats.
    pub fn render_chain(
        &mut self,
        nodes: &[NodeId],
        outputs: &[(NodeId, AliasColumn)],
        root: Option<&RootCondition>,
    ) -> Result<SqlFragment, SqlGenerationError> {
        let segments = self.split_segments(nodes)?;
        if segments.len() == 1 {
            return self.render_segment(&segments[0], root, outputs);
        }
        for (id, column) in outputs {
            self.want(*id, column.clone());
        }
        self.prepare_carries(&segments)?;
        let from = self.render_segmented(&segments, outputs, root)?;
        let mut sql = SqlFragment::new(format!("SELECT {}", from.select.join(", ")));
        sql.append(from.from);
        Ok(sql)
    }

    /// Root id condition and the nodes that actually enter the `FROM`
    /// clause.
    fn root_condition(
        &self,
        stack: &PathStack,
    ) -> Result<(Option<RootCondition>, Vec<NodeId>), SqlGenerationError> {
        let root_id = *stack.nodes.first().ok_or(SqlGenerationError::EmptyStack)?;
        if !self.tree.root_binding.is_bound() {
            return Ok((None, stack.nodes.clone()));
        }
        let root = self.node(root_id)?;
        let elidable = stack.nodes.len() > 1
            && root.table.is_vertex()
            && root.labels.is_empty()
            && !root.emit
            && !root.left_join
            && !root.has_filters()
            && root.comparators.is_empty()
            && root.range.is_none();
        if !elidable {
            return Ok((
                Some(RootCondition {
                    node: root_id,
                    column: AliasColumn::Id,
                }),
                stack.nodes.clone(),
            ));
        }

        let first = stack.nodes[1];
        let fk = self.node(first)?.join_key.clone().ok_or_else(|| {
            SqlGenerationError::InvalidPlan("first hop below the root has no join key".to_string())
        })?;
        Ok((
            Some(RootCondition {
                node: first,
                column: AliasColumn::ForeignKey(fk),
            }),
            stack.nodes[1..].to_vec(),
        ))
    }

    /// Nodes whose element is part of the result row.
    fn projected(&self, stack: &PathStack) -> Result<Vec<NodeId>, SqlGenerationError> {
        let terminal = stack.terminal();
        let mut projected = Vec::new();
        for id in &stack.nodes {
            let node = self.node(*id)?;
            if Some(*id) == terminal || !node.labels.is_empty() {
                projected.push(*id);
            }
        }
        Ok(projected)
    }

    /// Resolved sort columns, deepest comparator first. Keys naming a
    /// property the table lacks are skipped.
    fn order_columns(
        &self,
        nodes: &[NodeId],
    ) -> Result<Vec<(NodeId, AliasColumn, SortOrder)>, SqlGenerationError> {
        let mut columns = Vec::new();
        for id in nodes.iter().rev() {
            let node = self.node(*id)?;
            for spec in &node.comparators {
                let (target, column) = match &spec.key {
                    OrderKey::Id => (*id, Some(AliasColumn::Id)),
                    OrderKey::Property(name) => (
                        *id,
                        node.properties
                            .contains_key(name)
                            .then(|| AliasColumn::Property(name.clone())),
                    ),
                    OrderKey::Select { label, property } => {
                        let mut target = None;
                        for candidate in nodes {
                            if self.node(*candidate)?.has_user_label(label) {
                                target = Some(*candidate);
                                break;
                            }
                        }
                        let target =
                            target.ok_or_else(|| SqlGenerationError::UnknownLabel(label.clone()))?;
                        let column = match property {
                            None => Some(AliasColumn::Id),
                            Some(name) => self
                                .node(target)?
                                .properties
                                .contains_key(name)
                                .then(|| AliasColumn::Property(name.clone())),
                        };
                        (target, column)
                    }
                    OrderKey::Aggregate(_) | OrderKey::Lambda(_) => {
                        return Err(SqlGenerationError::untranslatable_with_context(
                            spec.to_string(),
                            "order key",
                        ))
                    }
                };
                match column {
                    Some(column) => columns.push((target, column, spec.order)),
                    None => log::debug!("Order key {} does not apply to {}", spec, node.table),
                }
            }
        }
        Ok(columns)
    }

    pub fn compile(
        &mut self,
        stack: &PathStack,
        strip_range: bool,
    ) -> Result<CompiledQuery, SqlGenerationError> {
        let (root, active) = self.root_condition(stack)?;
        let projected = self.projected(stack)?;

        let mut outputs: Vec<(NodeId, AliasColumn)> = Vec::new();
        for id in &projected {
            for column in Self::element_columns(self.node(*id)?) {
                outputs.push((*id, column));
            }
        }
        let order = self.order_columns(&stack.nodes)?;
        for (id, column, _) in &order {
            if !outputs.iter().any(|(i, c)| i == id && c == column) {
                outputs.push((*id, column.clone()));
            }
        }
        for (id, column) in &outputs {
            self.want(*id, column.clone());
        }

        let segments = self.split_segments(&active)?;
        let mut sql = match stack.phase {
            Phase::Optional => self.compose_optional(stack, &segments, &outputs, root.as_ref())?,
            _ if segments.len() == 1 => self.render_segment(&segments[0], root.as_ref(), &outputs)?,
            _ => {
                self.prepare_carries(&segments)?;
                let from = self.render_segmented(&segments, &outputs, root.as_ref())?;
                let mut sql = SqlFragment::new(format!("SELECT {}", from.select.join(", ")));
                sql.append(from.from);
                sql
            }
        };

        let mut order_by = Vec::with_capacity(order.len());
        for (id, column, direction) in &order {
            order_by.push((self.alias(*id, column)?, *direction));
        }
        if !order_by.is_empty() {
            let items = order_by
                .iter()
                .map(|(alias, direction)| {
                    let keyword = match direction {
                        SortOrder::Asc => "ASC",
                        SortOrder::Desc => "DESC",
                    };
                    format!("{} {}", self.quote(alias), keyword)
                })
                .collect::<Vec<_>>();
            sql.push_str(&format!(" ORDER BY {}", items.join(", ")));
        }

        let mut range = None;
        for id in stack.nodes.iter().rev() {
            if let Some(r) = self.node(*id)?.range {
                range = Some(r);
                break;
            }
        }
        if let Some(clause) = range.filter(|_| !strip_range).and_then(|r| self.dialect.range_clause(&r)) {
            sql.push_str(&clause);
        }

        let mut fragments = Vec::with_capacity(projected.len());
        for id in &projected {
            let node = self.node(*id)?;
            fragments.push(FragmentKey {
                depth: node.depth,
                table: node.table.clone(),
                labels: node.labels.clone(),
            });
        }

        Ok(CompiledQuery {
            phase: stack.phase,
            sql: sql.sql,
            parameters: sql.params,
            aliases: self.aliases.snapshot(),
            fragments,
            order_by,
            range,
            range_stripped: strip_range && range.is_some(),
            bulk_tables: std::mem::take(&mut self.bulk_tables),
            root_table: self.node(self.tree.root())?.table.clone(),
            root_binding: self.tree.root_binding.clone(),
        })
    }
}

pub(crate) fn push_where(sql: &mut SqlFragment, conditions: Vec<SqlFragment>) {
    for (i, condition) in conditions.into_iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.append(condition);
    }
}

/// Compile one path-stack of `tree`. Aliases restart at `alias1` for every
/// statement.
pub fn compile_stack(
    tree: &mut QueryTree,
    stack: &PathStack,
    dialect: &dyn SqlDialect,
    config: &CompilerConfig,
    strip_range: bool,
) -> Result<CompiledQuery, SqlGenerationError> {
    let Some(first) = stack.nodes.first() else {
        return Err(SqlGenerationError::EmptyStack);
    };
    if !tree.is_root(*first) {
        return Err(QueryTreeError::NotRoot(first.0).into());
    }
    let mut aliases = std::mem::take(&mut tree.aliases);
    aliases.reset();

    let (result, aliases) = {
        let mut compiler = StackCompiler::new(tree, dialect, config, aliases);
        let result = compiler.compile(stack, strip_range);
        (result, compiler.aliases)
    };
    tree.aliases = aliases;

    let compiled = result?;
    log::debug!("Compiled {}", compiled);
    Ok(compiled)
}
