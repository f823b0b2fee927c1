//! Arena-backed tree of physical table visits.
//!
//! Each node is one vertex or edge table reached from its parent in a
//! resolved direction. The root owns the alias state used while emitting
//! SQL for the tree's path-stacks.

pub mod alias;
pub mod errors;
pub mod path_stack;
pub mod pruning;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::graph_catalog::{Direction, ElementKind, ForeignKey, PropertyType, TableRef};
use crate::traversal::{HasContainer, OrderSpec, Predicate, RangeSpec, RecordId, Value};

pub use alias::{AliasColumn, AliasKey, AliasState};
pub use errors::QueryTreeError;
pub use path_stack::{PathStack, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    GraphRoot,
    VertexHop,
    EdgeVertexHop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LabelKind {
    /// Written by the user with `as(..)`
    User,
    /// Added so path reconstruction sees an otherwise unlabelled hop
    Path,
    /// Marks a hop whose elements are emitted mid-repeat
    Emit,
}

/// Result label requested for one hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepLabel {
    pub depth: usize,
    pub name: String,
    pub kind: LabelKind,
}

pub const PATH_LABEL: &str = "_path";
pub const EMIT_LABEL: &str = "_emit";

impl StepLabel {
    pub fn new(depth: usize, name: impl Into<String>, kind: LabelKind) -> Self {
        StepLabel {
            depth,
            name: name.into(),
            kind,
        }
    }

    pub fn is_user(&self) -> bool {
        self.kind == LabelKind::User
    }
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.depth, self.name)
    }
}

/// How the root's `ID` is constrained when the SQL runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RootBinding {
    Unconstrained,
    /// One execution per id, bound to the root id placeholder.
    Ids(Vec<i64>),
    /// Ids arrive with the incoming traversers at execution time.
    Incoming,
}

impl RootBinding {
    pub fn is_bound(&self) -> bool {
        !matches!(self, RootBinding::Unconstrained)
    }
}

#[derive(Debug, Clone)]
pub struct QueryNode {
    pub table: TableRef,
    /// `None` only for the root.
    pub direction: Option<Direction>,
    pub step_kind: StepKind,
    pub depth: usize,
    pub labels: BTreeSet<StepLabel>,
    /// Foreign key joining this node to its parent. It lives on whichever of
    /// the two is the edge table.
    pub join_key: Option<ForeignKey>,
    /// Every foreign key of an edge table; filled for projected edges.
    pub foreign_keys: BTreeSet<ForeignKey>,
    pub emit: bool,
    pub left_join: bool,
    pub until_first: bool,
    pub drop: bool,
    /// Edge table crossed by a vertex-to-vertex hop.
    pub intermediate: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub properties: BTreeMap<String, PropertyType>,
    pub has_containers: Vec<HasContainer>,
    pub id_predicates: Vec<Predicate>,
    pub comparators: Vec<OrderSpec>,
    pub range: Option<RangeSpec>,
    pub removed: bool,
}

impl QueryNode {
    pub fn kind(&self) -> ElementKind {
        self.table.kind
    }

    pub fn has_user_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.is_user() && l.name == name)
    }

    pub fn user_labels(&self) -> BTreeSet<String> {
        self.labels
            .iter()
            .filter(|l| l.is_user())
            .map(|l| l.name.clone())
            .collect()
    }

    pub fn has_filters(&self) -> bool {
        !self.has_containers.is_empty() || !self.id_predicates.is_empty()
    }
}

/// Parameters for a node about to be attached below an existing one.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub table: TableRef,
    pub direction: Direction,
    pub step_kind: StepKind,
    pub depth: usize,
    pub join_key: ForeignKey,
    pub properties: BTreeMap<String, PropertyType>,
    pub intermediate: bool,
}

#[derive(Debug, Clone)]
pub struct QueryTree {
    nodes: Vec<QueryNode>,
    pub root_binding: RootBinding,
    pub aliases: AliasState,
    leaves: Vec<NodeId>,
    /// Depth of the deepest hop of the compiled chain.
    pub full_depth: usize,
    /// Set when a root filter can never match, e.g. `hasId(within())`.
    pub unsatisfiable: bool,
}

impl QueryTree {
    pub fn new(
        table: TableRef,
        properties: BTreeMap<String, PropertyType>,
        root_binding: RootBinding,
    ) -> Self {
        let root = QueryNode {
            table,
            direction: None,
            step_kind: StepKind::GraphRoot,
            depth: 0,
            labels: BTreeSet::new(),
            join_key: None,
            foreign_keys: BTreeSet::new(),
            emit: false,
            left_join: false,
            until_first: false,
            drop: false,
            intermediate: false,
            parent: None,
            children: Vec::new(),
            properties,
            has_containers: Vec::new(),
            id_predicates: Vec::new(),
            comparators: Vec::new(),
            range: None,
            removed: false,
        };
        QueryTree {
            nodes: vec![root],
            root_binding,
            aliases: AliasState::new(),
            leaves: vec![NodeId(0)],
            full_depth: 0,
            unsatisfiable: false,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id.0 == 0
    }

    pub fn node(&self, id: NodeId) -> Result<&QueryNode, QueryTreeError> {
        self.nodes
            .get(id.0)
            .ok_or(QueryTreeError::UnknownNode(id.0))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut QueryNode, QueryTreeError> {
        self.nodes
            .get_mut(id.0)
            .ok_or(QueryTreeError::UnknownNode(id.0))
    }

    /// Live (not pruned) nodes in insertion order.
    pub fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &QueryNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.removed)
            .map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.live_nodes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    /// Attach a child, enforcing vertex/edge alternation and a resolved
    /// direction.
    pub fn add_child(&mut self, parent: NodeId, child: NewNode) -> Result<NodeId, QueryTreeError> {
        let parent_node = self.node(parent)?;
        if parent_node.kind() == child.table.kind {
            return Err(QueryTreeError::KindAlternation {
                parent: parent_node.table.to_string(),
                child: child.table.to_string(),
            });
        }
        if child.direction == Direction::Both {
            return Err(QueryTreeError::UnresolvedBothDirection(self.nodes.len()));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(QueryNode {
            table: child.table,
            direction: Some(child.direction),
            step_kind: child.step_kind,
            depth: child.depth,
            labels: BTreeSet::new(),
            join_key: Some(child.join_key),
            foreign_keys: BTreeSet::new(),
            emit: false,
            left_join: false,
            until_first: false,
            drop: false,
            intermediate: child.intermediate,
            parent: Some(parent),
            children: Vec::new(),
            properties: child.properties,
            has_containers: Vec::new(),
            id_predicates: Vec::new(),
            comparators: Vec::new(),
            range: None,
            removed: false,
        });
        self.nodes[parent.0].children.push(id);
        self.leaves.retain(|l| *l != parent);
        self.leaves.push(id);
        Ok(id)
    }

    /// Remove a node and everything below it. The root is never removed.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<(), QueryTreeError> {
        if self.is_root(id) {
            return Err(QueryTreeError::RootRemoval(id.0));
        }
        let parent = self.node(id)?.parent;
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let node = self.node_mut(next)?;
            node.removed = true;
            pending.extend(node.children.drain(..));
            self.leaves.retain(|l| *l != next);
        }
        if let Some(parent) = parent {
            let parent_node = self.node_mut(parent)?;
            parent_node.children.retain(|c| *c != id);
            if parent_node.children.is_empty() && !parent_node.removed {
                self.leaves.push(parent);
            }
        }
        Ok(())
    }

    /// Nodes from the root down to `id`, inclusive.
    pub fn path_to(&self, id: NodeId) -> Result<Vec<NodeId>, QueryTreeError> {
        let mut path = vec![id];
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            path.push(parent);
            current = self.node(parent)?;
        }
        path.reverse();
        Ok(path)
    }

    /// Store id predicates on a node, rewritten against the node's table.
    pub fn add_id_predicates(
        &mut self,
        id: NodeId,
        predicates: &[Predicate],
    ) -> Result<(), QueryTreeError> {
        let table = self.node(id)?.table.clone();
        let normalized = predicates
            .iter()
            .filter_map(|p| normalize_id_predicate(p, &table))
            .collect::<Vec<_>>();
        self.node_mut(id)?.id_predicates.extend(normalized);
        Ok(())
    }

    /// Compile one path-stack of this tree into SQL.
    pub fn compile_stack(
        &mut self,
        stack: &PathStack,
        dialect: &dyn crate::sql_generator::SqlDialect,
        config: &crate::config::CompilerConfig,
        strip_range: bool,
    ) -> Result<crate::sql_generator::CompiledQuery, crate::sql_generator::SqlGenerationError> {
        crate::sql_generator::select_builder::compile_stack(self, stack, dialect, config, strip_range)
    }
}

/// Ids a root id predicate pins `table` to, when it is a plain equality or
/// within list. An empty result means no row of `table` can match.
pub fn bound_ids(predicate: &Predicate, table: &TableRef) -> Option<Vec<i64>> {
    match normalize_id_predicate(predicate, table)? {
        Predicate::Compare(crate::traversal::Compare::Eq, v) => Some(vec![v.as_i64()?]),
        Predicate::Within(values) => values.iter().map(Value::as_i64).collect(),
        _ => None,
    }
}

/// Resolve an id literal against `table`: plain integers apply to any table,
/// record ids only to their own table.
fn id_for_table(value: &Value, table: &TableRef) -> Option<Value> {
    match value {
        Value::Int(i) => Some(Value::Int(*i)),
        Value::Id(record) if &record.table == table => Some(Value::Int(record.id)),
        Value::Id(_) => None,
        Value::String(s) => match s.parse::<i64>() {
            Ok(i) => Some(Value::Int(i)),
            Err(_) => RecordId::parse(s, table.kind)
                .filter(|r| &r.table == table)
                .map(|r| Value::Int(r.id)),
        },
        _ => None,
    }
}

/// Returns `None` when the predicate holds for every row of `table`.
fn normalize_id_predicate(predicate: &Predicate, table: &TableRef) -> Option<Predicate> {
    let resolve = |values: &[Value]| -> Vec<Value> {
        values.iter().filter_map(|v| id_for_table(v, table)).collect()
    };
    match predicate {
        Predicate::Compare(crate::traversal::Compare::Neq, v) => {
            id_for_table(v, table).map(|v| Predicate::Compare(crate::traversal::Compare::Neq, v))
        }
        Predicate::Compare(op, v) => Some(match id_for_table(v, table) {
            Some(v) => Predicate::Compare(*op, v),
            None => Predicate::Within(Vec::new()),
        }),
        Predicate::Within(values) => Some(Predicate::Within(resolve(values))),
        Predicate::Without(values) => {
            let values = resolve(values);
            if values.is_empty() {
                None
            } else {
                Some(Predicate::Without(values))
            }
        }
        Predicate::And(parts) => {
            let parts = parts
                .iter()
                .filter_map(|p| normalize_id_predicate(p, table))
                .collect::<Vec<_>>();
            if parts.is_empty() {
                None
            } else {
                Some(Predicate::And(parts))
            }
        }
        Predicate::Or(parts) => {
            let mut normalized = Vec::with_capacity(parts.len());
            for part in parts {
                // one always-true disjunct makes the whole disjunction true
                normalized.push(normalize_id_predicate(part, table)?);
            }
            Some(Predicate::Or(normalized))
        }
        other => Some(other.clone()),
    }
}
