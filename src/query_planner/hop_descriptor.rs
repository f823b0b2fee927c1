use std::collections::BTreeSet;
use std::fmt;

use crate::graph_catalog::{Direction, ElementKind, ForeignKey, GraphSchemaError, TableRef, Topology};
use crate::query_tree::{
    LabelKind, NewNode, NodeId, QueryTree, QueryTreeError, StepKind, StepLabel, EMIT_LABEL,
};
use crate::traversal::{
    HasContainer, OrderSpec, Predicate, RangeSpec, RecordId, Value, VertexStep,
};

#[derive(Debug, Clone, PartialEq)]
pub enum HopKind {
    /// `g.V(..)` / `g.E(..)`: every table of the kind is a candidate root.
    GraphRoot(ElementKind),
    /// Run starting mid-traversal; roots are the incoming elements.
    IncomingRoot(ElementKind),
    Vertex(VertexStep),
    EdgeVertex(Direction),
}

impl HopKind {
    pub fn is_root(&self) -> bool {
        matches!(self, HopKind::GraphRoot(_) | HopKind::IncomingRoot(_))
    }
}

/// One fused hop: where to go next plus everything the rewriter folded into it.
#[derive(Debug, Clone, PartialEq)]
pub struct HopDescriptor {
    pub kind: HopKind,
    /// Index of this hop in the compiled chain.
    pub depth: usize,
    pub has_containers: Vec<HasContainer>,
    pub id_predicates: Vec<Predicate>,
    pub label_predicates: Vec<Predicate>,
    pub order: Vec<OrderSpec>,
    pub range: Option<RangeSpec>,
    pub emit: bool,
    pub until_first: bool,
    pub left_join: bool,
    pub drop: bool,
    pub labels: BTreeSet<StepLabel>,
}

impl HopDescriptor {
    pub fn new(kind: HopKind, depth: usize) -> Self {
        HopDescriptor {
            kind,
            depth,
            has_containers: Vec::new(),
            id_predicates: Vec::new(),
            label_predicates: Vec::new(),
            order: Vec::new(),
            range: None,
            emit: false,
            until_first: false,
            left_join: false,
            drop: false,
            labels: BTreeSet::new(),
        }
    }

    pub fn add_label(&mut self, name: impl Into<String>, kind: LabelKind) {
        self.labels.insert(StepLabel::new(self.depth, name, kind));
    }

    pub fn has_user_labels(&self) -> bool {
        self.labels.iter().any(StepLabel::is_user)
    }

    pub fn mark_emit(&mut self) {
        self.emit = true;
        self.add_label(EMIT_LABEL, LabelKind::Emit);
    }

    /// Element kind of the nodes this hop produces.
    pub fn target_kind(&self) -> ElementKind {
        match &self.kind {
            HopKind::GraphRoot(kind) | HopKind::IncomingRoot(kind) => *kind,
            HopKind::Vertex(step) => step.returns,
            HopKind::EdgeVertex(_) => ElementKind::Vertex,
        }
    }

    /// Tables named by record-id predicates, when every id is a record id.
    /// Plain integer ids do not restrict the table.
    fn id_tables(&self, kind: ElementKind) -> Option<BTreeSet<TableRef>> {
        if self.id_predicates.is_empty() {
            return None;
        }
        let mut tables = BTreeSet::new();
        for predicate in &self.id_predicates {
            let values: Vec<&Value> = match predicate {
                Predicate::Compare(crate::traversal::Compare::Eq, v) => vec![v],
                Predicate::Within(vs) => vs.iter().collect(),
                _ => return None,
            };
            for value in values {
                let record = match value {
                    Value::Id(record) => record.clone(),
                    Value::String(s) => RecordId::parse(s, kind)?,
                    _ => return None,
                };
                tables.insert(record.table);
            }
        }
        Some(tables)
    }

    fn label_matches(predicate: &Predicate, table: &TableRef) -> bool {
        let matches = |v: &Value| match v {
            Value::String(label) => table.matches_label(label),
            _ => false,
        };
        match predicate {
            Predicate::Compare(crate::traversal::Compare::Eq, v) => matches(v),
            Predicate::Compare(crate::traversal::Compare::Neq, v) => !matches(v),
            Predicate::Within(vs) => vs.iter().any(matches),
            Predicate::Without(vs) => !vs.iter().any(matches),
            Predicate::And(parts) => parts.iter().all(|p| Self::label_matches(p, table)),
            Predicate::Or(parts) => parts.iter().any(|p| Self::label_matches(p, table)),
            _ => true,
        }
    }

    /// Property filters that apply to `table`, or `None` when a filter names
    /// a property the table lacks and so can never match.
    fn containers_for(&self, table: &TableRef, topology: &Topology) -> Option<Vec<HasContainer>> {
        let properties = topology.properties(table)?;
        let mut kept = Vec::with_capacity(self.has_containers.len());
        for container in &self.has_containers {
            if properties.contains_key(&container.key) {
                kept.push(container.clone());
            } else if container.predicate != Predicate::NotExists {
                return None;
            }
        }
        Some(kept)
    }

    /// Does `table` survive this hop's label, id and property filters?
    pub fn matches_table(&self, table: &TableRef, topology: &Topology) -> bool {
        if !self
            .label_predicates
            .iter()
            .all(|p| Self::label_matches(p, table))
        {
            return false;
        }
        if let Some(tables) = self.id_tables(table.kind) {
            if !tables.contains(table) {
                return false;
            }
        }
        self.containers_for(table, topology).is_some()
    }

    /// Candidate root tables for a root hop.
    pub fn root_tables(&self, topology: &Topology) -> Vec<TableRef> {
        let kind = self.target_kind();
        topology
            .tables(kind)
            .into_iter()
            .filter(|t| self.matches_table(t, topology))
            .collect()
    }

    /// Copy labels, flags, filters, ordering and range onto a node this hop
    /// produced. `with_ids` is false when the root binding already consumed
    /// the id predicates.
    pub fn apply_to_node(
        &self,
        tree: &mut QueryTree,
        id: NodeId,
        topology: &Topology,
        with_ids: bool,
    ) -> Result<(), QueryTreeError> {
        let table = tree.node(id)?.table.clone();
        let containers = self.containers_for(&table, topology).unwrap_or_default();
        {
            let node = tree.node_mut(id)?;
            if table.is_edge() {
                node.foreign_keys = topology
                    .edge_foreign_keys(&table)
                    .cloned()
                    .unwrap_or_default();
            }
            node.labels.extend(self.labels.iter().cloned());
            node.emit |= self.emit;
            node.until_first = self.until_first;
            node.drop = self.drop;
            node.has_containers.extend(containers);
            node.comparators.extend(self.order.iter().cloned());
            if self.range.is_some() {
                node.range = self.range;
            }
        }
        if with_ids {
            tree.add_id_predicates(id, &self.id_predicates)?;
        }
        Ok(())
    }

    /// Grow the tree below `parent` and return the nodes this hop produced.
    ///
    /// A vertex-to-vertex hop goes through an intermediate edge-table node;
    /// that node is dropped again when no endpoint vertex table survives the
    /// filters. `Both` expands into one `Out` and one `In` branch.
    pub fn expand(
        &self,
        tree: &mut QueryTree,
        parent: NodeId,
        topology: &Topology,
    ) -> Result<Vec<NodeId>, QueryTreeError> {
        let parent_table = tree.node(parent)?.table.clone();
        let mut produced = Vec::new();

        match &self.kind {
            HopKind::GraphRoot(_) | HopKind::IncomingRoot(_) => {
                return Err(QueryTreeError::NotExpandable(format!("{}", self)));
            }
            HopKind::Vertex(step) => {
                if !parent_table.is_vertex() {
                    return Err(QueryTreeError::KindAlternation {
                        parent: parent_table.to_string(),
                        child: format!("{}", self),
                    });
                }
                let labels = topology.table_labels(&parent_table).ok_or_else(|| {
                    GraphSchemaError::table_error_with_context(
                        parent_table.to_string(),
                        format!("While expanding {}", self),
                    )
                })?;

                for direction in step.direction.resolved() {
                    let edges = match direction {
                        Direction::Out => &labels.out_edges,
                        _ => &labels.in_edges,
                    };
                    for edge in edges {
                        if !step.edge_labels.is_empty()
                            && !step.edge_labels.iter().any(|l| edge.matches_label(l))
                        {
                            continue;
                        }
                        let edge_node = NewNode {
                            table: edge.clone(),
                            direction: *direction,
                            step_kind: StepKind::VertexHop,
                            depth: self.depth,
                            join_key: ForeignKey::new(parent_table.clone(), *direction),
                            properties: topology.properties(edge).cloned().unwrap_or_default(),
                            intermediate: step.returns == ElementKind::Vertex,
                        };

                        if step.returns == ElementKind::Edge {
                            if !self.matches_table(edge, topology) {
                                continue;
                            }
                            let child = tree.add_child(parent, edge_node)?;
                            self.apply_to_node(tree, child, topology, true)?;
                            produced.push(child);
                            continue;
                        }

                        // the far endpoint sits behind the opposite foreign key
                        let targets = topology
                            .edge_foreign_keys(edge)
                            .map(|fks| {
                                fks.iter()
                                    .filter(|fk| fk.direction == direction.opposite())
                                    .filter(|fk| self.matches_table(&fk.vertex, topology))
                                    .cloned()
                                    .collect::<Vec<_>>()
                            })
                            .unwrap_or_default();
                        if targets.is_empty() {
                            continue;
                        }

                        let edge_id = tree.add_child(parent, edge_node)?;
                        for fk in targets {
                            let vertex = fk.vertex.clone();
                            let child = tree.add_child(
                                edge_id,
                                NewNode {
                                    properties: topology
                                        .properties(&vertex)
                                        .cloned()
                                        .unwrap_or_default(),
                                    table: vertex,
                                    direction: *direction,
                                    step_kind: StepKind::VertexHop,
                                    depth: self.depth,
                                    join_key: fk,
                                    intermediate: false,
                                },
                            )?;
                            self.apply_to_node(tree, child, topology, true)?;
                            produced.push(child);
                        }
                    }
                }
            }
            HopKind::EdgeVertex(direction) => {
                if !parent_table.is_edge() {
                    return Err(QueryTreeError::KindAlternation {
                        parent: parent_table.to_string(),
                        child: format!("{}", self),
                    });
                }
                let fks = topology
                    .edge_foreign_keys(&parent_table)
                    .cloned()
                    .unwrap_or_default();
                for resolved in direction.resolved() {
                    for fk in fks.iter().filter(|fk| fk.direction == *resolved) {
                        if !self.matches_table(&fk.vertex, topology) {
                            continue;
                        }
                        let child = tree.add_child(
                            parent,
                            NewNode {
                                table: fk.vertex.clone(),
                                direction: *resolved,
                                step_kind: StepKind::EdgeVertexHop,
                                depth: self.depth,
                                join_key: fk.clone(),
                                properties: topology
                                    .properties(&fk.vertex)
                                    .cloned()
                                    .unwrap_or_default(),
                                intermediate: false,
                            },
                        )?;
                        self.apply_to_node(tree, child, topology, true)?;
                        produced.push(child);
                    }
                }
            }
        }

        log::trace!(
            "Hop {} from {} produced {} node(s)",
            self,
            parent_table,
            produced.len()
        );
        Ok(produced)
    }
}

impl fmt::Display for HopDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            HopKind::GraphRoot(ElementKind::Vertex) => write!(f, "V()")?,
            HopKind::GraphRoot(ElementKind::Edge) => write!(f, "E()")?,
            HopKind::IncomingRoot(_) => write!(f, "incoming()")?,
            HopKind::Vertex(step) => write!(f, "{}", crate::traversal::Step::Vertex(step.clone()))?,
            HopKind::EdgeVertex(direction) => write!(
                f,
                "{}",
                crate::traversal::Step::EdgeVertex(crate::traversal::EdgeVertexStep {
                    direction: *direction
                })
            )?,
        }
        for p in &self.id_predicates {
            write!(f, ".hasId({})", p)?;
        }
        for p in &self.label_predicates {
            write!(f, ".hasLabel({})", p)?;
        }
        for c in &self.has_containers {
            write!(f, ".has({})", c)?;
        }
        if !self.order.is_empty() {
            write!(f, ".{}", crate::traversal::Step::Order(self.order.clone()))?;
        }
        if let Some(range) = &self.range {
            write!(f, ".{}", crate::traversal::Step::Range(*range))?;
        }
        if self.emit {
            write!(f, ".emit")?;
        }
        if self.left_join {
            write!(f, ".leftJoin")?;
        }
        if self.drop {
            write!(f, ".drop()")?;
        }
        let user = self
            .labels
            .iter()
            .filter(|l| l.is_user())
            .map(|l| format!("'{}'", l.name))
            .collect::<Vec<_>>();
        if !user.is_empty() {
            write!(f, ".as({})", user.join(","))?;
        }
        Ok(())
    }
}
