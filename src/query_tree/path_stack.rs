use serde::Serialize;
use std::fmt;

use super::{NodeId, QueryTree, QueryTreeError};

/// SQL phases, executed strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Regular,
    Optional,
    Emit,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Regular, Phase::Optional, Phase::Emit];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Regular => write!(f, "REGULAR"),
            Phase::Optional => write!(f, "OPTIONAL"),
            Phase::Emit => write!(f, "EMIT"),
        }
    }
}

/// Root-to-leaf node sequence compiled into one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct PathStack {
    pub phase: Phase,
    pub nodes: Vec<NodeId>,
    /// Optional phase only: branches below the stack's last node that are
    /// LEFT JOINed and tested for absence. Each branch starts at a child of
    /// the last node.
    pub branches: Vec<Vec<NodeId>>,
}

impl PathStack {
    pub fn terminal(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }
}

impl QueryTree {
    /// Childless full-depth nodes that are not optional frontiers.
    pub fn regular_leaves(&self) -> Vec<NodeId> {
        self.live_nodes()
            .filter(|(_, n)| n.children.is_empty() && n.depth == self.full_depth && !n.left_join)
            .map(|(id, _)| id)
            .collect()
    }

    /// Path-stacks for one phase, in tree construction order.
    pub fn path_stacks(&self, phase: Phase) -> Result<Vec<PathStack>, QueryTreeError> {
        if self.unsatisfiable {
            return Ok(Vec::new());
        }
        let mut stacks = Vec::new();
        match phase {
            Phase::Regular => {
                for leaf in self.regular_leaves() {
                    stacks.push(PathStack {
                        phase,
                        nodes: self.path_to(leaf)?,
                        branches: Vec::new(),
                    });
                }
            }
            Phase::Optional => {
                let frontiers = self
                    .live_nodes()
                    .filter(|(_, n)| n.left_join)
                    .map(|(id, _)| id)
                    .collect::<Vec<_>>();
                for frontier in frontiers {
                    let mut branches = Vec::new();
                    for child in self.node(frontier)?.children.clone() {
                        self.collect_branches(child, Vec::new(), &mut branches)?;
                    }
                    stacks.push(PathStack {
                        phase,
                        nodes: self.path_to(frontier)?,
                        branches,
                    });
                }
            }
            Phase::Emit => {
                let regular = self.regular_leaves();
                let emitted = self
                    .live_nodes()
                    .filter(|(id, n)| n.emit && !n.left_join && !regular.contains(id))
                    .map(|(id, _)| id)
                    .collect::<Vec<_>>();
                for node in emitted {
                    stacks.push(PathStack {
                        phase,
                        nodes: self.path_to(node)?,
                        branches: Vec::new(),
                    });
                }
            }
        }
        Ok(stacks)
    }

    /// Walk down from `node` until a childless or left-join node closes the branch.
    fn collect_branches(
        &self,
        node: NodeId,
        mut prefix: Vec<NodeId>,
        out: &mut Vec<Vec<NodeId>>,
    ) -> Result<(), QueryTreeError> {
        prefix.push(node);
        let current = self.node(node)?;
        if current.children.is_empty() || current.left_join {
            out.push(prefix);
            return Ok(());
        }
        for child in &current.children {
            self.collect_branches(*child, prefix.clone(), out)?;
        }
        Ok(())
    }
}
