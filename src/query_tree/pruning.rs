use super::{NodeId, QueryTree, QueryTreeError};
use crate::traversal::Predicate;

fn is_empty_membership(predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Within(values) => values.is_empty(),
        Predicate::And(parts) => parts.iter().any(is_empty_membership),
        Predicate::Or(parts) => !parts.is_empty() && parts.iter().all(is_empty_membership),
        _ => false,
    }
}

impl QueryTree {
    /// Drop branches that cannot produce rows.
    ///
    /// Nodes filtered by an empty `within` go first. Then childless nodes
    /// shallower than `full_depth` are removed, unless they are emit or
    /// left-join nodes, until no such leaf remains. Edge tables crossed by a
    /// vertex hop are removed once they lose their vertex side. Running this
    /// twice is a no-op.
    pub fn prune(&mut self) -> Result<(), QueryTreeError> {
        let unsatisfiable = self
            .live_nodes()
            .filter(|(_, node)| {
                node.id_predicates.iter().any(is_empty_membership)
                    || node
                        .has_containers
                        .iter()
                        .any(|c| is_empty_membership(&c.predicate))
            })
            .map(|(id, _)| id)
            .collect::<Vec<NodeId>>();

        for id in unsatisfiable {
            if self.is_root(id) {
                self.unsatisfiable = true;
            } else if !self.node(id)?.removed {
                self.remove_subtree(id)?;
            }
        }

        loop {
            let shallow = self
                .live_nodes()
                .filter(|(id, node)| {
                    !self.is_root(*id)
                        && node.children.is_empty()
                        && (node.intermediate
                            || (node.depth < self.full_depth && !node.emit && !node.left_join))
                })
                .map(|(id, _)| id)
                .collect::<Vec<NodeId>>();
            if shallow.is_empty() {
                break;
            }
            for id in shallow {
                log::trace!("Pruning under-depth node {}", id);
                self.remove_subtree(id)?;
            }
        }
        Ok(())
    }
}
