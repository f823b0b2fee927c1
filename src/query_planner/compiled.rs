use std::fmt;

use super::hop_descriptor::{HopDescriptor, HopKind};
use crate::config::CompilerConfig;
use crate::graph_catalog::{TableRef, Topology};
use crate::query_tree::{bound_ids, QueryTree, QueryTreeError, RootBinding};

/// A fused run: root hop first, then one descriptor per hop.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTraversal {
    hops: Vec<HopDescriptor>,
}

impl CompiledTraversal {
    pub fn new(hops: Vec<HopDescriptor>) -> Self {
        CompiledTraversal { hops }
    }

    pub fn hops(&self) -> &[HopDescriptor] {
        &self.hops
    }

    /// The run ends in a fused `drop()`.
    pub fn is_drop(&self) -> bool {
        self.hops.last().is_some_and(|h| h.drop)
    }

    pub fn has_order_or_range(&self) -> bool {
        self.hops
            .iter()
            .any(|h| !h.order.is_empty() || h.range.is_some())
    }

    /// Roots come from the elements flowing into the run.
    pub fn is_incoming(&self) -> bool {
        self.hops
            .first()
            .is_some_and(|h| matches!(h.kind, HopKind::IncomingRoot(_)))
    }

    fn root_ids(root: &HopDescriptor, table: &TableRef, config: &CompilerConfig) -> Option<Vec<i64>> {
        let [predicate] = root.id_predicates.as_slice() else {
            return None;
        };
        let ids = bound_ids(predicate, table)?;
        (ids.len() <= config.bulk_within_threshold).then_some(ids)
    }

    /// One query tree per candidate root table, expanded hop by hop and
    /// pruned.
    pub fn build_trees(
        &self,
        topology: &Topology,
        config: &CompilerConfig,
    ) -> Result<Vec<QueryTree>, QueryTreeError> {
        let Some((root_hop, rest)) = self.hops.split_first() else {
            return Ok(Vec::new());
        };

        let mut trees = Vec::new();
        for table in root_hop.root_tables(topology) {
            let (binding, ids_bound) = match root_hop.kind {
                HopKind::IncomingRoot(_) => (RootBinding::Incoming, false),
                _ => match Self::root_ids(root_hop, &table, config) {
                    Some(ids) if ids.is_empty() => {
                        log::debug!("No requested id belongs to {}, skipping", table);
                        continue;
                    }
                    Some(ids) => (RootBinding::Ids(ids), true),
                    None => (RootBinding::Unconstrained, false),
                },
            };

            let properties = topology.properties(&table).cloned().unwrap_or_default();
            let mut tree = QueryTree::new(table, properties, binding);
            let root = tree.root();
            root_hop.apply_to_node(&mut tree, root, topology, !ids_bound)?;

            let mut frontier = vec![root];
            for hop in rest {
                if hop.left_join {
                    for id in &frontier {
                        tree.node_mut(*id)?.left_join = true;
                    }
                }
                let mut next = Vec::new();
                for parent in frontier {
                    next.extend(hop.expand(&mut tree, parent, topology)?);
                }
                frontier = next;
            }

            tree.full_depth = rest.len();
            tree.prune()?;
            log::debug!(
                "Query tree rooted at {} has {} live node(s)",
                tree.node(root)?.table,
                tree.len()
            );
            trees.push(tree);
        }
        Ok(trees)
    }
}

impl fmt::Display for CompiledTraversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hops = self.hops.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        write!(f, "sql[{}]", hops.join("."))
    }
}
