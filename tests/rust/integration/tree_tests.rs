use std::collections::BTreeMap;

use super::{rewrite, topology};
use sqlgraph::config::CompilerConfig;
use sqlgraph::query_tree::{NodeId, Phase, QueryTree, RootBinding};
use test_case::test_case;

fn trees(text: &str) -> Vec<QueryTree> {
    let outcome = rewrite(text);
    let compiled = outcome.compiled().next().expect("one fused run");
    compiled
        .build_trees(&topology(), &CompilerConfig::default())
        .unwrap()
}

fn live(tree: &QueryTree) -> Vec<NodeId> {
    tree.live_nodes().map(|(id, _)| id).collect()
}

#[test_case("g.V().out('knows').out('created')"; "two hops")]
#[test_case("g.V().hasLabel('Person').repeat(out()).times(3)"; "unrolled repeat")]
#[test_case("g.V().optional(out('created'))"; "optional")]
#[test_case("g.V(1).repeat(out('knows')).emit().times(2)"; "emit")]
fn test_pruning_is_idempotent(text: &str) {
    for mut tree in trees(text) {
        let before = live(&tree);
        tree.prune().unwrap();
        assert_eq!(before, live(&tree));
    }
}

#[test]
fn test_pruned_tree_keeps_only_full_depth_leaves() {
    let trees = trees("g.V().out('knows').out('created')");
    for tree in &trees {
        for leaf in tree.regular_leaves() {
            assert_eq!(tree.node(leaf).unwrap().depth, tree.full_depth);
        }
    }
    // only Person roots can reach Software through knows then created
    let rooted: Vec<&str> = trees
        .iter()
        .filter(|t| !t.regular_leaves().is_empty())
        .map(|t| t.node(t.root()).unwrap().table.label.as_str())
        .collect();
    assert_eq!(rooted, vec!["Person"]);
}

#[test_case("g.V().optional(out('knows'))"; "optional")]
#[test_case("g.V(1).repeat(out('knows')).emit().times(2)"; "emit after")]
#[test_case("g.V(1).emit().repeat(out('knows')).times(2)"; "emit before")]
fn test_phases_are_exclusive(text: &str) {
    for tree in trees(text) {
        let mut owner: BTreeMap<NodeId, Phase> = BTreeMap::new();
        for phase in Phase::ALL {
            for stack in tree.path_stacks(phase).unwrap() {
                let terminal = stack.terminal().unwrap();
                if let Some(previous) = owner.insert(terminal, phase) {
                    panic!("{:?} ends stacks in {} and {}", terminal, previous, phase);
                }
            }
        }
    }
}

#[test]
fn test_bound_root_ids_are_recorded() {
    let trees = trees("g.V(1, 2).out('knows')");
    let person = trees
        .iter()
        .find(|t| t.node(t.root()).unwrap().table.label == "Person")
        .unwrap();
    assert_eq!(person.root_binding, RootBinding::Ids(vec![1, 2]));
}
