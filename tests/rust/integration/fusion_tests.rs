use super::{plans, rewrite};
use sqlgraph::config::CompilerConfig;
use sqlgraph::query_planner::{HopKind, StepChainRewriter};
use sqlgraph::traversal::{parse_traversal, Step};
use test_case::test_case;

#[test_case("g.V(1).out('knows')", 1, 0; "single hop")]
#[test_case("g.V().hasLabel('Person').out('created').in('created')", 1, 0; "there and back")]
#[test_case("g.V().limit(2).out('knows')", 2, 0; "range restarts the scan")]
#[test_case("g.V().repeat(out('knows')).until(hasLabel('City'))", 1, 1; "until stays interpreted")]
#[test_case("g.V().out('knows').order().by(out().count(), desc)", 1, 1; "aggregate sort key")]
fn test_fused_runs(text: &str, runs: usize, fallbacks: usize) {
    let outcome = rewrite(text);
    assert_eq!(outcome.compiled().count(), runs, "{}", outcome.traversal);
    assert_eq!(outcome.fallbacks.len(), fallbacks);
    assert!(outcome.fallbacks.iter().all(|f| f.reason.is_fallback()));
}

#[test]
fn test_repeat_times_fuses_into_hops() {
    let outcome = rewrite("g.V(1).repeat(out('knows')).times(2)");
    assert_eq!(outcome.traversal.len(), 1);
    let compiled = outcome.compiled().next().unwrap();
    assert_eq!(compiled.hops().len(), 3);
    assert!(matches!(compiled.hops()[0].kind, HopKind::GraphRoot(_)));

    let plans = plans("g.V(1).repeat(out('knows')).times(2)");
    let statements = &plans[0].statements;
    assert_eq!(statements.len(), 1);
    // bound root is elided, leaving knows/Person twice
    assert!(statements[0].sql.contains("AS \"a2\""));
    assert!(!statements[0].sql.contains("\"a3\""));
}

#[test]
fn test_until_keeps_repeat_in_chain() {
    let outcome = rewrite("g.V().repeat(out('knows')).until(has('age', gt(30)))");
    assert_eq!(outcome.fallbacks[0].index, 1);
    assert!(matches!(outcome.traversal.steps[1].step, Step::Repeat(_)));
}

#[test]
fn test_drop_with_listener_stays_unfused() {
    let mut traversal = parse_traversal("g.V().has('age', gt(45)).drop()").unwrap();
    traversal.mutation_listener = true;
    let outcome = StepChainRewriter::new(&CompilerConfig::default()).rewrite(traversal);

    assert!(matches!(outcome.traversal.steps.last().unwrap().step, Step::Drop));
    assert!(outcome.compiled().all(|c| !c.is_drop()));
    assert!(!outcome.fallbacks.is_empty());
}

#[test]
fn test_trailing_hop_after_partial_has_reads_incoming() {
    let plans = plans("g.V().has('age', {it > 1}).out('knows')");
    assert_eq!(plans.len(), 2);
    assert!(!plans[0].needs_incoming());
    assert!(plans[1].needs_incoming());
    // two executions assumed for incoming roots
    assert!(plans[1].executions >= 2);
}
