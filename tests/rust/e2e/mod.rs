//! End-to-end tests - compiled statements executed against a seeded
//! in-memory SQLite graph, with paths decoded back into elements.
//!
//! Graph: Person 1 (40) knows 2 (25) and 3 (35); 3 knows 4 (50).

use sqlgraph::config::CompilerConfig;
use sqlgraph::graph_catalog::{GraphSchemaConfig, TableRef, Topology};
use sqlgraph::query_planner::StepChainRewriter;
use sqlgraph::query_tree::Phase;
use sqlgraph::result::{ElementFragment, ResultAssembler, SqlExecutor, SqliteExecutor};
use sqlgraph::sql_generator::{dialect_for, plan_runs, QueryPlan};
use sqlgraph::traversal::{parse_traversal, Value};

const SCHEMA: &str = r#"
schema: public
vertices:
  - label: Person
    properties: { name: string, age: integer }
edges:
  - label: knows
    properties: { since: integer }
    connections:
      - { out: Person, in: Person }
"#;

const OUT_FK: &str = "public.Person__O";
const IN_FK: &str = "public.Person__I";

fn topology() -> Topology {
    GraphSchemaConfig::from_yaml_str(SCHEMA)
        .and_then(|config| config.build_topology())
        .unwrap()
}

fn seeded() -> SqliteExecutor {
    let executor = SqliteExecutor::open_in_memory(&["public"]).unwrap();
    executor.create_tables(&topology()).unwrap();

    let person = TableRef::vertex("public", "Person");
    for (id, name, age) in [(1, "marko", 40), (2, "vadas", 25), (3, "josh", 35), (4, "peter", 50)] {
        executor
            .insert_element(
                &person,
                id,
                &[("name", Value::from(name)), ("age", Value::Int(age))],
            )
            .unwrap();
    }

    let knows = TableRef::edge("public", "knows");
    for (id, out, inv, since) in [(10, 1, 2, 2010), (11, 1, 3, 2011), (12, 3, 4, 2012)] {
        executor
            .insert_element(
                &knows,
                id,
                &[
                    ("since", Value::Int(since)),
                    (OUT_FK, Value::Int(out)),
                    (IN_FK, Value::Int(inv)),
                ],
            )
            .unwrap();
    }
    executor
}

fn plans(text: &str, config: &CompilerConfig) -> Vec<QueryPlan> {
    let outcome = StepChainRewriter::new(config).rewrite(parse_traversal(text).unwrap());
    assert!(outcome.fallbacks.is_empty(), "{:?}", outcome.fallbacks);
    plan_runs(&outcome, &topology(), config).unwrap()
}

fn run(executor: &SqliteExecutor, text: &str) -> Vec<Vec<ElementFragment>> {
    let config = CompilerConfig::default();
    let plans = plans(text, &config);
    assert_eq!(plans.len(), 1, "one fused run for {}", text);
    let dialect = dialect_for(config.dialect);
    ResultAssembler::new(executor, dialect.as_ref(), plans[0].clone(), &config)
        .paths()
        .unwrap()
}

fn terminal_ids(paths: &[Vec<ElementFragment>]) -> Vec<i64> {
    paths
        .iter()
        .filter_map(|path| path.last())
        .map(ElementFragment::id)
        .collect()
}

fn count(executor: &SqliteExecutor, table: &str) -> i64 {
    let result = executor
        .query(&format!("SELECT COUNT(*) AS n FROM \"public\".\"{}\"", table), &[])
        .unwrap();
    result.rows[0][0].as_i64().unwrap()
}

#[test]
fn test_one_hop_with_filter() {
    let executor = seeded();
    let paths = run(&executor, "g.V(1).out('knows').has('age', gt(30))");
    assert_eq!(terminal_ids(&paths), vec![3]);

    let josh = &paths[0][0];
    assert_eq!(josh.property("name"), Some(&Value::from("josh")));
    assert_eq!(josh.property("age"), Some(&Value::Int(35)));
}

#[test]
fn test_edge_step_reports_endpoints() {
    let executor = seeded();
    let paths = run(&executor, "g.V(3).outE('knows')");
    assert_eq!(paths.len(), 1);
    let edge = &paths[0][0];
    assert_eq!(edge.id(), 12);
    assert_eq!(edge.out_vertex.as_ref().map(|r| r.id), Some(3));
    assert_eq!(edge.in_vertex.as_ref().map(|r| r.id), Some(4));
}

#[test]
fn test_repeat_times_two() {
    let executor = seeded();
    let paths = run(&executor, "g.V(1).repeat(out('knows')).times(2)");
    assert_eq!(terminal_ids(&paths), vec![4]);
}

#[test]
fn test_labelled_path_keeps_every_step() {
    let executor = seeded();
    let paths = run(&executor, "g.V(1).as('a').out('knows').as('b').out('knows').path()");
    assert_eq!(paths.len(), 1);
    let ids: Vec<i64> = paths[0].iter().map(ElementFragment::id).collect();
    assert_eq!(ids, vec![1, 3, 4]);
    assert!(paths[0][0].labels.contains("a"));
}

#[test]
fn test_large_within_through_temp_table() {
    let executor = seeded();
    let mut values: Vec<String> = (1000..10_998).map(|i| i.to_string()).collect();
    values.push("25".to_string());
    values.push("35".to_string());
    let text = format!("g.V().has('age', within({}))", values.join(","));

    let plans = plans(&text, &CompilerConfig::default());
    assert_eq!(plans[0].statements[0].bulk_tables[0].values.len(), 10_000);

    let mut ids = terminal_ids(&run(&executor, &text));
    ids.sort();
    assert_eq!(ids, vec![2, 3]);

    // temp tables are gone once the assembler is dropped
    let leftovers = executor
        .query("SELECT name FROM sqlite_temp_master WHERE name LIKE 'bulk_%'", &[])
        .unwrap();
    assert!(leftovers.is_empty());
}

#[test]
fn test_large_without_through_temp_table() {
    let executor = seeded();
    let values: Vec<String> = (100..300).chain([40]).map(|i: i64| i.to_string()).collect();
    let text = format!("g.V().has('age', without({}))", values.join(","));
    let mut ids = terminal_ids(&run(&executor, &text));
    ids.sort();
    assert_eq!(ids, vec![2, 3, 4]);
}

#[test]
fn test_duplicate_within_values_match_once() {
    let executor = seeded();
    let inline = terminal_ids(&run(&executor, "g.V().has('age', within(35,35))"));
    assert_eq!(inline, vec![3]);

    let values: Vec<String> = std::iter::repeat(35)
        .take(200)
        .chain(1000..1200)
        .map(|i: i64| i.to_string())
        .collect();
    let text = format!("g.V().has('age', within({}))", values.join(","));
    let plans = plans(&text, &CompilerConfig::default());
    assert_eq!(plans[0].statements[0].bulk_tables[0].values.len(), 201);

    assert_eq!(terminal_ids(&run(&executor, &text)), inline);
}

#[test]
fn test_both_follows_edges_either_way() {
    let executor = seeded();
    let mut ids = terminal_ids(&run(&executor, "g.V(3).both('knows')"));
    ids.sort();
    assert_eq!(ids, vec![1, 4]);
}

#[test]
fn test_optional_returns_roots_without_branch() {
    let executor = seeded();
    let config = CompilerConfig::default();
    let plan = plans("g.V().optional(out('knows'))", &config).remove(0);
    let dialect = dialect_for(config.dialect);

    let rows = ResultAssembler::new(&executor, dialect.as_ref(), plan, &config)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let mut regular: Vec<i64> = rows
        .iter()
        .filter(|r| r.phase == Phase::Regular)
        .filter_map(|r| r.terminal().map(ElementFragment::id))
        .collect();
    let mut optional: Vec<i64> = rows
        .iter()
        .filter(|r| r.phase == Phase::Optional)
        .filter_map(|r| r.terminal().map(ElementFragment::id))
        .collect();
    regular.sort();
    optional.sort();
    assert_eq!(regular, vec![2, 3, 4]);
    assert_eq!(optional, vec![2, 4]);
}

#[test]
fn test_order_and_limit_across_executions() {
    let executor = seeded();
    let text = "g.V(1,3).out('knows').order().by('age', desc).limit(2)";
    let plans = plans(text, &CompilerConfig::default());
    assert_eq!(plans[0].executions, 2);
    assert!(plans[0].window.is_some());

    let paths = run(&executor, text);
    assert_eq!(terminal_ids(&paths), vec![4, 3]);
}

#[test]
fn test_single_execution_limits_in_sql() {
    let executor = seeded();
    let paths = run(&executor, "g.V(1).out('knows').order().by('age').limit(1)");
    assert_eq!(terminal_ids(&paths), vec![2]);
}

#[test]
fn test_emit_returns_every_iteration() {
    let executor = seeded();
    let config = CompilerConfig::default();
    let plan = plans("g.V(1).repeat(out('knows')).emit().times(2)", &config).remove(0);
    let dialect = dialect_for(config.dialect);

    let rows = ResultAssembler::new(&executor, dialect.as_ref(), plan, &config)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let mut emitted: Vec<i64> = rows
        .iter()
        .filter(|r| r.phase == Phase::Emit)
        .filter_map(|r| r.terminal().map(ElementFragment::id))
        .collect();
    emitted.sort();
    assert_eq!(emitted, vec![2, 3]);

    let regular: Vec<i64> = rows
        .iter()
        .filter(|r| r.phase == Phase::Regular)
        .filter_map(|r| r.terminal().map(ElementFragment::id))
        .collect();
    assert_eq!(regular, vec![4]);
}

#[test]
fn test_drop_removes_vertex_and_incident_edges() {
    let executor = seeded();
    let paths = run(&executor, "g.V().has('age', gt(45)).drop()");
    assert!(paths.is_empty());

    assert_eq!(count(&executor, "V_Person"), 3);
    assert_eq!(count(&executor, "E_knows"), 2);
    let remaining = run(&executor, "g.V(3).out('knows')");
    assert!(remaining.is_empty());
}

#[test]
fn test_eager_and_lazy_agree() {
    let executor = seeded();
    let text = "g.V().out('knows').out('knows')";
    let lazy = run(&executor, text);

    let config = CompilerConfig {
        lazy_results: false,
        ..CompilerConfig::default()
    };
    let plan = plans(text, &config).remove(0);
    let dialect = dialect_for(config.dialect);
    let eager = ResultAssembler::new(&executor, dialect.as_ref(), plan, &config)
        .paths()
        .unwrap();
    assert_eq!(terminal_ids(&lazy), terminal_ids(&eager));
    assert_eq!(terminal_ids(&eager), vec![4]);
}

#[test]
fn test_nested_optional_keeps_each_level() {
    let executor = seeded();
    let config = CompilerConfig::default();
    let text = "g.V().hasLabel('Person').optional(out('knows').optional(out('knows')))";
    let plan = plans(text, &config).remove(0);
    let dialect = dialect_for(config.dialect);

    let rows = ResultAssembler::new(&executor, dialect.as_ref(), plan, &config)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let mut terminals: Vec<i64> = rows
        .iter()
        .filter_map(|r| r.terminal().map(ElementFragment::id))
        .collect();
    terminals.sort();
    // 1 -> 2, 1 -> 3 -> 4, 2 alone, 3 -> 4, 4 alone
    assert_eq!(terminals, vec![2, 2, 4, 4, 4]);
    assert!(rows.iter().any(|r| r.phase == Phase::Optional));
}
