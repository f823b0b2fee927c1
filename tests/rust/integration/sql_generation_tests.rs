use std::collections::BTreeSet;
use std::io::Write;

use super::{plans, plans_with, SCHEMA};
use sqlgraph::config::{CompilerConfig, DialectKind};
use sqlgraph::graph_catalog::GraphSchemaConfig;
use sqlgraph::query_tree::Phase;
use sqlgraph::sql_generator::{plan_runs, SqlParam};
use sqlgraph::traversal::parse_traversal;
use sqlgraph::query_planner::StepChainRewriter;
use test_case::test_case;

fn statements(text: &str) -> Vec<String> {
    plans(text)
        .into_iter()
        .flat_map(|plan| plan.statements)
        .map(|q| q.sql)
        .collect()
}

#[test_case("g.V().hasLabel('Person').outE('created')", 1; "vertex to edge")]
#[test_case("g.V().hasLabel('Person').out('created')", 2; "vertex to vertex")]
#[test_case("g.V().hasLabel('Person').out('livesIn')", 2; "into city")]
#[test_case("g.V().hasLabel('Person').out('created').in('created')", 4; "there and back")]
fn test_table_transitions_are_inner_joins(text: &str, joins: usize) {
    let sql = statements(text);
    assert_eq!(sql.len(), 1, "{:?}", sql);
    assert_eq!(sql[0].matches(" INNER JOIN ").count(), joins, "{}", sql[0]);
}

#[test]
fn test_one_hop_statement_shape() {
    let plans = plans("g.V(1).out('knows').has('age', gt(30))");
    assert_eq!(plans.len(), 1);
    let query = &plans[0].statements[0];
    assert_eq!(query.phase, Phase::Regular);
    assert!(query.sql.starts_with("SELECT "));
    assert!(query.sql.contains("FROM \"public\".\"E_knows\""));
    assert!(query.sql.contains("\"public\".\"V_Person\".\"age\" > ?"));
    // the elided root id binds to the edge's out foreign key
    assert!(query.sql.contains("\"public.Person__O\" = ?"));
    assert_eq!(query.terminal().unwrap().table.label, "Person");
    assert!(query.parameters.contains(&SqlParam::RootId));
}

#[test]
fn test_revisited_table_gets_one_sub_select_per_visit() {
    let sql = statements("g.V(1).out('knows').out('knows').out('knows')");
    assert_eq!(sql.len(), 1);
    for name in ["a1", "a2", "a3"] {
        assert!(sql[0].contains(&format!("AS \"{}\"", name)), "{}", sql[0]);
    }
    assert!(!sql[0].contains("\"a4\""));
}

#[test]
fn test_large_within_goes_through_temp_table() {
    let values = (0..10_000).map(|i| i.to_string()).collect::<Vec<_>>();
    let text = format!("g.V().has('age', within({})).out('knows')", values.join(","));
    let plans = plans(&text);
    let query = &plans[0].statements[0];
    assert_eq!(query.bulk_tables.len(), 1);
    assert_eq!(query.bulk_tables[0].values.len(), 10_000);
    assert!(query.sql.contains(&format!("\"{}\"", query.bulk_tables[0].name)));
    assert!(!query.sql.contains(" IN ("));
    assert!(query.parameters.len() < 10);
}

#[test_case("g.V().out('knows').as('a').out('knows').as('b').path()"; "labelled")]
#[test_case("g.V(1).repeat(out()).times(3)"; "unrolled")]
#[test_case("g.V().optional(out('knows').out('created'))"; "optional")]
fn test_aliases_are_injective(text: &str) {
    for plan in plans(text) {
        for query in &plan.statements {
            let keys: BTreeSet<_> = query.aliases.values().collect();
            assert_eq!(keys.len(), query.aliases.len(), "{}", query.sql);
        }
    }
}

#[test]
fn test_clickhouse_quotes_with_backticks() {
    let config = CompilerConfig {
        dialect: DialectKind::Clickhouse,
        ..CompilerConfig::default()
    };
    let plans = plans_with("g.V().hasLabel('Person').out('knows').limit(5)", &config);
    let sql = &plans[0].statements[0].sql;
    assert!(sql.contains("`public`.`V_Person`"), "{}", sql);
    assert!(!sql.contains('"'));
    assert!(sql.ends_with("LIMIT 5"));
}

#[test]
fn test_schema_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SCHEMA.as_bytes()).unwrap();

    let topology = GraphSchemaConfig::from_yaml_file(file.path())
        .unwrap()
        .build_topology()
        .unwrap();
    let config = CompilerConfig::default();
    let outcome = StepChainRewriter::new(&config)
        .rewrite(parse_traversal("g.V().hasLabel('City').in('livesIn')").unwrap());
    let plans = plan_runs(&outcome, &topology, &config).unwrap();
    assert_eq!(plans[0].statements.len(), 1);
    assert!(plans[0].statements[0].sql.contains("\"public\".\"V_City\""));
}

#[test]
fn test_unknown_label_in_schema_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        b"vertices:\n  - label: Person\nedges:\n  - label: knows\n    connections:\n      - { out: Person, in: Robot }\n",
    )
    .unwrap();
    let config = GraphSchemaConfig::from_yaml_file(file.path()).unwrap();
    assert!(config.build_topology().is_err());
}
