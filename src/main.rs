use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sqlgraph::config::{self, CompilerConfig, DialectKind};
use sqlgraph::graph_catalog::{ElementKind, GraphSchemaConfig, Topology};
use sqlgraph::query_planner::StepChainRewriter;
use sqlgraph::sql_generator::{plan_runs, QueryPlan};
use sqlgraph::traversal::parse_traversal;

/// sqlgraph - compile graph traversals into SQL over vertex/edge tables
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Traversal to compile, e.g. "g.V(1).out('knows').has('age', gt(30))"
    traversal: String,

    /// Graph schema YAML listing vertex and edge labels
    #[arg(long)]
    schema: PathBuf,

    /// SQLite database to run the compiled statements against
    #[arg(long)]
    database: Option<PathBuf>,

    /// Print decoded paths as JSON
    #[arg(long)]
    json: bool,

    /// Read all rows before returning the first one
    #[arg(long)]
    eager: bool,

    /// Within/without lists larger than this go through a temp table
    #[arg(long, default_value_t = 100)]
    bulk_within_threshold: usize,

    /// Largest repeat count unrolled into chained joins
    #[arg(long, default_value_t = 32)]
    max_repeat_unroll: usize,

    /// SQL dialect: sqlite or clickhouse
    #[arg(long, default_value_t = DialectKind::Sqlite)]
    dialect: DialectKind,
}

impl From<&Cli> for config::CliConfig {
    fn from(cli: &Cli) -> Self {
        config::CliConfig {
            bulk_within_threshold: cli.bulk_within_threshold,
            eager: cli.eager,
            max_repeat_unroll: cli.max_repeat_unroll,
            dialect: cli.dialect,
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Defaults to INFO, override with RUST_LOG
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = CompilerConfig::from_cli((&cli).into()).context("invalid configuration")?;

    let topology = GraphSchemaConfig::from_yaml_file(&cli.schema)
        .and_then(|schema| schema.build_topology())
        .with_context(|| format!("cannot load schema {}", cli.schema.display()))?;

    let traversal = parse_traversal(&cli.traversal)?;
    let outcome = StepChainRewriter::new(&config).rewrite(traversal);

    println!("{}", outcome.traversal);
    for fallback in &outcome.fallbacks {
        println!("  interpreted #{} {}: {}", fallback.index, fallback.step, fallback.reason);
    }

    let plans = plan_runs(&outcome, &topology, &config)?;
    for (i, plan) in plans.iter().enumerate() {
        println!("\n-- run {} --\n{}", i + 1, plan);
    }

    if let Some(database) = &cli.database {
        execute(database, &topology, &config, &plans, cli.json)?;
    }
    Ok(())
}

fn schemas(topology: &Topology) -> BTreeSet<String> {
    [ElementKind::Vertex, ElementKind::Edge]
        .into_iter()
        .flat_map(|kind| topology.tables(kind))
        .map(|table| table.schema)
        .collect()
}

#[cfg(feature = "sqlite")]
fn execute(
    database: &std::path::Path,
    topology: &Topology,
    config: &CompilerConfig,
    plans: &[QueryPlan],
    json: bool,
) -> anyhow::Result<()> {
    use sqlgraph::result::{ResultAssembler, SqliteExecutor};
    use sqlgraph::sql_generator::dialect_for;

    let schemas = schemas(topology);
    let schemas = schemas.iter().map(String::as_str).collect::<Vec<_>>();
    let executor = SqliteExecutor::open(database, &schemas)?;
    let dialect = dialect_for(config.dialect);

    for (i, plan) in plans.iter().enumerate() {
        if plan.needs_incoming() {
            log::info!("Run {} starts from interpreted steps, not executed", i + 1);
            continue;
        }
        let paths = ResultAssembler::new(&executor, dialect.as_ref(), plan.clone(), config).paths()?;
        println!("\n-- run {}: {} path(s) --", i + 1, paths.len());
        if json {
            println!("{}", serde_json::to_string_pretty(&paths)?);
            continue;
        }
        for path in paths {
            let elements = path.iter().map(|e| e.to_string()).collect::<Vec<_>>();
            println!("{}", elements.join(" -> "));
        }
    }
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
fn execute(
    _database: &std::path::Path,
    topology: &Topology,
    _config: &CompilerConfig,
    _plans: &[QueryPlan],
    _json: bool,
) -> anyhow::Result<()> {
    anyhow::bail!(
        "built without the sqlite feature; cannot execute against schemas {:?}",
        schemas(topology)
    )
}
