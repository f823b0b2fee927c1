use std::fmt;

use super::dialect::{dialect_for, SqlDialect};
use super::drop::DropPlan;
use super::errors::SqlGenerationError;
use super::CompiledQuery;
use crate::config::CompilerConfig;
use crate::graph_catalog::Topology;
use crate::query_planner::{CompiledTraversal, RewriteOutcome};
use crate::query_tree::{Phase, RootBinding};
use crate::traversal::RangeSpec;

/// Ordering and range applied in memory over every statement's rows, used
/// when results come from more than one execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultWindow {
    pub range: Option<RangeSpec>,
}

/// Everything needed to execute one compiled run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Phase order first, then tree order.
    pub statements: Vec<CompiledQuery>,
    pub window: Option<ResultWindow>,
    pub drop: Option<DropPlan>,
    /// Statement executions the plan needs; incoming roots count as many.
    pub executions: usize,
}

fn executions_for(binding: &RootBinding) -> usize {
    match binding {
        RootBinding::Ids(ids) => ids.len(),
        RootBinding::Incoming => 2,
        RootBinding::Unconstrained => 1,
    }
}

impl QueryPlan {
    pub fn build(
        compiled: &CompiledTraversal,
        topology: &Topology,
        config: &CompilerConfig,
        dialect: &dyn SqlDialect,
    ) -> Result<Self, SqlGenerationError> {
        let mut trees = compiled.build_trees(topology, config)?;

        let mut stacks = Vec::new();
        for phase in Phase::ALL {
            for (index, tree) in trees.iter().enumerate() {
                for stack in tree.path_stacks(phase)? {
                    stacks.push((index, stack));
                }
            }
        }

        let executions: usize = stacks
            .iter()
            .map(|(index, _)| executions_for(&trees[*index].root_binding))
            .sum();
        let windowed = executions > 1 && compiled.has_order_or_range();

        let mut statements = Vec::with_capacity(stacks.len());
        for (index, stack) in &stacks {
            statements.push(trees[*index].compile_stack(stack, dialect, config, windowed)?);
        }

        let window = windowed.then(|| ResultWindow {
            range: compiled.hops().iter().rev().find_map(|h| h.range),
        });
        if let Some(window) = &window {
            log::debug!(
                "{} execution(s) share one ordering/range window {:?}",
                executions,
                window.range
            );
        }

        let drop = compiled.is_drop().then(|| {
            DropPlan::build(
                statements.iter().filter_map(|q| q.terminal()).map(|f| &f.table),
                topology,
                dialect,
            )
        });

        log::info!(
            "Planned {} statement(s) for {} ({} execution(s))",
            statements.len(),
            compiled,
            executions
        );
        Ok(QueryPlan {
            statements,
            window,
            drop,
            executions,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn needs_incoming(&self) -> bool {
        self.statements
            .iter()
            .any(|q| q.root_binding == RootBinding::Incoming)
    }
}

/// Plan every fused run of a rewritten traversal, in chain order.
pub fn plan_runs(
    outcome: &RewriteOutcome,
    topology: &Topology,
    config: &CompilerConfig,
) -> Result<Vec<QueryPlan>, SqlGenerationError> {
    let dialect = dialect_for(config.dialect);
    outcome
        .compiled()
        .map(|compiled| QueryPlan::build(compiled, topology, config, dialect.as_ref()))
        .collect()
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, statement) in self.statements.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", statement)?;
        }
        if let Some(window) = &self.window {
            write!(f, "\n[WINDOW] {:?}", window.range)?;
        }
        if let Some(drop) = &self.drop {
            for target in &drop.targets {
                for delete in &target.deletes {
                    write!(f, "\n[DROP] {}", delete)?;
                }
            }
        }
        Ok(())
    }
}
