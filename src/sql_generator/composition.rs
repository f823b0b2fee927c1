//! Optional-phase statements.
//!
//! The stack ends at a node whose optional body may match nothing. Every
//! branch below it is compiled into its own sub-select and LEFT JOINed on the
//! carried key; a row survives only when all branches come back empty.

use super::errors::SqlGenerationError;
use super::select_builder::{RootCondition, StackCompiler};
use super::SqlFragment;
use crate::query_tree::{AliasColumn, NodeId, PathStack};

impl StackCompiler<'_> {
    pub(crate) fn compose_optional(
        &mut self,
        stack: &PathStack,
        segments: &[Vec<NodeId>],
        outputs: &[(NodeId, AliasColumn)],
        root: Option<&RootCondition>,
    ) -> Result<SqlFragment, SqlGenerationError> {
        let frontier = stack.terminal().ok_or(SqlGenerationError::EmptyStack)?;

        let mut links = Vec::with_capacity(stack.branches.len());
        for branch in &stack.branches {
            let first = *branch.first().ok_or(SqlGenerationError::EmptyStack)?;
            let (carried, joined) = self.join_columns(first)?;
            self.want(frontier, carried.clone());
            links.push((first, carried, joined));
        }
        self.prepare_carries(segments)?;

        let main = self.render_segmented(segments, outputs, root)?;
        let mut sql = SqlFragment::new(format!("SELECT {}", main.select.join(", ")));
        sql.append(main.from);
        let frontier_segment = main.segment_of.get(&frontier).cloned().ok_or_else(|| {
            SqlGenerationError::InvalidPlan(format!("optional frontier {} is in no segment", frontier))
        })?;

        let mut absent = Vec::with_capacity(links.len());
        for (branch, (first, carried, joined)) in stack.branches.iter().zip(links) {
            let terminal = *branch.last().ok_or(SqlGenerationError::EmptyStack)?;
            let branch_outputs = vec![(first, joined.clone()), (terminal, AliasColumn::Id)];
            let body = self.render_chain(branch, &branch_outputs, None)?;
            let name = self.next_sub_select();

            let carried_alias = self.alias(frontier, &carried)?;
            let joined_alias = self.alias(first, &joined)?;
            let terminal_alias = self.alias(terminal, &AliasColumn::Id)?;

            sql.push_str(" LEFT JOIN (");
            sql.append(body);
            sql.push_str(&format!(
                ") AS {} ON {}.{} = {}.{}",
                self.quote(&name),
                self.quote(&frontier_segment),
                self.quote(&carried_alias),
                self.quote(&name),
                self.quote(&joined_alias)
            ));
            absent.push(format!(
                "({}.{} IS NULL)",
                self.quote(&name),
                self.quote(&terminal_alias)
            ));
        }

        if !absent.is_empty() {
            sql.push_str(&format!(" WHERE {}", absent.join(" AND ")));
        }
        log::debug!(
            "Optional frontier {} composed with {} branch(es)",
            frontier,
            stack.branches.len()
        );
        Ok(sql)
    }
}
