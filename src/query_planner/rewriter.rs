//! Folds runs of graph-walking steps into [`Step::Compiled`] markers.
//!
//! A run starts at `g.V()`/`g.E()` or at a bare vertex/edge-vertex step and
//! absorbs every following step that can be expressed as part of one SQL
//! join chain. Composite steps (`repeat`, `optional`, `choose`) are walked
//! with an explicit frame stack; when one of them turns out not to be
//! fusible the hops it added are rolled back and the composite stays in the
//! chain for the interpreter.

use std::collections::BTreeSet;

use super::compiled::CompiledTraversal;
use super::errors::RewriteError;
use super::feasibility;
use super::has_classifier::{classify_all, Classified};
use super::hop_descriptor::{HopDescriptor, HopKind};
use crate::config::CompilerConfig;
use crate::graph_catalog::ElementKind;
use crate::query_tree::{LabelKind, PATH_LABEL};
use crate::traversal::{
    EmitPosition, HasContainer, Predicate, Step, StepNode, Traversal,
};

/// A step the rewriter looked at and left for the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    /// Position of the step in the chain at the time it was examined.
    pub index: usize,
    pub step: String,
    pub reason: RewriteError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    pub traversal: Traversal,
    pub fallbacks: Vec<Fallback>,
}

impl RewriteOutcome {
    pub fn compiled(&self) -> impl Iterator<Item = &CompiledTraversal> {
        self.traversal.compiled_steps()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Top,
    Repeat {
        remaining: usize,
        emit: Option<EmitPosition>,
        loop_first: bool,
    },
    Optional {
        /// The next hop is the first of the body and opens the LEFT JOIN.
        first_hop: bool,
    },
}

struct RewriteFrame<'a> {
    kind: FrameKind,
    steps: &'a [StepNode],
    cursor: usize,
}

enum Absorb<'a> {
    Consumed,
    /// Consumed; the run ends here and the scan restarts.
    End,
    /// Not consumed; the run ends before this step.
    Stop,
    /// Consumed, but part of it goes back into the chain.
    Leftover(StepNode),
    Enter(FrameKind, &'a [StepNode]),
}

struct RunState {
    hops: Vec<HopDescriptor>,
    path_requested: bool,
    rooted: bool,
    mutation_listener: bool,
}

impl RunState {
    fn push_hop(&mut self, kind: HopKind, labels: &BTreeSet<String>, synthetic: bool) -> &mut HopDescriptor {
        let mut hop = HopDescriptor::new(kind, self.hops.len());
        for label in labels {
            hop.add_label(label.clone(), LabelKind::User);
        }
        if synthetic && self.path_requested && labels.is_empty() {
            hop.add_label(PATH_LABEL, LabelKind::Path);
        }
        self.hops.push(hop);
        let last = self.hops.len() - 1;
        &mut self.hops[last]
    }

    fn current(&mut self) -> Result<&mut HopDescriptor, RewriteError> {
        self.hops
            .last_mut()
            .ok_or_else(|| RewriteError::IllegalState("no hop to attach to".to_string()))
    }

    fn label_current(&mut self, labels: &BTreeSet<String>) -> Result<(), RewriteError> {
        let hop = self.current()?;
        for label in labels {
            hop.add_label(label.clone(), LabelKind::User);
        }
        Ok(())
    }

    fn attach(&mut self, classified: Classified) -> Result<(), RewriteError> {
        let hop = self.current()?;
        hop.label_predicates.extend(classified.labels);
        hop.id_predicates.extend(classified.ids);
        hop.has_containers.extend(classified.properties);
        Ok(())
    }
}

pub struct StepChainRewriter {
    max_repeat_unroll: usize,
    full_text: bool,
}

impl StepChainRewriter {
    pub fn new(config: &CompilerConfig) -> Self {
        StepChainRewriter {
            max_repeat_unroll: config.max_repeat_unroll,
            full_text: crate::sql_generator::dialect_for(config.dialect).supports_full_text(),
        }
    }

    fn starts_run(step: &Step) -> bool {
        matches!(step, Step::Graph(_) | Step::Vertex(_) | Step::EdgeVertex(_))
    }

    /// Rewrite the chain. Never fails: anything not fused stays as it was and
    /// is reported in [`RewriteOutcome::fallbacks`].
    pub fn rewrite(&self, traversal: Traversal) -> RewriteOutcome {
        let mut traversal = traversal;
        let mut fallbacks = Vec::new();

        'scan: loop {
            let mut index = 0;
            while index < traversal.steps.len() {
                if !Self::starts_run(&traversal.steps[index].step) {
                    index += 1;
                    continue;
                }
                let run = self.fuse_run(&traversal, index, &mut fallbacks);
                log::debug!(
                    "Fused {} step(s) at {} into {}",
                    run.consumed,
                    index,
                    run.compiled
                );

                let mut replacement = vec![StepNode::new(Step::Compiled(run.compiled))];
                replacement.extend(run.leftover);
                traversal
                    .steps
                    .splice(index..index + run.consumed, replacement);

                if run.restart {
                    continue 'scan;
                }
                index += 1;
            }
            break;
        }

        RewriteOutcome {
            traversal,
            fallbacks,
        }
    }

    fn record(fallbacks: &mut Vec<Fallback>, index: usize, node: &StepNode, reason: RewriteError) {
        match &reason {
            RewriteError::IllegalState(message) => {
                log::warn!("Rolled back fusion of {} at {}: {}", node.step, index, message)
            }
            RewriteError::Unsupported(message) => {
                log::debug!("Left {} at {} to the interpreter: {}", node.step, index, message)
            }
        }
        let fallback = Fallback {
            index,
            step: node.step.to_string(),
            reason,
        };
        if !fallbacks.contains(&fallback) {
            fallbacks.push(fallback);
        }
    }

    fn fuse_run(&self, traversal: &Traversal, start: usize, fallbacks: &mut Vec<Fallback>) -> FusedRun {
        let steps = traversal.steps.as_slice();
        let first = &steps[start];
        let mut run = RunState {
            hops: Vec::new(),
            path_requested: traversal.has_path_step_from(start),
            rooted: matches!(first.step, Step::Graph(_)),
            mutation_listener: traversal.mutation_listener,
        };

        match &first.step {
            Step::Graph(graph) => {
                let hop = run.push_hop(HopKind::GraphRoot(graph.kind), &first.labels, true);
                match graph.ids.as_slice() {
                    [] => {}
                    [id] => hop.id_predicates.push(Predicate::eq(id.clone())),
                    ids => hop.id_predicates.push(Predicate::Within(ids.to_vec())),
                }
            }
            Step::Vertex(step) => {
                run.push_hop(HopKind::IncomingRoot(ElementKind::Vertex), &BTreeSet::new(), false);
                run.push_hop(HopKind::Vertex(step.clone()), &first.labels, true);
            }
            Step::EdgeVertex(step) => {
                run.push_hop(HopKind::IncomingRoot(ElementKind::Edge), &BTreeSet::new(), false);
                run.push_hop(HopKind::EdgeVertex(step.direction), &first.labels, true);
            }
            _ => {}
        }

        let mut stack = vec![RewriteFrame {
            kind: FrameKind::Top,
            steps,
            cursor: start + 1,
        }];
        let mut snapshot: Option<Vec<HopDescriptor>> = None;
        let mut leftover = None;
        let mut restart = false;

        loop {
            let nested = stack.len() > 1;
            let Some(frame) = stack.last_mut() else {
                break;
            };

            if frame.cursor >= frame.steps.len() {
                match frame.kind {
                    FrameKind::Top => break,
                    FrameKind::Repeat {
                        remaining,
                        emit,
                        loop_first,
                    } => {
                        let emits = match emit {
                            Some(EmitPosition::After) => true,
                            Some(EmitPosition::Before) => remaining > 1,
                            None => false,
                        };
                        if emits {
                            if let Some(hop) = run.hops.last_mut() {
                                hop.mark_emit();
                            }
                        }
                        if remaining > 1 {
                            frame.kind = FrameKind::Repeat {
                                remaining: remaining - 1,
                                emit,
                                loop_first,
                            };
                            frame.cursor = 0;
                            continue;
                        }
                        stack.pop();
                        if Self::close_composite(&mut stack, &mut run) {
                            snapshot = None;
                            if emit.is_some() {
                                restart = true;
                                break;
                            }
                        }
                        continue;
                    }
                    FrameKind::Optional { .. } => {
                        stack.pop();
                        if Self::close_composite(&mut stack, &mut run) {
                            restart = true;
                            break;
                        }
                        continue;
                    }
                }
            }

            let body = frame.steps;
            let index = frame.cursor;
            let node = &body[index];
            let is_last = index + 1 == body.len();

            match self.absorb(&mut run, &mut frame.kind, node, is_last) {
                Ok(Absorb::Consumed) => frame.cursor += 1,
                Ok(Absorb::End) => {
                    frame.cursor += 1;
                    restart = true;
                    break;
                }
                Ok(Absorb::Stop) => break,
                Ok(Absorb::Leftover(rest)) => {
                    frame.cursor += 1;
                    leftover = Some(rest);
                    break;
                }
                Ok(Absorb::Enter(kind, inner)) => {
                    if !nested {
                        snapshot = Some(run.hops.clone());
                    }
                    if let FrameKind::Repeat {
                        emit: Some(EmitPosition::Before),
                        ..
                    } = kind
                    {
                        if let Some(hop) = run.hops.last_mut() {
                            hop.mark_emit();
                        }
                    }
                    stack.push(RewriteFrame {
                        kind,
                        steps: inner,
                        cursor: 0,
                    });
                }
                Err(reason) => {
                    if nested {
                        stack.truncate(1);
                        if let Some(hops) = snapshot.take() {
                            run.hops = hops;
                        }
                        let composite = stack[0].cursor;
                        Self::record(fallbacks, composite, &steps[composite], reason);
                    } else {
                        Self::record(fallbacks, index, node, reason);
                    }
                    break;
                }
            }
        }

        let end = stack.first().map(|f| f.cursor).unwrap_or(start + 1);
        FusedRun {
            compiled: CompiledTraversal::new(run.hops),
            consumed: end - start,
            leftover,
            restart,
        }
    }

    /// Advance past the composite step that owned the popped frame and copy
    /// its labels to the current hop. Returns true when that closed a
    /// top-level composite.
    fn close_composite(stack: &mut [RewriteFrame<'_>], run: &mut RunState) -> bool {
        let Some(parent) = stack.last_mut() else {
            return false;
        };
        if let Some(node) = parent.steps.get(parent.cursor) {
            if let Some(hop) = run.hops.last_mut() {
                for label in &node.labels {
                    hop.add_label(label.clone(), LabelKind::User);
                }
            }
        }
        parent.cursor += 1;
        stack.len() == 1
    }

    fn absorb_hop(run: &mut RunState, frame: &mut FrameKind, kind: HopKind, labels: &BTreeSet<String>) {
        let hop = run.push_hop(kind, labels, true);
        match frame {
            FrameKind::Repeat { loop_first, .. } => hop.until_first = *loop_first,
            FrameKind::Optional { first_hop } => {
                if *first_hop {
                    hop.left_join = true;
                    *first_hop = false;
                }
            }
            FrameKind::Top => {}
        }
    }

    fn absorb<'a>(
        &self,
        run: &mut RunState,
        frame: &mut FrameKind,
        node: &'a StepNode,
        is_last: bool,
    ) -> Result<Absorb<'a>, RewriteError> {
        let nested = *frame != FrameKind::Top;

        match &node.step {
            Step::Vertex(step) => {
                Self::absorb_hop(run, frame, HopKind::Vertex(step.clone()), &node.labels);
                Ok(Absorb::Consumed)
            }
            Step::EdgeVertex(step) => {
                Self::absorb_hop(run, frame, HopKind::EdgeVertex(step.direction), &node.labels);
                Ok(Absorb::Consumed)
            }
            Step::Has(containers) => {
                let classified = classify_all(containers, self.full_text);
                if !classified.is_complete() {
                    if nested {
                        return Err(RewriteError::unsupported_with_context(
                            "has filter with untranslatable containers inside a composite",
                            node.step.to_string(),
                        ));
                    }
                    if classified.is_empty() {
                        return Ok(Absorb::Stop);
                    }
                    let remaining: Vec<HasContainer> = classified.remaining.clone();
                    run.attach(classified)?;
                    return Ok(Absorb::Leftover(StepNode {
                        step: Step::Has(remaining),
                        labels: node.labels.clone(),
                    }));
                }
                run.attach(classified)?;
                run.label_current(&node.labels)?;
                Ok(Absorb::Consumed)
            }
            Step::Order(specs) => {
                feasibility::check_order(specs)?;
                let hop = run.current()?;
                hop.order.extend(specs.iter().cloned());
                run.label_current(&node.labels)?;
                Ok(Absorb::Consumed)
            }
            Step::Range(range) => {
                if nested && !is_last {
                    return Err(RewriteError::IllegalState(format!(
                        "{} before the end of a composite body",
                        node.step
                    )));
                }
                run.current()?.range = Some(*range);
                run.label_current(&node.labels)?;
                Ok(if nested { Absorb::Consumed } else { Absorb::End })
            }
            Step::Identity => {
                run.label_current(&node.labels)?;
                Ok(Absorb::Consumed)
            }
            Step::Repeat(repeat) if !nested => {
                let unroll =
                    feasibility::repeat_unroll(repeat, self.max_repeat_unroll, self.full_text)?;
                Ok(Absorb::Enter(
                    FrameKind::Repeat {
                        remaining: unroll,
                        emit: repeat.emit.as_ref().map(|e| e.position),
                        loop_first: repeat.loop_first,
                    },
                    &repeat.body.steps,
                ))
            }
            Step::Optional(body) if !nested || is_last => {
                feasibility::check_optional(body, run.rooted, self.full_text)?;
                Ok(Absorb::Enter(
                    FrameKind::Optional { first_hop: true },
                    &body.steps,
                ))
            }
            Step::Choose(choose) if !nested => {
                let branch = feasibility::choose_branch(choose)?;
                feasibility::check_optional(branch, run.rooted, self.full_text)?;
                Ok(Absorb::Enter(
                    FrameKind::Optional { first_hop: true },
                    &branch.steps,
                ))
            }
            Step::Drop if !nested => {
                if run.mutation_listener {
                    return Err(RewriteError::unsupported_with_context(
                        "drop with a mutation listener runs element by element",
                        node.step.to_string(),
                    ));
                }
                run.current()?.drop = true;
                Ok(Absorb::End)
            }
            other if nested => Err(RewriteError::IllegalState(format!(
                "{} inside a fused composite",
                other
            ))),
            _ => Ok(Absorb::Stop),
        }
    }
}

struct FusedRun {
    compiled: CompiledTraversal,
    consumed: usize,
    leftover: Option<StepNode>,
    restart: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::parse_traversal;

    fn rewrite(text: &str) -> RewriteOutcome {
        let traversal = parse_traversal(text).unwrap();
        StepChainRewriter::new(&CompilerConfig::default()).rewrite(traversal)
    }

    fn only_compiled(outcome: &RewriteOutcome) -> &CompiledTraversal {
        let compiled: Vec<_> = outcome.compiled().collect();
        assert_eq!(compiled.len(), 1, "chain: {}", outcome.traversal);
        compiled[0]
    }

    #[test]
    fn test_plain_run_fuses_completely() {
        let outcome = rewrite("g.V(1).out('knows').has('age', gt(30))");
        assert_eq!(outcome.traversal.len(), 1);
        assert!(outcome.fallbacks.is_empty());

        let compiled = only_compiled(&outcome);
        assert_eq!(compiled.hops().len(), 2);
        assert_eq!(compiled.hops()[0].id_predicates, vec![Predicate::eq(1)]);
        assert_eq!(
            compiled.hops()[1].has_containers,
            vec![HasContainer::new("age", Predicate::gt(30))]
        );
    }

    #[test]
    fn test_repeat_times_unrolls_into_hops() {
        let outcome = rewrite("g.V().repeat(out()).times(2)");
        assert_eq!(outcome.traversal.len(), 1);
        let compiled = only_compiled(&outcome);
        assert_eq!(compiled.hops().len(), 3);
        assert!(compiled.hops()[1..]
            .iter()
            .all(|h| matches!(h.kind, HopKind::Vertex(_))));
    }

    #[test]
    fn test_repeat_until_is_left_alone() {
        let outcome = rewrite("g.V().repeat(out()).until(hasLabel('none'))");
        assert_eq!(outcome.traversal.len(), 2);
        assert!(matches!(outcome.traversal.steps[1].step, Step::Repeat(_)));
        assert_eq!(outcome.fallbacks.len(), 1);
        assert_eq!(outcome.fallbacks[0].index, 1);
        assert!(outcome.fallbacks[0].reason.is_fallback());
        assert_eq!(only_compiled(&outcome).hops().len(), 1);
    }

    #[test]
    fn test_partial_has_leaves_remaining_containers() {
        let outcome = rewrite("g.V().has('age', gt(30)).has('name', {it.length() > 3}).out()");
        let steps = &outcome.traversal.steps;
        assert!(matches!(steps[0].step, Step::Compiled(_)));
        match &steps[1].step {
            Step::Has(containers) => {
                assert_eq!(containers.len(), 1);
                assert_eq!(containers[0].key, "name");
            }
            other => panic!("expected has, got {}", other),
        }
        // the trailing out() starts a run of its own from the incoming vertices
        match &steps[2].step {
            Step::Compiled(compiled) => {
                assert!(matches!(
                    compiled.hops()[0].kind,
                    HopKind::IncomingRoot(ElementKind::Vertex)
                ));
            }
            other => panic!("expected compiled, got {}", other),
        }
    }

    #[test]
    fn test_range_ends_run_and_restarts() {
        let outcome = rewrite("g.V().limit(2).out()");
        let compiled: Vec<_> = outcome.compiled().collect();
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[0].hops()[0].range.and_then(|r| r.high), Some(2));
    }

    #[test]
    fn test_order_by_aggregate_stops_run() {
        let outcome = rewrite("g.V().out().order().by(out().count(), desc)");
        assert_eq!(outcome.traversal.len(), 2);
        assert!(matches!(outcome.traversal.steps[1].step, Step::Order(_)));
        assert_eq!(outcome.fallbacks.len(), 1);
    }

    #[test]
    fn test_optional_marks_first_body_hop() {
        let outcome = rewrite("g.V().optional(out('knows'))");
        let compiled = only_compiled(&outcome);
        assert_eq!(compiled.hops().len(), 2);
        assert!(compiled.hops()[1].left_join);
    }

    #[test]
    fn test_choose_identity_fuses_as_optional() {
        let outcome = rewrite("g.V().choose(out('knows'), out('knows'), identity())");
        let compiled = only_compiled(&outcome);
        assert!(compiled.hops()[1].left_join);
        assert!(outcome.fallbacks.is_empty());
    }

    #[test]
    fn test_untranslatable_optional_is_left_alone() {
        let outcome = rewrite("g.V().optional(out().has('name', {it.size()}))");
        assert_eq!(outcome.traversal.len(), 2);
        assert!(matches!(outcome.traversal.steps[1].step, Step::Optional(_)));
        assert_eq!(only_compiled(&outcome).hops().len(), 1);
    }

    #[test]
    fn test_emit_after_marks_each_iteration() {
        let outcome = rewrite("g.V().repeat(out()).emit().times(2)");
        let compiled = only_compiled(&outcome);
        let emits: Vec<bool> = compiled.hops().iter().map(|h| h.emit).collect();
        assert_eq!(emits, vec![false, true, true]);
    }

    #[test]
    fn test_emit_before_marks_entry() {
        let outcome = rewrite("g.V().emit().repeat(out()).times(2)");
        let compiled = only_compiled(&outcome);
        let emits: Vec<bool> = compiled.hops().iter().map(|h| h.emit).collect();
        assert_eq!(emits, vec![true, true, false]);
    }

    #[test]
    fn test_drop_with_listener_is_not_fused() {
        let mut traversal = parse_traversal("g.V().has('age', gt(90)).drop()").unwrap();
        traversal.mutation_listener = true;
        let outcome = StepChainRewriter::new(&CompilerConfig::default()).rewrite(traversal);
        assert!(matches!(outcome.traversal.steps.last().unwrap().step, Step::Drop));

        let fused = rewrite("g.V().has('age', gt(90)).drop()");
        assert!(only_compiled(&fused).is_drop());
    }

    #[test]
    fn test_path_step_adds_synthetic_labels() {
        let outcome = rewrite("g.V().out().as('a').out().path()");
        let compiled = only_compiled(&outcome);
        let kinds: Vec<Vec<LabelKind>> = compiled
            .hops()
            .iter()
            .map(|h| h.labels.iter().map(|l| l.kind).collect())
            .collect();
        assert_eq!(
            kinds,
            vec![
                vec![LabelKind::Path],
                vec![LabelKind::User],
                vec![LabelKind::Path]
            ]
        );
        assert!(matches!(outcome.traversal.steps[1].step, Step::Path));
    }
}
