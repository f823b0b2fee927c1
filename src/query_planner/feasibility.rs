//! Shape checks deciding whether a composite step can be fused.
//!
//! These only look at the step structure; they never touch the topology.

use super::errors::RewriteError;
use super::has_classifier::classify_all;
use crate::traversal::{
    ChooseStep, OrderKey, OrderSpec, RepeatStep, Step, StepNode, Traversal,
};

/// Hops a fusible `repeat(..).times(n)` unrolls into.
pub fn repeat_unroll(repeat: &RepeatStep, max_unroll: usize, full_text: bool) -> Result<usize, RewriteError> {
    let text = Step::Repeat(repeat.clone()).to_string();
    if repeat.until.is_some() {
        return Err(RewriteError::unsupported_with_context(
            "repeat with an until condition has no fixed depth",
            text,
        ));
    }
    let Some(times) = repeat.times else {
        return Err(RewriteError::unsupported_with_context(
            "repeat without times(n) has no fixed depth",
            text,
        ));
    };
    if repeat
        .emit
        .as_ref()
        .is_some_and(|emit| emit.condition.is_some())
    {
        return Err(RewriteError::unsupported_with_context(
            "conditional emit",
            text,
        ));
    }

    let unroll = if repeat.loop_first { times } else { times.max(1) };
    if unroll == 0 {
        return Err(RewriteError::unsupported_with_context(
            "times(0) before repeat never runs the body",
            text,
        ));
    }
    if unroll > max_unroll {
        return Err(RewriteError::unsupported_with_context(
            format!("times({}) exceeds the unroll limit of {}", times, max_unroll),
            text,
        ));
    }

    let body = &repeat.body.steps;
    if !body.iter().any(|node| node.step.is_hop()) {
        return Err(RewriteError::unsupported_with_context(
            "repeat body does not move along edges",
            text,
        ));
    }
    for node in body {
        match &node.step {
            Step::Vertex(_) | Step::EdgeVertex(_) | Step::Identity => {}
            Step::Has(containers) if classify_all(containers, full_text).is_complete() => {}
            other => {
                return Err(RewriteError::unsupported_with_context(
                    format!("{} inside a repeat body", other),
                    text,
                ))
            }
        }
    }
    Ok(unroll)
}

pub fn check_order(specs: &[OrderSpec]) -> Result<(), RewriteError> {
    for spec in specs {
        if matches!(spec.key, OrderKey::Aggregate(_) | OrderKey::Lambda(_)) {
            return Err(RewriteError::unsupported_with_context(
                "order key is not a column",
                spec.to_string(),
            ));
        }
    }
    Ok(())
}

/// Validate an optional body. `rooted` is true when the enclosing run starts
/// from `g.V()`/`g.E()`; ordering and ranges inside the body need that.
pub fn check_optional(body: &Traversal, rooted: bool, full_text: bool) -> Result<(), RewriteError> {
    let text = Step::Optional(body.clone()).to_string();
    let Some(first) = body.steps.first() else {
        return Err(RewriteError::unsupported_with_context("empty optional body", text));
    };
    if !first.step.is_hop() {
        return Err(RewriteError::unsupported_with_context(
            format!("optional body starting with {}", first.step),
            text,
        ));
    }

    let last = body.steps.len() - 1;
    for (index, node) in body.steps.iter().enumerate() {
        match &node.step {
            Step::Vertex(_) | Step::EdgeVertex(_) | Step::Identity => {}
            Step::Has(containers) => {
                if !classify_all(containers, full_text).is_complete() {
                    return Err(RewriteError::unsupported_with_context(
                        format!("{} cannot be fully translated", node.step),
                        text,
                    ));
                }
            }
            Step::Order(specs) => {
                check_order(specs)?;
                if !rooted {
                    return Err(RewriteError::unsupported_with_context(
                        "order inside an optional needs a graph-rooted run",
                        text,
                    ));
                }
            }
            Step::Range(_) if index == last && rooted => {}
            Step::Optional(nested) if index == last => check_optional(nested, rooted, full_text)?,
            other => {
                return Err(RewriteError::unsupported_with_context(
                    format!("{} at position {} of an optional body", other, index),
                    text,
                ))
            }
        }
    }
    Ok(())
}

fn without_trailing_exists(steps: &[StepNode]) -> &[StepNode] {
    match steps.split_last() {
        Some((last, rest)) if last.step == Step::Exists => rest,
        _ => steps,
    }
}

/// `choose(c, t, identity())` with `c == t` is `optional(t)`. Returns the
/// branch to fuse as an optional.
pub fn choose_branch(choose: &ChooseStep) -> Result<&Traversal, RewriteError> {
    let text = Step::Choose(choose.clone()).to_string();
    let is_identity = |t: &Traversal| t.steps.len() == 1 && t.steps[0].step == Step::Identity;

    if !is_identity(&choose.false_branch) {
        return Err(RewriteError::unsupported_with_context(
            "choose is only fused when the false branch is identity()",
            text,
        ));
    }
    if without_trailing_exists(&choose.condition.steps) != choose.true_branch.steps.as_slice() {
        return Err(RewriteError::unsupported_with_context(
            "choose condition differs from its true branch",
            text,
        ));
    }
    Ok(&choose.true_branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::{
        EmitPosition, EmitSpec, HasContainer, Predicate, RangeSpec, SortOrder, VertexStep,
    };

    fn out() -> Step {
        Step::Vertex(VertexStep::out(&[]))
    }

    #[test]
    fn test_repeat_times_unrolls() {
        let repeat = RepeatStep::times(Traversal::new(vec![out()]), 3);
        assert_eq!(repeat_unroll(&repeat, 32, false), Ok(3));
    }

    #[test]
    fn test_repeat_times_zero() {
        // do-while: the body still runs once
        let repeat = RepeatStep::times(Traversal::new(vec![out()]), 0);
        assert_eq!(repeat_unroll(&repeat, 32, false), Ok(1));

        let mut while_do = repeat.clone();
        while_do.loop_first = true;
        assert!(repeat_unroll(&while_do, 32, false).is_err());
    }

    #[test]
    fn test_repeat_rejections() {
        let mut repeat = RepeatStep::times(Traversal::new(vec![out()]), 2);
        repeat.until = Some(Traversal::new(vec![Step::Has(vec![HasContainer::new(
            "label",
            Predicate::eq("none"),
        )])]));
        assert!(repeat_unroll(&repeat, 32, false).is_err());

        let limited = RepeatStep::times(Traversal::new(vec![out()]), 40);
        assert!(repeat_unroll(&limited, 32, false).is_err());

        let mut conditional = RepeatStep::times(Traversal::new(vec![out()]), 2);
        conditional.emit = Some(EmitSpec {
            position: EmitPosition::After,
            condition: Some(Traversal::new(vec![out()])),
        });
        assert!(repeat_unroll(&conditional, 32, false).is_err());

        let no_hop = RepeatStep::times(Traversal::new(vec![Step::Identity]), 2);
        assert!(repeat_unroll(&no_hop, 32, false).is_err());
    }

    #[test]
    fn test_optional_shapes() {
        let ok = Traversal::new(vec![out(), Step::Range(RangeSpec::limit(1))]);
        assert!(check_optional(&ok, true, false).is_ok());
        assert!(check_optional(&ok, false, false).is_err());

        let starts_with_has = Traversal::new(vec![Step::Has(vec![HasContainer::new(
            "age",
            Predicate::gt(1),
        )])]);
        assert!(check_optional(&starts_with_has, true, false).is_err());

        let range_not_last = Traversal::new(vec![out(), Step::Range(RangeSpec::limit(1)), out()]);
        assert!(check_optional(&range_not_last, true, false).is_err());

        let ordered = Traversal::new(vec![
            out(),
            Step::Order(vec![OrderSpec::property("age", SortOrder::Desc)]),
        ]);
        assert!(check_optional(&ordered, true, false).is_ok());
    }

    #[test]
    fn test_choose_as_optional() {
        let branch = Traversal::new(vec![out()]);
        let mut condition = branch.clone();
        condition.steps.push(StepNode::new(Step::Exists));
        let choose = ChooseStep {
            condition,
            true_branch: branch.clone(),
            false_branch: Traversal::new(vec![Step::Identity]),
        };
        assert_eq!(choose_branch(&choose), Ok(&branch));

        let flipped = ChooseStep {
            condition: choose.condition.clone(),
            true_branch: Traversal::new(vec![Step::Identity]),
            false_branch: branch,
        };
        assert!(choose_branch(&flipped).is_err());
    }
}
