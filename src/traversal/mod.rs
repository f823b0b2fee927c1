//! Step-chain traversal model.
//!
//! A [`Traversal`] is a linear chain of [`StepNode`]s. Nested traversals
//! (repeat bodies, optional branches, choose branches) are themselves
//! `Traversal`s. The rewriter replaces fusible runs with
//! [`Step::Compiled`] in place.

pub mod errors;
pub mod parser;
pub mod predicate;

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::graph_catalog::{Direction, ElementKind};
use crate::query_planner::compiled::CompiledTraversal;

pub use errors::TraversalParseError;
pub use parser::parse_traversal;
pub use predicate::{Compare, HasContainer, Predicate, RecordId, TextPredicate, Value};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Traversal {
    pub steps: Vec<StepNode>,
    /// A mutation-event listener is registered; drops must run step by step.
    pub mutation_listener: bool,
}

impl Traversal {
    pub fn new(steps: Vec<Step>) -> Self {
        Traversal {
            steps: steps.into_iter().map(StepNode::new).collect(),
            mutation_listener: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Does any step from `from` onwards reconstruct the full path?
    pub fn has_path_step_from(&self, from: usize) -> bool {
        self.steps
            .iter()
            .skip(from)
            .any(|node| matches!(node.step, Step::Path | Step::Tree))
    }

    pub fn compiled_steps(&self) -> impl Iterator<Item = &CompiledTraversal> {
        self.steps.iter().filter_map(|node| match &node.step {
            Step::Compiled(compiled) => Some(compiled),
            _ => None,
        })
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.steps.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        write!(f, "{}", parts.join("."))
    }
}

/// One step plus the user labels attached with `as(..)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepNode {
    pub step: Step,
    pub labels: BTreeSet<String>,
}

impl StepNode {
    pub fn new(step: Step) -> Self {
        StepNode {
            step,
            labels: BTreeSet::new(),
        }
    }

    pub fn labelled(step: Step, labels: &[&str]) -> Self {
        StepNode {
            step,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl fmt::Display for StepNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.step)?;
        if !self.labels.is_empty() {
            let labels = self
                .labels
                .iter()
                .map(|l| format!("'{}'", l))
                .collect::<Vec<_>>();
            write!(f, ".as({})", labels.join(","))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `g.V(ids..)` / `g.E(ids..)`
    Graph(GraphStep),
    /// `out/in/both` (vertex result) and `outE/inE/bothE` (edge result)
    Vertex(VertexStep),
    /// `outV/inV/bothV` from an edge
    EdgeVertex(EdgeVertexStep),
    Has(Vec<HasContainer>),
    Order(Vec<OrderSpec>),
    Range(RangeSpec),
    Repeat(RepeatStep),
    Optional(Traversal),
    Choose(ChooseStep),
    Drop,
    Identity,
    /// Has-next test terminating a choose condition.
    Exists,
    Path,
    Tree,
    /// Any step this crate only passes through to the interpreter.
    Interpreted(String),
    Compiled(CompiledTraversal),
}

impl Step {
    /// Steps that move the traverser along the foreign-key graph.
    pub fn is_hop(&self) -> bool {
        matches!(self, Step::Vertex(_) | Step::EdgeVertex(_))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Graph(g) => {
                let ids = g.ids.iter().map(|v| v.to_string()).collect::<Vec<_>>();
                let name = match g.kind {
                    ElementKind::Vertex => "V",
                    ElementKind::Edge => "E",
                };
                write!(f, "g.{}({})", name, ids.join(","))
            }
            Step::Vertex(v) => {
                let name = match v.direction {
                    Direction::Out => "out",
                    Direction::In => "in",
                    Direction::Both => "both",
                };
                let suffix = if v.returns == ElementKind::Edge { "E" } else { "" };
                let labels = v
                    .edge_labels
                    .iter()
                    .map(|l| format!("'{}'", l))
                    .collect::<Vec<_>>();
                write!(f, "{}{}({})", name, suffix, labels.join(","))
            }
            Step::EdgeVertex(e) => match e.direction {
                Direction::Out => write!(f, "outV()"),
                Direction::In => write!(f, "inV()"),
                Direction::Both => write!(f, "bothV()"),
            },
            Step::Has(containers) => {
                let parts = containers.iter().map(|c| c.to_string()).collect::<Vec<_>>();
                write!(f, "has({})", parts.join(","))
            }
            Step::Order(specs) => {
                write!(f, "order()")?;
                for spec in specs {
                    write!(f, ".by({})", spec)?;
                }
                Ok(())
            }
            Step::Range(r) => match r.high {
                Some(high) => write!(f, "range({},{})", r.low, high),
                None => write!(f, "skip({})", r.low),
            },
            Step::Repeat(r) => {
                write!(f, "repeat({})", r.body)?;
                if let Some(times) = r.times {
                    write!(f, ".times({})", times)?;
                }
                if let Some(until) = &r.until {
                    write!(f, ".until({})", until)?;
                }
                if let Some(emit) = &r.emit {
                    match &emit.condition {
                        Some(c) => write!(f, ".emit({})", c)?,
                        None => write!(f, ".emit()")?,
                    }
                }
                Ok(())
            }
            Step::Optional(t) => write!(f, "optional({})", t),
            Step::Choose(c) => write!(
                f,
                "choose({},{},{})",
                c.condition, c.true_branch, c.false_branch
            ),
            Step::Drop => write!(f, "drop()"),
            Step::Identity => write!(f, "identity()"),
            Step::Exists => write!(f, "hasNext()"),
            Step::Path => write!(f, "path()"),
            Step::Tree => write!(f, "tree()"),
            Step::Interpreted(text) => write!(f, "{}", text),
            Step::Compiled(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphStep {
    pub kind: ElementKind,
    pub ids: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexStep {
    pub direction: Direction,
    pub edge_labels: Vec<String>,
    pub returns: ElementKind,
}

impl VertexStep {
    pub fn out(labels: &[&str]) -> Self {
        VertexStep {
            direction: Direction::Out,
            edge_labels: labels.iter().map(|l| l.to_string()).collect(),
            returns: ElementKind::Vertex,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeVertexStep {
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OrderKey {
    Id,
    Property(String),
    /// Property of the element bound to an `as(..)` label
    Select { label: String, property: Option<String> },
    /// Ordering by a nested aggregate traversal such as `count()`
    Aggregate(String),
    Lambda(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSpec {
    pub key: OrderKey,
    pub order: SortOrder,
}

impl OrderSpec {
    pub fn property(name: &str, order: SortOrder) -> Self {
        OrderSpec {
            key: OrderKey::Property(name.to_string()),
            order,
        }
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            OrderKey::Id => write!(f, "id")?,
            OrderKey::Property(p) => write!(f, "'{}'", p)?,
            OrderKey::Select { label, property } => {
                write!(f, "select('{}')", label)?;
                if let Some(p) = property {
                    write!(f, ".by('{}')", p)?;
                }
            }
            OrderKey::Aggregate(text) => write!(f, "{}", text)?,
            OrderKey::Lambda(code) => write!(f, "{{{}}}", code)?,
        }
        match self.order {
            SortOrder::Asc => write!(f, ",asc"),
            SortOrder::Desc => write!(f, ",desc"),
        }
    }
}

/// Half-open `[low, high)` window; `high = None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeSpec {
    pub low: usize,
    pub high: Option<usize>,
}

impl RangeSpec {
    pub fn limit(n: usize) -> Self {
        RangeSpec {
            low: 0,
            high: Some(n),
        }
    }

    pub fn count(&self) -> Option<usize> {
        self.high.map(|h| h.saturating_sub(self.low))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitPosition {
    /// `emit().repeat(..)`: the loop's input is emitted too
    Before,
    /// `repeat(..).emit()`
    After,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmitSpec {
    pub position: EmitPosition,
    pub condition: Option<Traversal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepeatStep {
    pub body: Traversal,
    pub times: Option<usize>,
    pub until: Option<Traversal>,
    pub emit: Option<EmitSpec>,
    /// Loop condition (`times`/`until`) was given before `repeat`
    pub loop_first: bool,
}

impl RepeatStep {
    pub fn times(body: Traversal, times: usize) -> Self {
        RepeatStep {
            body,
            times: Some(times),
            until: None,
            emit: None,
            loop_first: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChooseStep {
    pub condition: Traversal,
    pub true_branch: Traversal,
    pub false_branch: Traversal,
}
