//! Text form of traversals: `g.V(1).out('knows').has('age', gt(30))`.
//!
//! Parsing happens in two passes. The nom grammar below only recognizes
//! method-call chains with literal, keyword, lambda and nested-chain
//! arguments; [`parse_traversal`] then interprets the calls as steps.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0},
    combinator::{map, opt, recognize},
    error::ParseError,
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use std::fmt;

use super::errors::TraversalParseError;
use super::predicate::{Compare, HasContainer, Predicate, TextPredicate, Value, ID_KEY, LABEL_KEY};
use super::{
    ChooseStep, EdgeVertexStep, EmitPosition, EmitSpec, GraphStep, OrderKey, OrderSpec, RangeSpec,
    RepeatStep, SortOrder, Step, StepNode, Traversal, VertexStep,
};
use crate::graph_catalog::{Direction, ElementKind};

fn ws<'a, O, E: ParseError<&'a str>, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
{
    delimited(multispace0, inner, multispace0)
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
    Keyword(String),
    Lambda(String),
    Chain(Vec<Call>),
}

#[derive(Debug, Clone, PartialEq)]
struct Call {
    name: String,
    args: Vec<Arg>,
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => write!(f, "'{}'", s),
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(x) => write!(f, "{}", x),
            Arg::Keyword(k) => write!(f, "{}", k),
            Arg::Lambda(code) => write!(f, "{{{}}}", code),
            Arg::Chain(calls) => {
                let parts = calls.iter().map(|c| c.to_string()).collect::<Vec<_>>();
                write!(f, "{}", parts.join("."))
            }
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self.args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        write!(f, "{}({})", self.name, args.join(","))
    }
}

// e.g. "out", "hasLabel", "__", "order_by2"
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn quoted_string(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_until("'"), char('\'')),
        delimited(char('"'), take_until("\""), char('"')),
    ))
    .parse(input)
}

/// Matches: 123, -123, 3.14, -3.14
fn numeric_literal(input: &str) -> IResult<&str, Arg> {
    let (rest, text) = recognize(pair(
        opt(char('-')),
        alt((recognize((digit1, char('.'), digit1)), digit1)),
    ))
    .parse(input)?;

    let arg = match text.parse::<i64>() {
        Ok(i) => Arg::Int(i),
        Err(_) => match text.parse::<f64>() {
            Ok(x) => Arg::Float(x),
            Err(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Float,
                )))
            }
        },
    };
    Ok((rest, arg))
}

// e.g. "desc", "T.id", "Order.desc"
fn keyword(input: &str) -> IResult<&str, &str> {
    recognize(pair(identifier, opt(pair(char('.'), identifier)))).parse(input)
}

fn lambda(input: &str) -> IResult<&str, &str> {
    delimited(char('{'), take_until("}"), char('}')).parse(input)
}

fn argument(input: &str) -> IResult<&str, Arg> {
    ws(alt((
        map(lambda, |code: &str| Arg::Lambda(code.trim().to_string())),
        map(quoted_string, |s: &str| Arg::Str(s.to_string())),
        numeric_literal,
        map(chain, Arg::Chain),
        map(keyword, |k: &str| Arg::Keyword(k.to_string())),
    )))
    .parse(input)
}

fn call(input: &str) -> IResult<&str, Call> {
    let (input, name) = ws(identifier).parse(input)?;
    let (input, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), argument),
        ws(char(')')),
    )
    .parse(input)?;
    Ok((
        input,
        Call {
            name: name.to_string(),
            args,
        },
    ))
}

/// Anonymous chain such as `__.out('knows').has('age')` or `P.gt(30).and(lt(50))`.
fn chain(input: &str) -> IResult<&str, Vec<Call>> {
    let (input, _) = opt(alt((tag("__."), tag("TextP."), tag("P.")))).parse(input)?;
    let (input, first) = call(input)?;
    let (input, mut rest) = many0(preceded(ws(char('.')), call)).parse(input)?;
    rest.insert(0, first);
    Ok((input, rest))
}

fn source_chain(input: &str) -> IResult<&str, Vec<Call>> {
    let (input, _) = ws(char('g')).parse(input)?;
    let (input, calls) = many0(preceded(ws(char('.')), call)).parse(input)?;
    Ok((input, calls))
}

/// Parse a traversal starting with `g.V(..)` or `g.E(..)`.
pub fn parse_traversal(input: &str) -> Result<Traversal, TraversalParseError> {
    let (rest, calls) = source_chain(input).map_err(|e| syntax_error(input, e))?;
    if !rest.trim().is_empty() {
        return Err(TraversalParseError::TrailingInput(rest.trim().to_string()));
    }

    let Some((source, tail)) = calls.split_first() else {
        return Err(TraversalParseError::MissingSource {
            found: input.trim().to_string(),
        });
    };
    let kind = match source.name.as_str() {
        "V" => ElementKind::Vertex,
        "E" => ElementKind::Edge,
        _ => {
            return Err(TraversalParseError::MissingSource {
                found: source.to_string(),
            })
        }
    };
    let ids = source
        .args
        .iter()
        .map(|arg| value_from_arg(&source.name, arg))
        .collect::<Result<Vec<_>, _>>()?;

    let source = StepNode::new(Step::Graph(GraphStep { kind, ids }));
    let traversal = build_traversal(vec![source], tail)?;
    log::debug!("Parsed traversal: {}", traversal);
    Ok(traversal)
}

fn syntax_error(input: &str, err: nom::Err<nom::error::Error<&str>>) -> TraversalParseError {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => TraversalParseError::Syntax {
            offset: input.len() - e.input.len(),
            near: e.input.chars().take(24).collect(),
        },
        nom::Err::Incomplete(_) => TraversalParseError::Syntax {
            offset: input.len(),
            near: String::new(),
        },
    }
}

/// Loop modulators written before `repeat(..)`.
#[derive(Default)]
struct PendingLoop {
    times: Option<usize>,
    until: Option<Traversal>,
    emit: Option<Option<Traversal>>,
}

impl PendingLoop {
    fn is_empty(&self) -> bool {
        self.times.is_none() && self.until.is_none() && self.emit.is_none()
    }
}

/// Append the steps for `calls` to `steps`. A leading `as(..)` labels the
/// last seeded step; anonymous sub-traversals start unseeded.
fn build_traversal(
    mut steps: Vec<StepNode>,
    calls: &[Call],
) -> Result<Traversal, TraversalParseError> {
    let mut pending = PendingLoop::default();
    let mut i = 0;

    while i < calls.len() {
        let c = &calls[i];
        i += 1;
        let step = match c.name.as_str() {
            "out" | "in" | "both" | "outE" | "inE" | "bothE" => {
                let (direction, returns) = match c.name.as_str() {
                    "out" => (Direction::Out, ElementKind::Vertex),
                    "in" => (Direction::In, ElementKind::Vertex),
                    "both" => (Direction::Both, ElementKind::Vertex),
                    "outE" => (Direction::Out, ElementKind::Edge),
                    "inE" => (Direction::In, ElementKind::Edge),
                    _ => (Direction::Both, ElementKind::Edge),
                };
                Step::Vertex(VertexStep {
                    direction,
                    edge_labels: string_args(c)?,
                    returns,
                })
            }
            "outV" | "inV" | "bothV" => {
                let direction = match c.name.as_str() {
                    "outV" => Direction::Out,
                    "inV" => Direction::In,
                    _ => Direction::Both,
                };
                Step::EdgeVertex(EdgeVertexStep { direction })
            }
            "has" => Step::Has(has_containers(c)?),
            "hasLabel" => Step::Has(vec![HasContainer::new(
                LABEL_KEY,
                values_predicate(c, &c.args)?,
            )]),
            "hasId" => Step::Has(vec![HasContainer::new(
                ID_KEY,
                values_predicate(c, &c.args)?,
            )]),
            "hasNot" => {
                let keys = string_args(c)?;
                if keys.len() != 1 {
                    return Err(TraversalParseError::invalid_argument(
                        &c.name,
                        "expected one property key",
                    ));
                }
                Step::Has(vec![HasContainer::new(keys[0].clone(), Predicate::NotExists)])
            }
            "as" => {
                let labels = string_args(c)?;
                let Some(last) = steps.last_mut() else {
                    return Err(TraversalParseError::invalid_argument(
                        "as",
                        "must follow a step",
                    ));
                };
                last.labels.extend(labels);
                continue;
            }
            "order" => {
                let mut specs = Vec::new();
                while i < calls.len() && calls[i].name == "by" {
                    specs.push(order_spec(&calls[i])?);
                    i += 1;
                }
                if specs.is_empty() {
                    specs.push(OrderSpec {
                        key: OrderKey::Id,
                        order: SortOrder::Asc,
                    });
                }
                Step::Order(specs)
            }
            "limit" => Step::Range(RangeSpec::limit(usize_arg(c, 0)?)),
            "skip" => Step::Range(RangeSpec {
                low: usize_arg(c, 0)?,
                high: None,
            }),
            "range" => {
                let low = usize_arg(c, 0)?;
                let high = match c.args.get(1) {
                    Some(Arg::Int(-1)) => None,
                    _ => Some(usize_arg(c, 1)?),
                };
                if high.is_some_and(|h| h < low) {
                    return Err(TraversalParseError::invalid_argument(
                        "range",
                        "high must not be below low",
                    ));
                }
                Step::Range(RangeSpec { low, high })
            }
            "repeat" => {
                let body = traversal_arg(c, 0)?;
                let loop_first = pending.times.is_some() || pending.until.is_some();
                let emit = pending.emit.take().map(|condition| EmitSpec {
                    position: EmitPosition::Before,
                    condition,
                });
                Step::Repeat(RepeatStep {
                    body,
                    times: pending.times.take(),
                    until: pending.until.take(),
                    emit,
                    loop_first,
                })
            }
            "times" | "until" | "emit" => {
                apply_loop_modulator(c, steps.last_mut(), &mut pending)?;
                continue;
            }
            "optional" => Step::Optional(traversal_arg(c, 0)?),
            "choose" if c.args.len() == 3 => {
                let mut condition = traversal_arg(c, 0)?;
                condition.steps.push(StepNode::new(Step::Exists));
                Step::Choose(ChooseStep {
                    condition,
                    true_branch: traversal_arg(c, 1)?,
                    false_branch: traversal_arg(c, 2)?,
                })
            }
            "identity" => Step::Identity,
            "drop" => Step::Drop,
            "path" => Step::Path,
            "tree" => Step::Tree,
            _ => Step::Interpreted(c.to_string()),
        };
        steps.push(StepNode::new(step));
    }

    if !pending.is_empty() {
        let modulator = if pending.times.is_some() {
            "times"
        } else if pending.until.is_some() {
            "until"
        } else {
            "emit"
        };
        return Err(TraversalParseError::DanglingModulator {
            modulator: modulator.to_string(),
            target: "repeat",
        });
    }

    Ok(Traversal {
        steps,
        mutation_listener: false,
    })
}

fn apply_loop_modulator(
    c: &Call,
    last: Option<&mut StepNode>,
    pending: &mut PendingLoop,
) -> Result<(), TraversalParseError> {
    let repeat = match last {
        Some(StepNode {
            step: Step::Repeat(repeat),
            ..
        }) => Some(repeat),
        _ => None,
    };

    match c.name.as_str() {
        "times" => {
            let n = usize_arg(c, 0)?;
            match repeat {
                Some(r) if r.times.is_none() && r.until.is_none() => r.times = Some(n),
                _ => pending.times = Some(n),
            }
        }
        "until" => {
            let until = traversal_arg(c, 0)?;
            match repeat {
                Some(r) if r.times.is_none() && r.until.is_none() => r.until = Some(until),
                _ => pending.until = Some(until),
            }
        }
        _ => {
            let condition = match c.args.first() {
                Some(_) => Some(traversal_arg(c, 0)?),
                None => None,
            };
            match repeat {
                Some(r) if r.emit.is_none() => {
                    r.emit = Some(EmitSpec {
                        position: EmitPosition::After,
                        condition,
                    })
                }
                _ => pending.emit = Some(condition),
            }
        }
    }
    Ok(())
}

fn string_args(c: &Call) -> Result<Vec<String>, TraversalParseError> {
    c.args
        .iter()
        .map(|a| match a {
            Arg::Str(s) => Ok(s.clone()),
            other => Err(TraversalParseError::invalid_argument(
                &c.name,
                format!("expected a string, found {}", other),
            )),
        })
        .collect()
}

fn usize_arg(c: &Call, index: usize) -> Result<usize, TraversalParseError> {
    match c.args.get(index) {
        Some(Arg::Int(i)) if *i >= 0 => Ok(*i as usize),
        _ => Err(TraversalParseError::invalid_argument(
            &c.name,
            format!("argument {} must be a non-negative integer", index + 1),
        )),
    }
}

fn traversal_arg(c: &Call, index: usize) -> Result<Traversal, TraversalParseError> {
    match c.args.get(index) {
        Some(Arg::Chain(calls)) => build_traversal(Vec::new(), calls),
        _ => Err(TraversalParseError::invalid_argument(
            &c.name,
            format!("argument {} must be a traversal", index + 1),
        )),
    }
}

fn value_from_arg(step: &str, arg: &Arg) -> Result<Value, TraversalParseError> {
    match arg {
        Arg::Str(s) => Ok(Value::String(s.clone())),
        Arg::Int(i) => Ok(Value::Int(*i)),
        Arg::Float(x) => Ok(Value::Float(*x)),
        Arg::Keyword(k) if k == "true" => Ok(Value::Bool(true)),
        Arg::Keyword(k) if k == "false" => Ok(Value::Bool(false)),
        Arg::Keyword(k) if k == "null" => Ok(Value::Null),
        other => Err(TraversalParseError::invalid_argument(
            step,
            format!("expected a literal value, found {}", other),
        )),
    }
}

fn property_key(step: &str, arg: &Arg) -> Result<String, TraversalParseError> {
    match arg {
        Arg::Str(s) => Ok(s.clone()),
        Arg::Keyword(k) if k == "T.id" || k == "id" => Ok(ID_KEY.to_string()),
        Arg::Keyword(k) if k == "T.label" || k == "label" => Ok(LABEL_KEY.to_string()),
        other => Err(TraversalParseError::invalid_argument(
            step,
            format!("expected a property key, found {}", other),
        )),
    }
}

fn has_containers(c: &Call) -> Result<Vec<HasContainer>, TraversalParseError> {
    match c.args.as_slice() {
        [key] => Ok(vec![HasContainer::new(
            property_key(&c.name, key)?,
            Predicate::Exists,
        )]),
        [key, value] => Ok(vec![HasContainer::new(
            property_key(&c.name, key)?,
            predicate_from_arg(&c.name, value)?,
        )]),
        [Arg::Str(label), key, value] => Ok(vec![
            HasContainer::new(LABEL_KEY, Predicate::eq(label.as_str())),
            HasContainer::new(
                property_key(&c.name, key)?,
                predicate_from_arg(&c.name, value)?,
            ),
        ]),
        _ => Err(TraversalParseError::invalid_argument(
            &c.name,
            "expected (key), (key, value) or (label, key, value)",
        )),
    }
}

/// `hasLabel('a')`, `hasId(1, 2)` or `hasId(within(1, 2))`.
fn values_predicate(c: &Call, args: &[Arg]) -> Result<Predicate, TraversalParseError> {
    match args {
        [] => Err(TraversalParseError::invalid_argument(
            &c.name,
            "expected at least one value",
        )),
        [single] => predicate_from_arg(&c.name, single),
        many => Ok(Predicate::Within(
            many.iter()
                .map(|a| value_from_arg(&c.name, a))
                .collect::<Result<Vec<_>, _>>()?,
        )),
    }
}

fn predicate_from_arg(step: &str, arg: &Arg) -> Result<Predicate, TraversalParseError> {
    match arg {
        Arg::Lambda(code) => Ok(Predicate::Lambda(code.clone())),
        Arg::Chain(calls) => {
            let Some((first, rest)) = calls.split_first() else {
                return Err(TraversalParseError::invalid_argument(step, "empty predicate"));
            };
            let mut predicate = predicate_call(first)?;
            for connective in rest {
                let other = match connective.args.as_slice() {
                    [arg] => predicate_from_arg(&connective.name, arg)?,
                    _ => {
                        return Err(TraversalParseError::invalid_argument(
                            &connective.name,
                            "expected one predicate",
                        ))
                    }
                };
                predicate = match connective.name.as_str() {
                    "and" => Predicate::And(vec![predicate, other]),
                    "or" => Predicate::Or(vec![predicate, other]),
                    other => return Err(TraversalParseError::UnknownPredicate(other.to_string())),
                };
            }
            Ok(predicate)
        }
        literal => Ok(Predicate::Compare(Compare::Eq, value_from_arg(step, literal)?)),
    }
}

fn predicate_call(c: &Call) -> Result<Predicate, TraversalParseError> {
    let values = || -> Result<Vec<Value>, TraversalParseError> {
        c.args.iter().map(|a| value_from_arg(&c.name, a)).collect()
    };
    let pair = || -> Result<(Value, Value), TraversalParseError> {
        match values()?.as_slice() {
            [a, b] => Ok((a.clone(), b.clone())),
            _ => Err(TraversalParseError::invalid_argument(
                &c.name,
                "expected two values",
            )),
        }
    };
    let single = || -> Result<Value, TraversalParseError> {
        match values()?.as_slice() {
            [v] => Ok(v.clone()),
            _ => Err(TraversalParseError::invalid_argument(
                &c.name,
                "expected one value",
            )),
        }
    };
    let text = |t: TextPredicate| -> Result<Predicate, TraversalParseError> {
        match single()? {
            Value::String(s) => Ok(Predicate::Text(t, s)),
            _ => Err(TraversalParseError::invalid_argument(
                &c.name,
                "expected a string",
            )),
        }
    };

    match c.name.as_str() {
        "eq" => Ok(Predicate::Compare(Compare::Eq, single()?)),
        "neq" => Ok(Predicate::Compare(Compare::Neq, single()?)),
        "lt" => Ok(Predicate::Compare(Compare::Lt, single()?)),
        "lte" => Ok(Predicate::Compare(Compare::Lte, single()?)),
        "gt" => Ok(Predicate::Compare(Compare::Gt, single()?)),
        "gte" => Ok(Predicate::Compare(Compare::Gte, single()?)),
        "within" => Ok(Predicate::Within(values()?)),
        "without" => Ok(Predicate::Without(values()?)),
        "between" => pair().map(|(a, b)| Predicate::Between(a, b)),
        "inside" => pair().map(|(a, b)| Predicate::Inside(a, b)),
        "outside" => pair().map(|(a, b)| Predicate::Outside(a, b)),
        "containing" => text(TextPredicate::Containing),
        "notContaining" => text(TextPredicate::NotContaining),
        "startingWith" => text(TextPredicate::StartingWith),
        "notStartingWith" => text(TextPredicate::NotStartingWith),
        "endingWith" => text(TextPredicate::EndingWith),
        "notEndingWith" => text(TextPredicate::NotEndingWith),
        "fullText" => match values()?.as_slice() {
            [Value::String(query)] => Ok(Predicate::FullText {
                query: query.clone(),
                configuration: None,
            }),
            [Value::String(query), Value::String(configuration)] => Ok(Predicate::FullText {
                query: query.clone(),
                configuration: Some(configuration.clone()),
            }),
            _ => Err(TraversalParseError::invalid_argument(
                &c.name,
                "expected (query) or (query, configuration)",
            )),
        },
        other => Err(TraversalParseError::UnknownPredicate(other.to_string())),
    }
}

fn sort_order(arg: &Arg) -> Option<SortOrder> {
    match arg {
        Arg::Keyword(k) => match k.trim_start_matches("Order.") {
            "asc" | "incr" => Some(SortOrder::Asc),
            "desc" | "decr" => Some(SortOrder::Desc),
            _ => None,
        },
        _ => None,
    }
}

fn order_spec(by: &Call) -> Result<OrderSpec, TraversalParseError> {
    let (key_arg, order) = match by.args.as_slice() {
        [] => (None, SortOrder::Asc),
        [only] => match sort_order(only) {
            Some(order) => (None, order),
            None => (Some(only), SortOrder::Asc),
        },
        [key, order] => match sort_order(order) {
            Some(order) => (Some(key), order),
            None => {
                return Err(TraversalParseError::invalid_argument(
                    "by",
                    format!("unknown sort order {}", order),
                ))
            }
        },
        _ => {
            return Err(TraversalParseError::invalid_argument(
                "by",
                "expected (key) or (key, order)",
            ))
        }
    };

    let key = match key_arg {
        None => OrderKey::Id,
        Some(Arg::Str(p)) => OrderKey::Property(p.clone()),
        Some(Arg::Keyword(k)) if k == "T.id" || k == "id" => OrderKey::Id,
        Some(Arg::Lambda(code)) => OrderKey::Lambda(code.clone()),
        Some(Arg::Chain(calls)) => match calls.as_slice() {
            [select] if select.name == "select" => OrderKey::Select {
                label: select_label(select)?,
                property: None,
            },
            [select, by] if select.name == "select" && by.name == "by" => OrderKey::Select {
                label: select_label(select)?,
                property: Some(string_args(by)?.into_iter().next().ok_or_else(|| {
                    TraversalParseError::invalid_argument("by", "expected a property key")
                })?),
            },
            _ => OrderKey::Aggregate(Arg::Chain(calls.clone()).to_string()),
        },
        Some(other) => {
            return Err(TraversalParseError::invalid_argument(
                "by",
                format!("unsupported order key {}", other),
            ))
        }
    };
    Ok(OrderSpec { key, order })
}

fn select_label(select: &Call) -> Result<String, TraversalParseError> {
    match select.args.as_slice() {
        [Arg::Str(label)] => Ok(label.clone()),
        _ => Err(TraversalParseError::invalid_argument(
            "select",
            "expected one label",
        )),
    }
}
