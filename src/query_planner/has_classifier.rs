//! Sorting has-filter containers into the buckets a hop can carry.

use crate::traversal::{HasContainer, Predicate, Value};

/// Mutually exclusive destinations for a has container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasBucket {
    Label,
    Id,
    /// `eq/neq/lt/..` and (not-)null tests
    Compare,
    /// `within/without`
    Contains,
    /// `between/inside/outside` and `and/or` connectives
    Range,
    Text,
}

fn is_label_value(value: &Value) -> bool {
    matches!(value, Value::String(_))
}

fn is_id_value(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::String(_) | Value::Id(_))
}

fn label_predicate(predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Compare(op, v) => {
            matches!(op, crate::traversal::Compare::Eq | crate::traversal::Compare::Neq)
                && is_label_value(v)
        }
        Predicate::Within(vs) | Predicate::Without(vs) => vs.iter().all(is_label_value),
        Predicate::And(parts) | Predicate::Or(parts) => parts.iter().all(label_predicate),
        _ => false,
    }
}

fn id_predicate(predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Compare(_, v) => is_id_value(v),
        Predicate::Within(vs) | Predicate::Without(vs) => vs.iter().all(is_id_value),
        Predicate::Between(a, b) | Predicate::Inside(a, b) | Predicate::Outside(a, b) => {
            is_id_value(a) && is_id_value(b)
        }
        Predicate::And(parts) | Predicate::Or(parts) => parts.iter().all(id_predicate),
        _ => false,
    }
}

/// Can this predicate be rendered as a SQL condition at all?
fn translatable(predicate: &Predicate, full_text: bool) -> bool {
    match predicate {
        Predicate::Lambda(_) => false,
        Predicate::FullText { .. } => full_text,
        Predicate::And(parts) | Predicate::Or(parts) => {
            !parts.is_empty() && parts.iter().all(|p| translatable(p, full_text))
        }
        _ => true,
    }
}

/// Classify one container. `None` leaves it for the interpreter.
///
/// The id bucket is only tried for the `id` key and the label bucket only
/// for the `label` key; every other key is classified by predicate shape.
pub fn classify(container: &HasContainer, full_text: bool) -> Option<HasBucket> {
    if container.is_id() {
        return id_predicate(&container.predicate).then_some(HasBucket::Id);
    }
    if container.is_label() {
        return label_predicate(&container.predicate).then_some(HasBucket::Label);
    }
    if !translatable(&container.predicate, full_text) {
        return None;
    }
    Some(match &container.predicate {
        Predicate::Compare(..) | Predicate::Exists | Predicate::NotExists => HasBucket::Compare,
        Predicate::Within(_) | Predicate::Without(_) => HasBucket::Contains,
        Predicate::Or(parts) if parts.iter().all(|p| matches!(p, Predicate::Within(_))) => {
            HasBucket::Contains
        }
        Predicate::Between(..)
        | Predicate::Inside(..)
        | Predicate::Outside(..)
        | Predicate::And(_)
        | Predicate::Or(_) => HasBucket::Range,
        Predicate::Text(..) | Predicate::FullText { .. } => HasBucket::Text,
        Predicate::Lambda(_) => return None,
    })
}

/// Result of classifying every container of one has step.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Classified {
    pub labels: Vec<Predicate>,
    pub ids: Vec<Predicate>,
    pub properties: Vec<HasContainer>,
    pub remaining: Vec<HasContainer>,
}

impl Classified {
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.ids.is_empty() && self.properties.is_empty()
    }
}

pub fn classify_all(containers: &[HasContainer], full_text: bool) -> Classified {
    let mut out = Classified::default();
    for container in containers {
        match classify(container, full_text) {
            Some(HasBucket::Label) => out.labels.push(container.predicate.clone()),
            Some(HasBucket::Id) => out.ids.push(container.predicate.clone()),
            Some(_) => out.properties.push(container.clone()),
            None => out.remaining.push(container.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::{Compare, TextPredicate};
    use test_case::test_case;

    #[test_case(HasContainer::new("id", Predicate::eq(1)), Some(HasBucket::Id) ; "id key")]
    #[test_case(HasContainer::new("label", Predicate::eq("Person")), Some(HasBucket::Label) ; "label key")]
    #[test_case(HasContainer::new("label", Predicate::gt(3)), None ; "label key with numeric compare")]
    #[test_case(HasContainer::new("age", Predicate::gt(30)), Some(HasBucket::Compare) ; "scalar compare")]
    #[test_case(HasContainer::new("age", Predicate::NotExists), Some(HasBucket::Compare) ; "null test")]
    #[test_case(HasContainer::new("age", Predicate::within([1, 2])), Some(HasBucket::Contains) ; "within")]
    #[test_case(HasContainer::new("age", Predicate::Between(Value::Int(1), Value::Int(5))), Some(HasBucket::Range) ; "between")]
    #[test_case(HasContainer::new("name", Predicate::Text(TextPredicate::Containing, "o".into())), Some(HasBucket::Text) ; "text")]
    #[test_case(HasContainer::new("name", Predicate::Lambda("it.len() > 3".into())), None ; "lambda")]
    fn test_classify(container: HasContainer, expected: Option<HasBucket>) {
        assert_eq!(classify(&container, false), expected);
    }

    #[test]
    fn test_or_of_withins_is_contains() {
        let container = HasContainer::new(
            "age",
            Predicate::Or(vec![Predicate::within([1, 2]), Predicate::within([7])]),
        );
        assert_eq!(classify(&container, false), Some(HasBucket::Contains));

        let mixed = HasContainer::new(
            "age",
            Predicate::Or(vec![
                Predicate::within([1]),
                Predicate::Compare(Compare::Gt, Value::Int(9)),
            ]),
        );
        assert_eq!(classify(&mixed, false), Some(HasBucket::Range));
    }

    #[test]
    fn test_full_text_depends_on_dialect() {
        let container = HasContainer::new(
            "bio",
            Predicate::FullText {
                query: "graph".into(),
                configuration: None,
            },
        );
        assert_eq!(classify(&container, false), None);
        assert_eq!(classify(&container, true), Some(HasBucket::Text));
    }

    #[test]
    fn test_partial_classification_keeps_remaining() {
        let containers = vec![
            HasContainer::new("age", Predicate::gt(30)),
            HasContainer::new("name", Predicate::Lambda("x".into())),
        ];
        let classified = classify_all(&containers, false);
        assert!(!classified.is_complete());
        assert_eq!(classified.properties.len(), 1);
        assert_eq!(classified.remaining.len(), 1);
    }
}
