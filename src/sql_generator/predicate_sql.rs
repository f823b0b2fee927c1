use super::dialect::SqlDialect;
use super::errors::SqlGenerationError;
use super::SqlFragment;
use crate::traversal::{Compare, Predicate, Value};

/// Render `predicate` applied to the already-qualified `column`.
pub fn render_predicate(
    column: &str,
    predicate: &Predicate,
    dialect: &dyn SqlDialect,
    out: &mut SqlFragment,
) -> Result<(), SqlGenerationError> {
    match predicate {
        Predicate::Compare(Compare::Eq, Value::Null) => out.push_str(&format!("{} IS NULL", column)),
        Predicate::Compare(Compare::Neq, Value::Null) => {
            out.push_str(&format!("{} IS NOT NULL", column))
        }
        Predicate::Compare(op, value) => {
            out.push_str(&format!("{} {} ", column, op.sql_operator()));
            out.push_value(value.clone());
        }
        Predicate::Exists => out.push_str(&format!("{} IS NOT NULL", column)),
        Predicate::NotExists => out.push_str(&format!("{} IS NULL", column)),
        Predicate::Within(values) | Predicate::Without(values) => {
            let negated = matches!(predicate, Predicate::Without(_));
            if values.is_empty() {
                out.push_str(if negated { "1 = 1" } else { "1 = 0" });
                return Ok(());
            }
            out.push_str(&format!("{} {}IN (", column, if negated { "NOT " } else { "" }));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_value(value.clone());
            }
            out.push_str(")");
        }
        Predicate::Between(low, high) => range(column, ">=", low, "AND", "<", high, out),
        Predicate::Inside(low, high) => range(column, ">", low, "AND", "<", high, out),
        Predicate::Outside(low, high) => range(column, "<", low, "OR", ">", high, out),
        Predicate::And(parts) | Predicate::Or(parts) => {
            let (joiner, empty) = if matches!(predicate, Predicate::And(_)) {
                (" AND ", "1 = 1")
            } else {
                (" OR ", "1 = 0")
            };
            if parts.is_empty() {
                out.push_str(empty);
                return Ok(());
            }
            out.push_str("(");
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(joiner);
                }
                render_predicate(column, part, dialect, out)?;
            }
            out.push_str(")");
        }
        Predicate::Text(text_predicate, text) => {
            let (sql, value) = dialect.text_predicate(column, *text_predicate, text);
            out.push_sql_with_values(&sql, vec![value]);
        }
        Predicate::FullText {
            query,
            configuration,
        } => {
            let (sql, values) = dialect.full_text(column, query, configuration.as_deref())?;
            out.push_sql_with_values(&sql, values);
        }
        Predicate::Lambda(_) => {
            return Err(SqlGenerationError::untranslatable_with_context(
                predicate.to_string(),
                format!("filter on {}", column),
            ))
        }
    }
    Ok(())
}

fn range(
    column: &str,
    low_op: &str,
    low: &Value,
    joiner: &str,
    high_op: &str,
    high: &Value,
    out: &mut SqlFragment,
) {
    out.push_str(&format!("({} {} ", column, low_op));
    out.push_value(low.clone());
    out.push_str(&format!(" {} {} {} ", joiner, column, high_op));
    out.push_value(high.clone());
    out.push_str(")");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_generator::dialect::SqliteDialect;
    use crate::sql_generator::SqlParam;
    use crate::traversal::TextPredicate;

    fn render(predicate: Predicate) -> SqlFragment {
        let mut out = SqlFragment::default();
        render_predicate("c", &predicate, &SqliteDialect, &mut out).unwrap();
        out
    }

    #[test]
    fn test_compare_and_null() {
        let f = render(Predicate::gt(30));
        assert_eq!(f.sql, "c > ?");
        assert_eq!(f.params, vec![SqlParam::Value(Value::Int(30))]);
        assert_eq!(render(Predicate::eq(Value::Null)).sql, "c IS NULL");
        assert_eq!(render(Predicate::NotExists).sql, "c IS NULL");
    }

    #[test]
    fn test_membership() {
        let f = render(Predicate::within([1, 2, 3]));
        assert_eq!(f.sql, "c IN (?, ?, ?)");
        assert_eq!(f.params.len(), 3);
        assert_eq!(render(Predicate::Without(vec![])).sql, "1 = 1");
        assert_eq!(render(Predicate::Within(vec![])).sql, "1 = 0");
    }

    #[test]
    fn test_ranges_and_connectives() {
        assert_eq!(
            render(Predicate::Between(Value::Int(1), Value::Int(5))).sql,
            "(c >= ? AND c < ?)"
        );
        assert_eq!(
            render(Predicate::Outside(Value::Int(1), Value::Int(5))).sql,
            "(c < ? OR c > ?)"
        );
        let f = render(Predicate::Or(vec![
            Predicate::gt(9),
            Predicate::Text(TextPredicate::Containing, "x".into()),
        ]));
        assert_eq!(f.sql, "(c > ? OR instr(c, ?) > 0)");
        assert_eq!(
            f.params,
            vec![
                SqlParam::Value(Value::Int(9)),
                SqlParam::Value(Value::from("x"))
            ]
        );
    }

    #[test]
    fn test_lambda_is_rejected() {
        let mut out = SqlFragment::default();
        let err = render_predicate("c", &Predicate::Lambda("x".into()), &SqliteDialect, &mut out)
            .unwrap_err();
        assert!(matches!(err, SqlGenerationError::UntranslatablePredicate(_)));
    }
}
