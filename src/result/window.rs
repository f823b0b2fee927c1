use std::cmp::Ordering;

use super::element::PathRow;
use crate::sql_generator::ResultWindow;
use crate::traversal::{SortOrder, Value};

static NULL: Value = Value::Null;

/// Compare sort keys position by position; a missing key sorts as NULL.
pub fn compare_sort_keys(a: &[(Value, SortOrder)], b: &[(Value, SortOrder)]) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        let (left, left_order) = a.get(i).map(|(v, o)| (v, Some(*o))).unwrap_or((&NULL, None));
        let (right, right_order) = b.get(i).map(|(v, o)| (v, Some(*o))).unwrap_or((&NULL, None));
        let ordering = left.sql_cmp(right);
        let ordering = match left_order.or(right_order) {
            Some(SortOrder::Desc) => ordering.reverse(),
            _ => ordering,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable global sort followed by the range.
pub fn apply_window(mut rows: Vec<PathRow>, window: &ResultWindow) -> Vec<PathRow> {
    rows.sort_by(|a, b| compare_sort_keys(&a.sort_key, &b.sort_key));
    let Some(range) = window.range else {
        return rows;
    };
    let rows = rows.into_iter().skip(range.low);
    match range.count() {
        Some(count) => rows.take(count).collect(),
        None => rows.collect(),
    }
}
