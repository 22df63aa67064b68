//! Filter compiler: turns query-parameter entries into predicate clauses.
//!
//! Two deliberate policies carried over from the query schema contract:
//! unknown fields are silently skipped (query schemas may carry extra keys),
//! and an explicit empty list compiles to a predicate matching zero rows,
//! which is different from "no filter at all".

use crate::orm::traits::{Entity, SqlValue};

/// A filter value as produced by a query spec.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Bool(bool),
    List(Vec<SqlValue>),
    Null,
    Value(SqlValue),
}

impl FilterValue {
    fn into_list(self) -> Vec<SqlValue> {
        match self {
            FilterValue::List(values) => values,
            FilterValue::Value(v) => vec![v],
            FilterValue::Bool(b) => vec![SqlValue::Bool(b)],
            FilterValue::Null => vec![SqlValue::Null],
        }
    }

    fn into_scalar(self) -> SqlValue {
        match self {
            FilterValue::Value(v) => v,
            FilterValue::Bool(b) => SqlValue::Bool(b),
            FilterValue::Null => SqlValue::Null,
            FilterValue::List(mut values) => values.pop().unwrap_or(SqlValue::Null),
        }
    }
}

/// Compiled predicate clauses plus the values to bind, in clause order.
#[derive(Debug, Default)]
pub struct CompiledFilters {
    pub clauses: Vec<String>,
    pub values: Vec<SqlValue>,
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn push_membership(out: &mut CompiledFilters, field: &str, values: Vec<SqlValue>, negate: bool) {
    if values.is_empty() {
        // Explicit empty list: match nothing (or everything, when negated).
        out.clauses
            .push(if negate { "1 = 1" } else { "1 = 0" }.to_string());
        return;
    }
    let op = if negate { "NOT IN" } else { "IN" };
    out.clauses
        .push(format!("{} {} ({})", field, op, placeholders(values.len())));
    out.values.extend(values);
}

/// Apply one `field__op` entry. Unknown fields and unknown operators are
/// skipped without error.
fn apply_operator_filter<E: Entity>(out: &mut CompiledFilters, key: &str, value: FilterValue) {
    let Some((field, operator)) = key.split_once("__") else {
        return;
    };
    if !E::has_column(field) {
        return;
    }
    match operator {
        "eq" => push_membership(out, field, value.into_list(), false),
        "ne" => push_membership(out, field, value.into_list(), true),
        "ic" => {
            out.clauses
                .push(format!("LOWER(CAST({} AS TEXT)) LIKE LOWER(?) ESCAPE '\\'", field));
            out.values
                .push(SqlValue::Text(format!("%{}%", escape_like(&value.into_scalar().to_string()))));
        }
        "nic" => {
            out.clauses.push(format!(
                "NOT (LOWER(CAST({} AS TEXT)) LIKE LOWER(?) ESCAPE '\\')",
                field
            ));
            out.values
                .push(SqlValue::Text(format!("%{}%", escape_like(&value.into_scalar().to_string()))));
        }
        "le" => {
            out.clauses.push(format!("{} < ?", field));
            out.values.push(value.into_scalar());
        }
        "ge" => {
            out.clauses.push(format!("{} > ?", field));
            out.values.push(value.into_scalar());
        }
        "lte" => {
            out.clauses.push(format!("{} <= ?", field));
            out.values.push(value.into_scalar());
        }
        "gte" => {
            out.clauses.push(format!("{} >= ?", field));
            out.values.push(value.into_scalar());
        }
        _ => {}
    }
}

/// Compile filter entries into predicate clauses for entity `E`.
pub fn compile_filters<E: Entity>(entries: Vec<(String, FilterValue)>) -> CompiledFilters {
    let mut out = CompiledFilters::default();
    for (key, value) in entries {
        if key.contains("__") {
            apply_operator_filter::<E>(&mut out, &key, value);
            continue;
        }
        if !E::has_column(&key) {
            continue;
        }
        match value {
            FilterValue::Bool(b) => {
                // IS is SQLite's null-safe equality.
                out.clauses.push(format!("{} IS ?", key));
                out.values.push(SqlValue::Bool(b));
            }
            FilterValue::List(values) => push_membership(&mut out, &key, values, false),
            FilterValue::Null => out.clauses.push(format!("{} IS NULL", key)),
            FilterValue::Value(v) if v.is_falsy() => {
                out.clauses.push(format!("{} IS NULL", key));
            }
            FilterValue::Value(v) => {
                out.clauses.push(format!("{} = ?", key));
                out.values.push(v);
            }
        }
    }
    out
}

/// Escape LIKE wildcards in user input so a literal `%`/`_` matches itself.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Compile a free-text search term over the entity's searchable fields.
///
/// Case-insensitive search uses a wildcard-escaped LIKE; the case-sensitive
/// variant uses `instr`, which needs no escaping. Entities with no
/// searchable fields yield `None` (search is a no-op).
pub fn compile_search<E: Entity>(term: &str, ignore_case: bool) -> Option<CompiledFilters> {
    let fields = E::search_fields();
    if fields.is_empty() {
        return None;
    }
    let mut out = CompiledFilters::default();
    let mut parts = Vec::with_capacity(fields.len());
    for field in fields {
        if ignore_case {
            parts.push(format!(
                "LOWER(CAST({} AS TEXT)) LIKE LOWER(?) ESCAPE '\\'",
                field
            ));
            out.values
                .push(SqlValue::Text(format!("%{}%", escape_like(term))));
        } else {
            parts.push(format!("instr(CAST({} AS TEXT), ?) > 0", field));
            out.values.push(SqlValue::Text(term.to_string()));
        }
    }
    out.clauses.push(format!("({})", parts.join(" OR ")));
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user::User;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unknown_field_skipped() {
        let compiled = compile_filters::<User>(vec![(
            "no_such_column".to_string(),
            FilterValue::Value(SqlValue::Int(1)),
        )]);
        assert!(compiled.clauses.is_empty());
        assert!(compiled.values.is_empty());
    }

    #[test]
    fn test_unknown_operator_skipped() {
        let compiled = compile_filters::<User>(vec![(
            "name__between".to_string(),
            FilterValue::Value(SqlValue::Int(1)),
        )]);
        assert!(compiled.clauses.is_empty());
    }

    #[test]
    fn test_equality_and_bool() {
        let compiled = compile_filters::<User>(vec![
            ("name".to_string(), FilterValue::Value("bob".into())),
            ("is_active".to_string(), FilterValue::Bool(true)),
        ]);
        assert_eq!(compiled.clauses, vec!["name = ?", "is_active IS ?"]);
        assert_eq!(compiled.values.len(), 2);
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let compiled = compile_filters::<User>(vec![("id".to_string(), FilterValue::List(vec![]))]);
        assert_eq!(compiled.clauses, vec!["1 = 0"]);
        assert!(compiled.values.is_empty());
    }

    #[test]
    fn test_list_membership() {
        let compiled = compile_filters::<User>(vec![(
            "id".to_string(),
            FilterValue::List(vec![SqlValue::Int(1), SqlValue::Int(2)]),
        )]);
        assert_eq!(compiled.clauses, vec!["id IN (?, ?)"]);
        assert_eq!(compiled.values.len(), 2);
    }

    #[test]
    fn test_falsy_value_is_null() {
        let compiled = compile_filters::<User>(vec![(
            "avatar".to_string(),
            FilterValue::Value(SqlValue::Text(String::new())),
        )]);
        assert_eq!(compiled.clauses, vec!["avatar IS NULL"]);
    }

    #[test]
    fn test_operator_suffixes() {
        let compiled = compile_filters::<User>(vec![
            ("created_at__gte".to_string(), FilterValue::Value("2024-01-01".into())),
            ("id__ne".to_string(), FilterValue::List(vec![SqlValue::Int(9)])),
            ("name__ic".to_string(), FilterValue::Value("ad".into())),
        ]);
        assert_eq!(
            compiled.clauses,
            vec![
                "created_at >= ?",
                "id NOT IN (?)",
                "LOWER(CAST(name AS TEXT)) LIKE LOWER(?) ESCAPE '\\'",
            ]
        );
        assert_eq!(compiled.values[2], SqlValue::Text("%ad%".to_string()));
    }

    #[test]
    fn test_like_escaping() {
        assert_eq!(escape_like("50%_done"), "50\\%\\_done");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_search_compiles_over_all_fields() {
        let compiled = compile_search::<User>("bob", true).unwrap();
        assert_eq!(compiled.clauses.len(), 1);
        assert!(compiled.clauses[0].contains("name"));
        assert!(compiled.clauses[0].contains("email"));
        assert!(compiled.clauses[0].contains("phone"));
        assert_eq!(compiled.values.len(), 3);
    }
}
