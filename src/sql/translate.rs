//! Translation of the query algebra into SQL over a JSONB `doc` column.

use super::builder::QueryBuf;
use super::params::PgBindValue;
use crate::model::{ModelError, Operator, Pop, Predicate, Query, QueryError, UpdateQuery, ID_FIELD};
use serde::Serialize;
use serde_json::Value;

/// `jsonb_extract_path(doc, $1, $2)` for a dotted field path.
fn field_path(buf: &mut QueryBuf, field: &str) -> String {
    let segments: Vec<String> = field
        .split('.')
        .map(|segment| buf.push_param(PgBindValue::text(segment)))
        .collect();
    format!("jsonb_extract_path(doc, {})", segments.join(", "))
}

/// `ARRAY[$1, $2]::text[]` for a dotted field path.
fn path_array(buf: &mut QueryBuf, field: &str) -> String {
    let segments: Vec<String> = field
        .split('.')
        .map(|segment| buf.push_param(PgBindValue::text(segment)))
        .collect();
    format!("ARRAY[{}]::text[]", segments.join(", "))
}

fn is_null(path: &str) -> String {
    format!("({p} IS NULL OR {p} = 'null'::jsonb)", p = path)
}

/// Equal, or an array field containing the value.
fn equality(path: &str, value: &str) -> String {
    format!(
        "({p} = {v} OR (jsonb_typeof({p}) = 'array' AND jsonb_typeof({v}) <> 'array' AND {p} @> jsonb_build_array({v})))",
        p = path,
        v = value
    )
}

fn equals(buf: &mut QueryBuf, path: &str, value: &Value) -> String {
    if value.is_null() {
        return is_null(path);
    }
    let value = buf.json(value);
    equality(path, &value)
}

fn membership(buf: &mut QueryBuf, path: &str, values: &[Value]) -> String {
    let list = buf.json(&Value::Array(values.to_vec()));
    format!("({p} IS NOT NULL AND {l} @> jsonb_build_array({p}))", p = path, l = list)
}

fn comparison(buf: &mut QueryBuf, path: &str, sql_op: &str, value: &Value) -> String {
    let value = buf.json(value);
    format!(
        "(jsonb_typeof({p}) = jsonb_typeof({v}) AND {p} {op} {v})",
        p = path,
        v = value,
        op = sql_op
    )
}

/// Integer operands are bound as `bigint`; values outside its range are rejected.
fn int_param<N: TryInto<i64>>(key: &'static str, n: N) -> Result<PgBindValue, ModelError> {
    n.try_into().map(PgBindValue::I64).map_err(|_| {
        QueryError::InvalidOperand {
            key,
            expected: "an integer within the 64-bit range",
        }
        .into()
    })
}

fn operator_clause(buf: &mut QueryBuf, path: &str, op: &Operator) -> Result<String, ModelError> {
    let clause = match op {
        Operator::Eq(v) => equals(buf, path, v),
        Operator::Neq(v) => format!("NOT COALESCE({}, FALSE)", equals(buf, path, v)),
        Operator::Lt(v) => comparison(buf, path, "<", v),
        Operator::Lte(v) => comparison(buf, path, "<=", v),
        Operator::Gt(v) => comparison(buf, path, ">", v),
        Operator::Gte(v) => comparison(buf, path, ">=", v),
        Operator::In(values) => membership(buf, path, values),
        Operator::Nin(values) => format!("NOT COALESCE({}, FALSE)", membership(buf, path, values)),
        Operator::IsSet(true) => format!("{} IS NOT NULL", path),
        Operator::IsSet(false) => format!("{} IS NULL", path),
        Operator::MatchRegex(pattern) => {
            let pattern = buf.push_param(PgBindValue::text(pattern.as_str()));
            format!(
                "(jsonb_typeof({p}) = 'string' AND ({p} #>> '{{}}') ~ {r})",
                p = path,
                r = pattern
            )
        }
        Operator::Length(n) => {
            let n = buf.push_param(int_param("$length", *n)?);
            format!(
                "CASE WHEN jsonb_typeof({p}) = 'array' THEN jsonb_array_length({p}) = {n}::bigint ELSE FALSE END",
                p = path,
                n = n
            )
        }
    };
    Ok(clause)
}

fn predicate_clause(buf: &mut QueryBuf, field: &str, predicate: &Predicate) -> Result<Option<String>, ModelError> {
    if let Predicate::Unrecognized(map) = predicate {
        tracing::warn!(field = %field, keys = ?map.keys().collect::<Vec<_>>(), "ignoring predicate without a known operator");
        return Ok(None);
    }
    let path = field_path(buf, field);
    match predicate {
        Predicate::Equals(value) => Ok(Some(equals(buf, &path, value))),
        Predicate::Operator(op) => operator_clause(buf, &path, op).map(Some),
        Predicate::Unrecognized(_) => Ok(None),
    }
}

fn combine<TId: Serialize>(
    buf: &mut QueryBuf,
    items: &[Query<TId>],
    joiner: &str,
    empty: &str,
) -> Result<String, ModelError> {
    if items.is_empty() {
        return Ok(empty.to_string());
    }
    let parts = items
        .iter()
        .map(|item| where_clause(buf, item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", parts.join(joiner)))
}

/// Boolean SQL expression selecting the documents a query matches.
pub fn where_clause<TId: Serialize>(buf: &mut QueryBuf, query: &Query<TId>) -> Result<String, ModelError> {
    match query {
        Query::All => Ok("TRUE".into()),
        Query::ById(id) => {
            let id = buf.json(&serde_json::to_value(id)?);
            Ok(format!("doc -> '{}' = {}", ID_FIELD, id))
        }
        Query::On(fields) => {
            let mut parts = Vec::new();
            for (field, predicate) in fields {
                if let Some(part) = predicate_clause(buf, field, predicate)? {
                    parts.push(part);
                }
            }
            if parts.is_empty() {
                Ok("TRUE".into())
            } else {
                Ok(format!("({})", parts.join(" AND ")))
            }
        }
        Query::And(items) => combine(buf, items, " AND ", "TRUE"),
        Query::Or(items) => combine(buf, items, " OR ", "FALSE"),
    }
}

fn array_or_empty(path: &str) -> String {
    format!("COALESCE(doc #> {}, '[]'::jsonb)", path)
}

/// One JSONB expression over `doc` per update directive, applied in order.
pub fn update_steps(buf: &mut QueryBuf, update: &UpdateQuery) -> Result<Vec<String>, ModelError> {
    let mut steps = Vec::new();
    for (field, value) in &update.set {
        let path = path_array(buf, field);
        let value = buf.json(value);
        steps.push(format!("jsonb_set(doc, {}, {}, true)", path, value));
    }
    for (field, _) in update.unset.iter().filter(|(_, flag)| **flag) {
        let path = path_array(buf, field);
        steps.push(format!("(doc #- {})", path));
    }
    for (field, value) in &update.add_to_set {
        let path = path_array(buf, field);
        let value = buf.json(value);
        let current = array_or_empty(&path);
        steps.push(format!(
            "jsonb_set(doc, {p}, CASE WHEN {c} @> jsonb_build_array({v}) THEN {c} ELSE {c} || jsonb_build_array({v}) END, true)",
            p = path,
            c = current,
            v = value
        ));
    }
    for (field, value) in &update.push {
        let path = path_array(buf, field);
        let value = buf.json(value);
        steps.push(format!(
            "jsonb_set(doc, {p}, {c} || jsonb_build_array({v}), true)",
            p = path,
            c = array_or_empty(&path),
            v = value
        ));
    }
    for (field, pop) in &update.pop {
        let path = path_array(buf, field);
        let step = match pop {
            Pop::Count(0) => continue,
            Pop::Index { index } => {
                let index = buf.push_param(int_param("$pop", *index)?);
                format!("(doc #- ({} || {}::text))", path, index)
            }
            Pop::Count(n) => {
                let count = buf.push_param(int_param("$pop", n.unsigned_abs())?);
                let keep = if *n > 0 {
                    format!("i <= jsonb_array_length(doc #> {}) - {}::bigint", path, count)
                } else {
                    format!("i > {}::bigint", count)
                };
                format!(
                    "CASE WHEN jsonb_typeof(doc #> {p}) = 'array' THEN jsonb_set(doc, {p}, COALESCE((SELECT jsonb_agg(e ORDER BY i) FROM jsonb_array_elements(doc #> {p}) WITH ORDINALITY AS x(e, i) WHERE {k}), '[]'::jsonb)) ELSE doc END",
                    p = path,
                    k = keep
                )
            }
        };
        steps.push(step);
    }
    Ok(steps)
}
