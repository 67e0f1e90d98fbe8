//! Evaluates translated filters and update operators against in-memory JSON documents.

use super::error::ModelError;
use super::paging::{FindOptions, SortType};
use super::query::Pop;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Resolves a dotted path; numeric segments index into arrays.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn lookup_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn matches(filter: &Value, doc: &Value) -> bool {
    let Some(filter) = filter.as_object() else {
        return false;
    };
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => condition
            .as_array()
            .is_some_and(|items| items.iter().all(|f| matches(f, doc))),
        "$or" => condition
            .as_array()
            .is_some_and(|items| items.iter().any(|f| matches(f, doc))),
        field => field_matches(lookup(doc, field), condition),
    })
}

fn operator_object(condition: &Value) -> Option<&Map<String, Value>> {
    condition
        .as_object()
        .filter(|map| !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> bool {
    match operator_object(condition) {
        Some(ops) => ops
            .iter()
            .all(|(op, operand)| operator_matches(actual, op, operand)),
        None => equals(actual, condition),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Missing fields equal null; array fields equal any of their elements.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn ordering_holds(op: &str, ordering: Ordering) -> bool {
    match op {
        "$lt" => ordering == Ordering::Less,
        "$lte" => ordering != Ordering::Greater,
        "$gt" => ordering == Ordering::Greater,
        "$gte" => ordering != Ordering::Less,
        _ => false,
    }
}

fn operator_matches(actual: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$eq" => equals(actual, operand),
        "$ne" => !equals(actual, operand),
        "$lt" | "$lte" | "$gt" | "$gte" => {
            let holds = |value: &Value| compare(value, operand).is_some_and(|o| ordering_holds(op, o));
            match actual {
                Some(Value::Array(items)) => items.iter().any(holds),
                Some(value) => holds(value),
                None => false,
            }
        }
        "$in" => operand
            .as_array()
            .is_some_and(|options| options.iter().any(|o| equals(actual, o))),
        "$nin" => !operand
            .as_array()
            .is_some_and(|options| options.iter().any(|o| equals(actual, o))),
        "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
        "$size" => match (actual, operand.as_u64()) {
            (Some(Value::Array(items)), Some(n)) => items.len() as u64 == n,
            _ => false,
        },
        "$regex" => match (actual, operand.as_str()) {
            (Some(Value::String(s)), Some(pattern)) => Regex::new(pattern).is_ok_and(|re| re.is_match(s)),
            _ => false,
        },
        _ => false,
    }
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn remove_path(doc: &mut Value, path: &str) {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (lookup_mut(doc, parent), last),
        None => (Some(doc), path),
    };
    if let Some(Value::Object(map)) = parent {
        map.remove(last);
    }
}

fn array_at<'a>(doc: &'a mut Value, path: &str) -> Result<&'a mut Vec<Value>, ModelError> {
    if lookup(doc, path).map_or(true, Value::is_null) {
        set_path(doc, path, Value::Array(Vec::new()));
    }
    lookup_mut(doc, path)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ModelError::Incompatible(format!("{} is not an array", path)))
}

fn pop_at(doc: &mut Value, path: &str, operand: &Value) -> Result<(), ModelError> {
    let pop: Pop = serde_json::from_value(operand.clone())?;
    let Some(target) = lookup_mut(doc, path) else {
        return Ok(());
    };
    let items = target
        .as_array_mut()
        .ok_or_else(|| ModelError::Incompatible(format!("{} is not an array", path)))?;
    match pop {
        Pop::Count(n) if n > 0 => {
            let keep = items.len().saturating_sub(n as usize);
            items.truncate(keep);
        }
        Pop::Count(n) if n < 0 => {
            let remove = (n.unsigned_abs() as usize).min(items.len());
            items.drain(..remove);
        }
        Pop::Count(_) => {}
        Pop::Index { index } => {
            if index < items.len() {
                items.remove(index);
            }
        }
    }
    Ok(())
}

/// Applies translated update operators in place. Returns whether the document changed.
pub fn apply_update(update: &Value, doc: &mut Value) -> Result<bool, ModelError> {
    let Some(ops) = update.as_object() else {
        return Ok(false);
    };
    let before = doc.clone();
    for (op, fields) in ops {
        let Some(fields) = fields.as_object() else {
            continue;
        };
        for (path, value) in fields {
            match op.as_str() {
                "$set" => set_path(doc, path, value.clone()),
                "$unset" => remove_path(doc, path),
                "$addToSet" => {
                    let items = array_at(doc, path)?;
                    if !items.iter().any(|item| values_equal(item, value)) {
                        items.push(value.clone());
                    }
                }
                "$push" => array_at(doc, path)?.push(value.clone()),
                "$pop" => pop_at(doc, path, value)?,
                other => {
                    return Err(ModelError::Incompatible(format!("unsupported update operator {}", other)));
                }
            }
        }
    }
    Ok(*doc != before)
}

/// Document an upsert starts from: the plain equality conditions of the filter.
pub fn seed_from_filter(filter: &Value) -> Value {
    let mut seed = Value::Object(Map::new());
    collect_equalities(filter, &mut seed);
    seed
}

fn collect_equalities(filter: &Value, seed: &mut Value) {
    let Some(filter) = filter.as_object() else {
        return;
    };
    for (key, condition) in filter {
        if key == "$and" {
            for item in condition.as_array().into_iter().flatten() {
                collect_equalities(item, seed);
            }
        } else if !key.starts_with('$') && operator_object(condition).is_none() {
            set_path(seed, key, condition.clone());
        }
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

pub fn compare_documents(a: &Value, b: &Value, field: &str) -> Ordering {
    let (x, y) = (lookup(a, field), lookup(b, field));
    type_rank(x).cmp(&type_rank(y)).then_with(|| match (x, y) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
}

/// Sort (stable), skip and limit.
pub fn apply_find_options(mut docs: Vec<Value>, options: &FindOptions) -> Vec<Value> {
    if let Some((field, sort_type)) = &options.sort {
        docs.sort_by(|a, b| {
            let ordering = compare_documents(a, b, field);
            match sort_type {
                SortType::Ascending => ordering,
                SortType::Descending => ordering.reverse(),
            }
        });
    }
    let skip = options.skip.unwrap_or(0) as usize;
    let limit = options.limit.map_or(usize::MAX, |l| l as usize);
    docs.into_iter().skip(skip).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({"_id": 2, "name": "Gamma", "age": 11, "books": ["Book 1", "Book 2"], "meta": {"score": 0}})
    }

    #[test]
    fn evaluates_operators() {
        let d = doc();
        assert!(matches(&json!({}), &d));
        assert!(matches(&json!({"age": {"$gt": 10, "$lte": 11}}), &d));
        assert!(!matches(&json!({"age": {"$gt": "10"}}), &d));
        assert!(matches(&json!({"books": "Book 2"}), &d));
        assert!(matches(&json!({"books": {"$size": 2}}), &d));
        assert!(matches(&json!({"meta.score": {"$exists": true}}), &d));
        assert!(matches(&json!({"nick": {"$exists": false}}), &d));
        assert!(matches(&json!({"name": {"$regex": "^G"}}), &d));
        assert!(matches(&json!({"name": {"$nin": ["Beta"]}, "age": {"$in": [11, 12]}}), &d));
        assert!(matches(&json!({"$or": [{"age": 1}, {"name": "Gamma"}]}), &d));
        assert!(!matches(&json!({"$and": [{"age": 11}, {"name": {"$ne": "Gamma"}}]}), &d));
    }

    #[test]
    fn applies_updates() {
        let mut d = doc();
        let changed = apply_update(
            &json!({
                "$set": {"meta.score": 5, "extra.deep": true},
                "$unset": {"age": ""},
                "$push": {"books": "Book 3"},
                "$addToSet": {"tags": "x"},
                "$pop": {}
            }),
            &mut d,
        )
        .unwrap();
        assert!(changed);
        assert_eq!(
            d,
            json!({
                "_id": 2, "name": "Gamma",
                "books": ["Book 1", "Book 2", "Book 3"],
                "meta": {"score": 5}, "extra": {"deep": true}, "tags": ["x"]
            })
        );
        assert!(!apply_update(&json!({"$addToSet": {"tags": "x"}}), &mut d).unwrap());
    }

    #[test]
    fn pops_from_either_end_or_index() {
        let mut d = json!({"a": [1, 2, 3, 4]});
        apply_update(&json!({"$pop": {"a": 1}}), &mut d).unwrap();
        assert_eq!(d["a"], json!([1, 2, 3]));
        apply_update(&json!({"$pop": {"a": -1}}), &mut d).unwrap();
        assert_eq!(d["a"], json!([2, 3]));
        apply_update(&json!({"$pop": {"a": {"$index": 1}}}), &mut d).unwrap();
        assert_eq!(d["a"], json!([2]));
    }

    #[test]
    fn push_onto_scalar_fails() {
        let mut d = json!({"a": 1});
        assert!(apply_update(&json!({"$push": {"a": 2}}), &mut d).is_err());
    }

    #[test]
    fn seeds_upserts_from_equalities() {
        let seed = seed_from_filter(&json!({"$and": [{"name": "New"}, {"age": {"$gt": 3}}], "_id": 9}));
        assert_eq!(seed, json!({"name": "New", "_id": 9}));
    }

    #[test]
    fn sorts_with_missing_fields_first() {
        let docs = vec![json!({"a": 2}), json!({}), json!({"a": 1})];
        let options = FindOptions {
            sort: Some(("a".into(), SortType::Ascending)),
            ..Default::default()
        };
        assert_eq!(apply_find_options(docs, &options), vec![json!({}), json!({"a": 1}), json!({"a": 2})]);
    }
}
