//! Translation of the query algebra into document-store filters and update operators.

use super::error::ModelError;
use super::query::{Operator, Pop, Predicate, Query, UpdateQuery, ID_FIELD};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub fn translate_find_query<TId: Serialize>(query: &Query<TId>) -> Result<Value, ModelError> {
    Ok(match query {
        Query::All => json!({}),
        Query::ById(id) => json!({ ID_FIELD: serde_json::to_value(id)? }),
        Query::On(fields) => {
            let mut filter = Map::new();
            for (field, predicate) in fields {
                if let Some(condition) = translate_predicate(field, predicate) {
                    filter.insert(field.clone(), condition);
                }
            }
            Value::Object(filter)
        }
        Query::And(items) => json!({ "$and": translate_all(items)? }),
        Query::Or(items) => json!({ "$or": translate_all(items)? }),
    })
}

fn translate_all<TId: Serialize>(items: &[Query<TId>]) -> Result<Vec<Value>, ModelError> {
    items.iter().map(translate_find_query).collect()
}

fn translate_predicate(field: &str, predicate: &Predicate) -> Option<Value> {
    match predicate {
        Predicate::Equals(value) => Some(value.clone()),
        Predicate::Operator(op) => Some(translate_operator(op)),
        Predicate::Unrecognized(map) => {
            tracing::warn!(field = %field, keys = ?map.keys().collect::<Vec<_>>(), "ignoring predicate without a known operator");
            None
        }
    }
}

fn translate_operator(op: &Operator) -> Value {
    match op {
        Operator::IsSet(set) => json!({ "$exists": set }),
        Operator::Length(n) => json!({ "$size": n }),
        Operator::Neq(v) => json!({ "$ne": v }),
        Operator::MatchRegex(pattern) => json!({ "$regex": pattern }),
        other => json!({ other.key(): other.operand() }),
    }
}

pub fn translate_update_query(update: &UpdateQuery) -> Value {
    let mut out = Map::new();
    if !update.set.is_empty() {
        out.insert("$set".into(), Value::Object(update.set.clone()));
    }
    let unset: Map<String, Value> = update
        .unset
        .iter()
        .filter(|(_, flag)| **flag)
        .map(|(field, _)| (field.clone(), Value::String(String::new())))
        .collect();
    if !unset.is_empty() {
        out.insert("$unset".into(), Value::Object(unset));
    }
    if !update.add_to_set.is_empty() {
        out.insert("$addToSet".into(), Value::Object(update.add_to_set.clone()));
    }
    if !update.push.is_empty() {
        out.insert("$push".into(), Value::Object(update.push.clone()));
    }
    if !update.pop.is_empty() {
        let pop: Map<String, Value> = update
            .pop
            .iter()
            .map(|(field, pop)| {
                let operand = match pop {
                    Pop::Count(n) => json!(n),
                    Pop::Index { index } => json!({ "$index": index }),
                };
                (field.clone(), operand)
            })
            .collect();
        out.insert("$pop".into(), Value::Object(pop));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_operators() {
        let query: Query = serde_json::from_value(json!({"$on": {
            "age": {"$neq": 3},
            "books": {"$length": 2},
            "nick": {"$isSet": false},
            "name": {"$matchRegex": "^B"},
            "score": {"$in": [1, 2]},
            "odd": {"$whatever": 1},
            "title": "x"
        }}))
        .unwrap();
        assert_eq!(
            translate_find_query(&query).unwrap(),
            json!({
                "age": {"$ne": 3},
                "books": {"$size": 2},
                "nick": {"$exists": false},
                "name": {"$regex": "^B"},
                "score": {"$in": [1, 2]},
                "title": "x"
            })
        );
    }

    #[test]
    fn identity_maps_to_id_field() {
        let query: Query<u32> = Query::Or(vec![Query::ById(4), Query::All]);
        assert_eq!(translate_find_query(&query).unwrap(), json!({"$or": [{"_id": 4}, {}]}));
    }

    #[test]
    fn update_drops_false_unsets() {
        let mut update = UpdateQuery::new()
            .set("a", 1)
            .unset("b")
            .pop("c", Pop::Count(-1));
        update.unset.insert("keep".into(), false);
        assert_eq!(
            translate_update_query(&update),
            json!({"$set": {"a": 1}, "$unset": {"b": ""}, "$pop": {"c": -1}})
        );
        assert_eq!(translate_update_query(&UpdateQuery::new()), json!({}));
    }
}
