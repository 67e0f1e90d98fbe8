//! Backend-neutral find and update queries.
//!
//! Wire shape of a find query:
//! `{}` matches everything, `{"$id": id}` matches by identity, `{"$on": {field: predicate}}` filters
//! fields, `{"$and": [..]}` / `{"$or": [..]}` combine sub-queries. A predicate is either a literal
//! (equality) or an object holding one operator such as `{"$gt": 3}`.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub const ID_FIELD: &str = "_id";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query must be a JSON object")]
    NotAnObject,
    #[error("{key} expects {expected}")]
    InvalidOperand { key: &'static str, expected: &'static str },
    #[error("invalid $id: {0}")]
    InvalidId(#[source] serde_json::Error),
    #[error("invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operator {
    Eq(Value),
    Neq(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    /// `true` requires the field to be present, `false` requires it to be absent.
    IsSet(bool),
    MatchRegex(String),
    /// Array field with exactly this many elements.
    Length(u64),
}

/// Operator keys after the three priority ones; the last one present in a predicate wins.
const TRAILING_KEYS: [&str; 8] = ["$eq", "$lt", "$lte", "$gt", "$gte", "$in", "$nin", "$matchRegex"];

impl Operator {
    pub fn key(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "$eq",
            Operator::Neq(_) => "$neq",
            Operator::Lt(_) => "$lt",
            Operator::Lte(_) => "$lte",
            Operator::Gt(_) => "$gt",
            Operator::Gte(_) => "$gte",
            Operator::In(_) => "$in",
            Operator::Nin(_) => "$nin",
            Operator::IsSet(_) => "$isSet",
            Operator::MatchRegex(_) => "$matchRegex",
            Operator::Length(_) => "$length",
        }
    }

    pub fn operand(&self) -> Value {
        match self {
            Operator::Eq(v)
            | Operator::Neq(v)
            | Operator::Lt(v)
            | Operator::Lte(v)
            | Operator::Gt(v)
            | Operator::Gte(v) => v.clone(),
            Operator::In(values) | Operator::Nin(values) => Value::Array(values.clone()),
            Operator::IsSet(b) => Value::Bool(*b),
            Operator::MatchRegex(pattern) => Value::String(pattern.clone()),
            Operator::Length(n) => json!(n),
        }
    }

    fn parse(key: &'static str, operand: &Value) -> Result<Operator, QueryError> {
        let invalid = |expected| QueryError::InvalidOperand { key, expected };
        let values = || operand.as_array().cloned().ok_or(invalid("an array"));
        Ok(match key {
            "$isSet" => Operator::IsSet(operand.as_bool().ok_or(invalid("a boolean"))?),
            "$length" => Operator::Length(operand.as_u64().ok_or(invalid("a non-negative integer"))?),
            "$neq" => Operator::Neq(operand.clone()),
            "$eq" => Operator::Eq(operand.clone()),
            "$lt" => Operator::Lt(operand.clone()),
            "$lte" => Operator::Lte(operand.clone()),
            "$gt" => Operator::Gt(operand.clone()),
            "$gte" => Operator::Gte(operand.clone()),
            "$in" => Operator::In(values()?),
            "$nin" => Operator::Nin(values()?),
            _ => {
                let pattern = operand.as_str().ok_or(invalid("a string"))?;
                regex::Regex::new(pattern)?;
                Operator::MatchRegex(pattern.to_string())
            }
        })
    }

    /// Picks the operator carried by a predicate object: `$isSet`, then `$length`, then `$neq`,
    /// then the last present of the remaining keys. `None` when no known key is present.
    pub fn from_map(map: &Map<String, Value>) -> Result<Option<Operator>, QueryError> {
        for key in ["$isSet", "$length", "$neq"] {
            if let Some(operand) = map.get(key) {
                return Operator::parse(key, operand).map(Some);
            }
        }
        match TRAILING_KEYS.iter().rev().find(|key| map.contains_key(**key)) {
            Some(key) => Operator::parse(*key, &map[*key]).map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Equals(Value),
    Operator(Operator),
    /// Object predicate without a recognised operator key. Backends ignore it.
    Unrecognized(Map<String, Value>),
}

impl Predicate {
    pub fn equals(value: impl Into<Value>) -> Self {
        Predicate::Equals(value.into())
    }

    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Object(map) => Ok(match Operator::from_map(map)? {
                Some(op) => Predicate::Operator(op),
                None => Predicate::Unrecognized(map.clone()),
            }),
            other => Ok(Predicate::Equals(other.clone())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Predicate::Equals(v) => v.clone(),
            Predicate::Operator(op) => json!({ op.key(): op.operand() }),
            Predicate::Unrecognized(map) => Value::Object(map.clone()),
        }
    }
}

impl From<Operator> for Predicate {
    fn from(op: Operator) -> Self {
        Predicate::Operator(op)
    }
}

pub type FieldPredicates = BTreeMap<String, Predicate>;

/// Find query over a model whose identity has type `TId`.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Query<TId = Value> {
    #[default]
    All,
    ById(TId),
    On(FieldPredicates),
    And(Vec<Query<TId>>),
    Or(Vec<Query<TId>>),
}

impl<TId> Query<TId> {
    pub fn on<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Predicate)>,
        K: Into<String>,
    {
        Query::On(fields.into_iter().map(|(k, p)| (k.into(), p)).collect())
    }

    pub fn field(name: impl Into<String>, predicate: impl Into<Predicate>) -> Self {
        Query::on([(name.into(), predicate.into())])
    }
}

impl<TId: DeserializeOwned> Query<TId> {
    /// Reads the wire shape. Precedence: `$and`, `$or`, `$on`, `$id`; anything else matches all.
    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        let map = value.as_object().ok_or(QueryError::NotAnObject)?;
        if let Some(items) = map.get("$and") {
            return Ok(Query::And(Self::list("$and", items)?));
        }
        if let Some(items) = map.get("$or") {
            return Ok(Query::Or(Self::list("$or", items)?));
        }
        if let Some(fields) = map.get("$on") {
            let fields = fields.as_object().ok_or(QueryError::InvalidOperand {
                key: "$on",
                expected: "an object",
            })?;
            let predicates = fields
                .iter()
                .map(|(k, v)| Predicate::from_value(v).map(|p| (k.clone(), p)))
                .collect::<Result<FieldPredicates, _>>()?;
            return Ok(Query::On(predicates));
        }
        if let Some(id) = map.get("$id") {
            let id = TId::deserialize(id).map_err(QueryError::InvalidId)?;
            return Ok(Query::ById(id));
        }
        Ok(Query::All)
    }

    fn list(key: &'static str, items: &Value) -> Result<Vec<Self>, QueryError> {
        items
            .as_array()
            .ok_or(QueryError::InvalidOperand { key, expected: "an array" })?
            .iter()
            .map(Self::from_value)
            .collect()
    }
}

impl<TId: Serialize> Query<TId> {
    pub fn to_value(&self) -> Value {
        match self {
            Query::All => json!({}),
            Query::ById(id) => json!({ "$id": serde_json::to_value(id).unwrap_or(Value::Null) }),
            Query::On(fields) => {
                let fields: Map<String, Value> = fields.iter().map(|(k, p)| (k.clone(), p.to_value())).collect();
                json!({ "$on": fields })
            }
            Query::And(items) => json!({ "$and": items.iter().map(Query::to_value).collect::<Vec<_>>() }),
            Query::Or(items) => json!({ "$or": items.iter().map(Query::to_value).collect::<Vec<_>>() }),
        }
    }
}

impl<TId: Serialize> Serialize for Query<TId> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de, TId: DeserializeOwned> Deserialize<'de> for Query<TId> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Query::from_value(&value).map_err(D::Error::custom)
    }
}

/// How `$pop` removes elements from an array field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pop {
    /// Positive counts remove from the end, negative counts from the front.
    Count(i64),
    Index {
        #[serde(rename = "$index")]
        index: usize,
    },
}

/// Field-level modifications applied to every document a query selects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateQuery {
    #[serde(rename = "$set", default, skip_serializing_if = "Map::is_empty")]
    pub set: Map<String, Value>,
    #[serde(rename = "$unset", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unset: BTreeMap<String, bool>,
    #[serde(rename = "$addToSet", default, skip_serializing_if = "Map::is_empty")]
    pub add_to_set: Map<String, Value>,
    #[serde(rename = "$push", default, skip_serializing_if = "Map::is_empty")]
    pub push: Map<String, Value>,
    #[serde(rename = "$pop", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pop: BTreeMap<String, Pop>,
}

impl UpdateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.insert(field.into(), true);
        self
    }

    pub fn add_to_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_to_set.insert(field.into(), value.into());
        self
    }

    pub fn push(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push.insert(field.into(), value.into());
        self
    }

    pub fn pop(mut self, field: impl Into<String>, pop: Pop) -> Self {
        self.pop.insert(field.into(), pop);
        self
    }

    /// Fields flagged `false` in `$unset` are not modifications.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && !self.unset.values().any(|flag| *flag)
            && self.add_to_set.is_empty()
            && self.push.is_empty()
            && self.pop.is_empty()
    }
}
