//! Query-string parameters with dotted nesting, repeated keys and scalar coercion.

use serde_json::{Map, Number, Value};

pub type Params = Map<String, Value>;

/// Parses `a.b=1&tags[]=x&tags[]=y&flag=true&empty=` into nested JSON.
///
/// Numeric strings become numbers, `true`/`false` become booleans and empty values become null.
pub fn parse_params(query: &str) -> Params {
    let mut params = Params::new();
    for (key, raw) in url::form_urlencoded::parse(query.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        let (path, append) = match key.strip_suffix("[]") {
            Some(stripped) => (stripped, true),
            None => (&*key, false),
        };
        let segments: Vec<&str> = path.split('.').collect();
        insert_path(&mut params, &segments, coerce(&raw), append);
    }
    params
}

fn coerce(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if raw == "true" {
        return Value::Bool(true);
    }
    if raw == "false" {
        return Value::Bool(false);
    }
    if is_numeric(raw) {
        if let Ok(n) = raw.parse::<u64>() {
            return Value::Number(n.into());
        }
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// Digits with an optional fractional part.
fn is_numeric(raw: &str) -> bool {
    let mut parts = raw.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match parts.next() {
        Some(fraction) => digits(whole) && digits(fraction),
        None => digits(whole),
    }
}

fn insert_path(map: &mut Params, segments: &[&str], value: Value, append: bool) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        insert_value(map, head, value, append);
        return;
    }
    let child = map
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(inner) = child {
        insert_path(inner, rest, value, append);
    }
}

fn insert_value(map: &mut Params, key: &str, value: Value, append: bool) {
    match map.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
        None => {
            let value = if append { Value::Array(vec![value]) } else { value };
            map.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_scalars() {
        let params = parse_params("page=2&ratio=0.5&on=true&off=false&none=&name=ann&neg=-1");
        assert_eq!(
            Value::Object(params),
            json!({"page": 2, "ratio": 0.5, "on": true, "off": false, "none": null, "name": "ann", "neg": "-1"})
        );
    }

    #[test]
    fn nests_dotted_keys() {
        let params = parse_params("where.%24on.age.%24gt=12&where.%24on.name=Beta");
        assert_eq!(
            Value::Object(params),
            json!({"where": {"$on": {"age": {"$gt": 12}, "name": "Beta"}}})
        );
    }

    #[test]
    fn collects_repeated_keys_into_arrays() {
        let params = parse_params("tag=a&tag=b&list[]=1");
        assert_eq!(Value::Object(params), json!({"tag": ["a", "b"], "list": [1]}));
    }

    #[test]
    fn empty_query_yields_no_params() {
        assert!(parse_params("").is_empty());
    }
}
