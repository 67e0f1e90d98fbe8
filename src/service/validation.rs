//! Per-field model validation rules.

use crate::model::{CrudMethod, ModelError, ModelRules, QueryError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    /// `email` or `uuid`; other formats are accepted unchecked.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

impl ValidationRule {
    pub fn required() -> Self {
        Self {
            required: Some(true),
            ..Self::default()
        }
    }
}

/// Model rules built from a field → rule table. Create and put payloads must satisfy every
/// rule; patch payloads only the rules of the fields they carry.
pub struct RuleValidator {
    rules: HashMap<String, ValidationRule>,
    patterns: HashMap<String, Regex>,
}

impl RuleValidator {
    pub fn new(rules: HashMap<String, ValidationRule>) -> Result<Self, ModelError> {
        let mut patterns = HashMap::new();
        for (field, rule) in &rules {
            if let Some(pattern) = &rule.pattern {
                let re = Regex::new(pattern).map_err(QueryError::from)?;
                patterns.insert(field.clone(), re);
            }
        }
        Ok(Self { rules, patterns })
    }

    /// Rules as a JSON object of field name to rule.
    pub fn from_value(rules: Value) -> Result<Self, ModelError> {
        Self::new(serde_json::from_value(rules)?)
    }

    pub fn rule(mut self, field: impl Into<String>, rule: ValidationRule) -> Result<Self, ModelError> {
        self.rules.insert(field.into(), rule);
        Self::new(self.rules)
    }

    /// All required fields must be present and non-null.
    pub fn validate_full(&self, document: &Map<String, Value>, method: CrudMethod) -> Result<(), ModelError> {
        for (field, rule) in &self.rules {
            let value = document.get(field);
            if rule.required == Some(true) && value.map_or(true, Value::is_null) {
                return Err(ModelError::invalid(method, format!("{} is required", field)));
            }
            if let Some(v) = value {
                self.validate_field(field, v, rule, method)?;
            }
        }
        Ok(())
    }

    /// Only the fields present in the document are checked.
    pub fn validate_partial(&self, document: &Map<String, Value>, method: CrudMethod) -> Result<(), ModelError> {
        for (field, v) in document {
            if let Some(rule) = self.rules.get(field) {
                self.validate_field(field, v, rule, method)?;
            }
        }
        Ok(())
    }

    fn validate_field(&self, field: &str, v: &Value, rule: &ValidationRule, method: CrudMethod) -> Result<(), ModelError> {
        if v.is_null() {
            return Ok(());
        }
        let invalid = |reason: String| Err(ModelError::invalid(method, reason));
        if let Some(format) = &rule.format {
            if !format_matches(v, format) {
                return invalid(format!("{} must be a valid {}", field, format.to_lowercase()));
            }
        }
        if let Some(s) = v.as_str() {
            let len = s.chars().count();
            if let Some(max) = rule.max_length {
                if len > max as usize {
                    return invalid(format!("{} must be at most {} characters", field, max));
                }
            }
            if let Some(min) = rule.min_length {
                if len < min as usize {
                    return invalid(format!("{} must be at least {} characters", field, min));
                }
            }
            if let Some(re) = self.patterns.get(field) {
                if !re.is_match(s) {
                    return invalid(format!("{} does not match required pattern", field));
                }
            }
        }
        if let Some(allowed) = &rule.allowed {
            if !allowed.iter().any(|a| value_eq(v, a)) {
                return invalid(format!(
                    "{} must be one of: {:?}",
                    field,
                    allowed.iter().take(5).collect::<Vec<_>>()
                ));
            }
        }
        if let Some(n) = v.as_f64() {
            if let Some(min) = rule.minimum {
                if n < min {
                    return invalid(format!("{} must be at least {}", field, min));
                }
            }
            if let Some(max) = rule.maximum {
                if n > max {
                    return invalid(format!("{} must be at most {}", field, max));
                }
            }
        }
        Ok(())
    }
}

impl<T> ModelRules<T> for RuleValidator {
    fn validate(&self, document: &Map<String, Value>, method: CrudMethod) -> Result<(), ModelError> {
        match method {
            CrudMethod::Create | CrudMethod::Put => self.validate_full(document, method),
            CrudMethod::Patch => self.validate_partial(document, method),
            _ => Ok(()),
        }
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn format_matches(v: &Value, format: &str) -> bool {
    let Some(s) = v.as_str() else {
        return true;
    };
    match format.to_lowercase().as_str() {
        "email" => s.contains('@') && s.len() >= 3,
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        _ => true,
    }
}
