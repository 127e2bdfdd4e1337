//! Structural validation of tool input against a declared JSON Schema.
//!
//! Supports the subset tool authors actually use: `type` (single or list),
//! `properties`, `required`, `additionalProperties` (bool or schema),
//! numeric bounds (`minimum`, `maximum`, `exclusiveMinimum`,
//! `exclusiveMaximum`), string length bounds, `enum`, and array `items` with
//! `minItems`/`maxItems`. Unknown keywords are ignored.

use serde_json::{Map, Value};
use std::fmt;

/// One schema violation, located by a JSON-pointer-like path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Validate `input` against `schema`, collecting every violation.
pub fn validate_input(input: &Value, schema: &Value) -> Result<(), Vec<SchemaViolation>> {
    let mut violations = Vec::new();
    check(input, schema, "", &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check(value: &Value, schema: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
    let schema = match schema {
        Value::Object(map) => map,
        // `true` / missing schema accepts everything, `false` nothing.
        Value::Bool(false) => {
            push(out, path, "no value is allowed here");
            return;
        }
        _ => return,
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(value, expected) {
            push(
                out,
                path,
                format!("expected {}, got {}", describe_type(expected), type_name(value)),
            );
            // Further keyword checks would only add noise.
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            push(out, path, format!("value {value} is not one of {}", Value::Array(allowed.clone())));
        }
    }

    match value {
        Value::Object(obj) => check_object(obj, schema, path, out),
        Value::Array(items) => check_array(items, schema, path, out),
        Value::String(s) => check_string(s, schema, path, out),
        Value::Number(_) => check_number(value, schema, path, out),
        _ => {}
    }
}

fn check_object(obj: &Map<String, Value>, schema: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                push(out, path, format!("missing required property '{name}'"));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let additional = schema.get("additionalProperties");

    for (key, val) in obj {
        let child_path = format!("{path}/{key}");
        match properties.and_then(|p| p.get(key)) {
            Some(prop_schema) => check(val, prop_schema, &child_path, out),
            None => match additional {
                Some(Value::Bool(false)) => {
                    push(out, path, format!("additional property '{key}' is not allowed"))
                }
                Some(extra @ Value::Object(_)) => check(val, extra, &child_path, out),
                _ => {}
            },
        }
    }
}

fn check_array(items: &[Value], schema: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min {
            push(out, path, format!("expected at least {min} items, got {}", items.len()));
        }
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if (items.len() as u64) > max {
            push(out, path, format!("expected at most {max} items, got {}", items.len()));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            check(item, item_schema, &format!("{path}/{i}"), out);
        }
    }
}

fn check_string(s: &str, schema: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
    let len = s.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if len < min {
            push(out, path, format!("string shorter than {min} characters"));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if len > max {
            push(out, path, format!("string longer than {max} characters"));
        }
    }
}

fn check_number(value: &Value, schema: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
    let Some(n) = value.as_f64() else { return };
    let bound = |key: &str| schema.get(key).and_then(Value::as_f64);

    if let Some(min) = bound("minimum") {
        if n < min {
            push(out, path, format!("{n} is less than the minimum of {min}"));
        }
    }
    if let Some(max) = bound("maximum") {
        if n > max {
            push(out, path, format!("{n} is greater than the maximum of {max}"));
        }
    }
    if let Some(min) = bound("exclusiveMinimum") {
        if n <= min {
            push(out, path, format!("{n} must be greater than {min}"));
        }
    }
    if let Some(max) = bound("exclusiveMaximum") {
        if n >= max {
            push(out, path, format!("{n} must be less than {max}"));
        }
    }
}

fn type_matches(value: &Value, expected: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(value, name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(value, name)),
        _ => true,
    }
}

fn single_type_matches(value: &Value, name: &str) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn push(out: &mut Vec<SchemaViolation>, path: &str, message: impl Into<String>) {
    out.push(SchemaViolation {
        path: path.to_string(),
        message: message.into(),
    });
}
