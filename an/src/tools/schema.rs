//! Argument validation against a tool's declared JSON schema
//!
//! Covers the subset of JSON Schema tool definitions actually use: `type`
//! (single or list), `required`, `properties`, `additionalProperties: false`,
//! `enum`, `items`, `minimum` and `maximum`. Unknown keywords are ignored.

use serde_json::Value;
use tracing::debug;

/// Validate `value` against `schema`, collecting every violation
///
/// Returns `Ok(())` when the value conforms, otherwise one message per
/// violation, each prefixed with the JSON path where it was found.
pub fn validate(schema: &Value, value: &Value) -> Result<(), Vec<String>> {
    debug!("validate: called");
    let mut errors = Vec::new();
    check(schema, value, "$", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        debug!(count = errors.len(), "validate: violations found");
        Err(errors)
    }
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => vec![],
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
            errors.push(format!("{}: expected {}, got {}", path, allowed.join(" or "), type_name(value)));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum")
        && !options.contains(value)
    {
        let listed: Vec<String> = options.iter().map(Value::to_string).collect();
        errors.push(format!("{}: {} is not one of [{}]", path, value, listed.join(", ")));
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
            && n < min
        {
            errors.push(format!("{}: {} is below minimum {}", path, n, min));
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
            && n > max
        {
            errors.push(format!("{}: {} is above maximum {}", path, n, max));
        }
    }

    if let Value::Object(fields) = value {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(Value::Array(required)) = schema.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    errors.push(format!("{}: missing required property '{}'", path, name));
                }
            }
        }

        for (name, field) in fields {
            let child = format!("{}.{}", path, name);
            match properties.and_then(|p| p.get(name)) {
                Some(field_schema) => check(field_schema, field, &child, errors),
                None => match schema.get("additionalProperties") {
                    Some(Value::Bool(false)) => {
                        errors.push(format!("{}: unexpected property '{}'", path, name));
                    }
                    Some(extra @ Value::Object(_)) => check(extra, field, &child, errors),
                    _ => {}
                },
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}[{}]", path, i), errors);
        }
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
