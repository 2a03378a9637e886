use serde_json::{Map, Value};

/// Rewrite every scalar leaf (number, bool) as a string. Nulls, arrays and objects
/// keep their shape so the payload schema stays stable across tool versions.
pub fn stringify_leaves(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(stringify_leaves).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, stringify_leaves(v)))
                .collect(),
        ),
        other => other,
    }
}

/// The tool answers with a one-element JSON array per file. Unwrap it to the object.
///
/// Returns `Ok(None)` for an empty payload or one without an object inside.
pub fn parse_payload(text: &str) -> Result<Option<Map<String, Value>>, serde_json::Error> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)?;
    let object = match value {
        Value::Array(items) => items.into_iter().next(),
        other => Some(other),
    };

    match object.map(stringify_leaves) {
        Some(Value::Object(map)) if !map.is_empty() => Ok(Some(map)),
        _ => Ok(None),
    }
}
