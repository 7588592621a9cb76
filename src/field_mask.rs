//! Field masks for partial updates.
//!
//! A PATCH body only carries the fields being changed; the API also wants
//! their dotted paths in an `updateMask` query parameter.

use serde_json::Value;

/// Flattens nested objects in `body` into dotted field paths.
///
/// Arrays, scalars, `null` and empty objects are leaves. A non-object root
/// yields an empty mask.
pub fn field_mask(body: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    if let Value::Object(map) = body {
        for (key, value) in map {
            collect(key.clone(), value, &mut paths);
        }
    }
    paths
}

/// [`field_mask`] joined with commas, as sent in `updateMask`.
pub fn join_field_mask(body: &Value) -> String {
    field_mask(body).join(",")
}

fn collect(prefix: String, value: &Value, paths: &mut Vec<String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                collect(format!("{prefix}.{key}"), child, paths);
            }
        }
        _ => paths.push(prefix),
    }
}
