//! Schema Normalizer (C1): rewrites a client-supplied JSON Schema so it
//! satisfies the upstream's strict-mode constraints.

use serde_json::Value;

const DISALLOWED_FORMATS: &[&str] = &["uri"];

/// Returns a normalized clone of `schema`. The input is never mutated.
pub fn normalize(schema: &Value) -> Value {
    let mut out = schema.clone();
    normalize_in_place(&mut out);
    out
}

fn normalize_in_place(node: &mut Value) {
    match node {
        Value::Object(map) => {
            let is_object_type = map.get("type").and_then(Value::as_str) == Some("object");

            if is_object_type {
                if let Some(properties) = map.get("properties").and_then(Value::as_object).cloned() {
                    let mut required: Vec<String> = map
                        .get("required")
                        .and_then(Value::as_array)
                        .map(|values| {
                            values
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();

                    for key in properties.keys() {
                        if !required.contains(key) {
                            required.push(key.clone());
                        }
                    }

                    map.insert("required".to_string(), Value::from(required));
                }

                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }

            if let Some(format) = map.get("format").and_then(Value::as_str)
                && DISALLOWED_FORMATS.contains(&format)
            {
                map.remove("format");
            }

            for value in map.values_mut() {
                normalize_in_place(value);
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_in_place(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn adds_required_and_additional_properties() {
        let input = json!({
            "type": "object",
            "properties": {"q": {"type": "string", "format": "uri"}}
        });

        let normalized = normalize(&input);

        assert_eq!(
            normalized,
            json!({
                "type": "object",
                "properties": {"q": {"type": "string"}},
                "required": ["q"],
                "additionalProperties": false
            })
        );
    }

    #[test]
    fn does_not_mutate_input() {
        let input = json!({"type": "object", "properties": {"a": {"type": "string"}}});
        let original = input.clone();

        let _ = normalize(&input);

        assert_eq!(input, original);
    }

    #[test]
    fn is_idempotent() {
        let input = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}, "b": {"type": "number"}},
            "required": ["a"]
        });

        let once = normalize(&input);
        let twice = normalize(&once);

        assert_eq!(once, twice);
    }

    #[test]
    fn recurses_into_nested_schemas() {
        let input = json!({
            "type": "object",
            "properties": {
                "nested": {
                    "type": "object",
                    "properties": {"x": {"type": "string", "format": "uri"}}
                }
            }
        });

        let normalized = normalize(&input);
        let nested = &normalized["properties"]["nested"];

        assert_eq!(nested["additionalProperties"], json!(false));
        assert_eq!(nested["required"], json!(["x"]));
        assert!(nested["properties"]["x"].get("format").is_none());
    }

    #[test]
    fn tolerates_non_object_shapes() {
        let input = json!("not a schema at all");
        assert_eq!(normalize(&input), input);
    }
}
