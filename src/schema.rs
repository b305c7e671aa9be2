//! Structural validation of decoded payloads.
//!
//! The signing gate validates every arbitrary payload against a
//! caller-supplied schema before a signature is produced. The schema
//! engine is a collaborator behind the [`Validator`] trait; the bundled
//! [`JsonSchema`] covers the structural subset of JSON schema keywords
//! that payload schemas in practice use. Callers with richer needs can
//! plug any other implementation of the trait.

use serde_json::Value;

/// validation seam between the signing gate and the schema engine
pub trait Validator {
    /// returns whether the decoded value conforms to the schema
    fn validate(&self, value: &Value) -> bool;
}

/// A compiled structural JSON schema.
///
/// Supported keywords: `type` (single or list), `properties`,
/// `required`, `additionalProperties` (boolean form), `items`, `enum`,
/// `const`, `minItems`/`maxItems`, `minLength`/`maxLength`,
/// `minimum`/`maximum`.
///
/// ```
/// # #[macro_use] extern crate serde_json;
/// # extern crate xhdwallet;
/// use xhdwallet::schema::{JsonSchema, Validator};
///
/// # fn main() {
/// let schema = JsonSchema::new(json!({
///     "type": "object",
///     "properties": { "name": { "type": "string" } },
///     "required": ["name"],
/// }));
/// assert!(schema.validate(&json!({ "name": "alice" })));
/// assert!(!schema.validate(&json!({ "name": 42 })));
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSchema(Value);

impl JsonSchema {
    pub fn new(schema: Value) -> Self {
        JsonSchema(schema)
    }
}

impl Validator for JsonSchema {
    fn validate(&self, value: &Value) -> bool {
        check(&self.0, value)
    }
}

fn type_matches(name: &str, value: &Value) -> bool {
    match name {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => false,
    }
}

fn check_type(expected: &Value, value: &Value) -> bool {
    match expected {
        &Value::String(ref name) => type_matches(name, value),
        &Value::Array(ref names) => names
            .iter()
            .any(|n| n.as_str().map_or(false, |n| type_matches(n, value))),
        _ => false,
    }
}

fn as_limit(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn check(schema: &Value, value: &Value) -> bool {
    let keywords = match schema {
        // boolean schemas accept or reject everything
        &Value::Bool(accept) => return accept,
        &Value::Object(ref keywords) => keywords,
        _ => return false,
    };

    if let Some(expected) = keywords.get("type") {
        if !check_type(expected, value) {
            return false;
        }
    }
    if let Some(expected) = keywords.get("const") {
        if value != expected {
            return false;
        }
    }
    if let Some(allowed) = keywords.get("enum") {
        match allowed.as_array() {
            Some(allowed) => {
                if !allowed.contains(value) {
                    return false;
                }
            }
            None => return false,
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = keywords.get("required").and_then(Value::as_array) {
            for name in required {
                match name.as_str() {
                    Some(name) => {
                        if !object.contains_key(name) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
        }
        let properties = keywords.get("properties").and_then(Value::as_object);
        if let Some(properties) = properties {
            for (name, subschema) in properties {
                if let Some(field) = object.get(name) {
                    if !check(subschema, field) {
                        return false;
                    }
                }
            }
        }
        if let Some(&Value::Bool(false)) = keywords.get("additionalProperties") {
            for name in object.keys() {
                let declared = properties.map_or(false, |p| p.contains_key(name));
                if !declared {
                    return false;
                }
            }
        }
    }

    if let Some(items) = value.as_array() {
        if let Some(min) = keywords.get("minItems").and_then(Value::as_u64) {
            if (items.len() as u64) < min {
                return false;
            }
        }
        if let Some(max) = keywords.get("maxItems").and_then(Value::as_u64) {
            if (items.len() as u64) > max {
                return false;
            }
        }
        if let Some(subschema) = keywords.get("items") {
            if !items.iter().all(|item| check(subschema, item)) {
                return false;
            }
        }
    }

    if let Some(text) = value.as_str() {
        if let Some(min) = keywords.get("minLength").and_then(Value::as_u64) {
            if (text.chars().count() as u64) < min {
                return false;
            }
        }
        if let Some(max) = keywords.get("maxLength").and_then(Value::as_u64) {
            if (text.chars().count() as u64) > max {
                return false;
            }
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = keywords.get("minimum").and_then(as_limit) {
            if number < min {
                return false;
            }
        }
        if let Some(max) = keywords.get("maximum").and_then(as_limit) {
            if number > max {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_schemas() {
        assert!(JsonSchema::new(Value::Bool(true)).validate(&json!([1, 2])));
        assert!(!JsonSchema::new(Value::Bool(false)).validate(&json!([1, 2])));
    }

    #[test]
    fn type_keyword() {
        let schema = JsonSchema::new(json!({ "type": "integer" }));
        assert!(schema.validate(&json!(7)));
        assert!(!schema.validate(&json!(7.5)));
        assert!(!schema.validate(&json!("7")));

        let multi = JsonSchema::new(json!({ "type": ["string", "null"] }));
        assert!(multi.validate(&json!("x")));
        assert!(multi.validate(&Value::Null));
        assert!(!multi.validate(&json!(1)));
    }

    #[test]
    fn object_keywords() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer", "minimum": 0 },
                "label": { "type": "string", "maxLength": 8 },
            },
            "required": ["id"],
            "additionalProperties": false,
        }));
        assert!(schema.validate(&json!({ "id": 1 })));
        assert!(schema.validate(&json!({ "id": 1, "label": "ok" })));
        assert!(!schema.validate(&json!({ "label": "missing id" })));
        assert!(!schema.validate(&json!({ "id": -3 })));
        assert!(!schema.validate(&json!({ "id": 1, "extra": true })));
    }

    #[test]
    fn byte_array_schema() {
        let schema = JsonSchema::new(json!({
            "type": "array",
            "minItems": 4,
            "maxItems": 4,
            "items": { "type": "integer", "minimum": 0, "maximum": 255 },
        }));
        assert!(schema.validate(&json!([0, 17, 200, 255])));
        assert!(!schema.validate(&json!([0, 17, 200])));
        assert!(!schema.validate(&json!([0, 17, 200, 256])));
    }

    #[test]
    fn enum_and_const() {
        let schema = JsonSchema::new(json!({ "enum": ["a", "b"] }));
        assert!(schema.validate(&json!("a")));
        assert!(!schema.validate(&json!("c")));

        let constant = JsonSchema::new(json!({ "const": 42 }));
        assert!(constant.validate(&json!(42)));
        assert!(!constant.validate(&json!(41)));
    }
}
