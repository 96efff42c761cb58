// JSON-Schema-subset -> runtime validator + static type text (spec.md §4.A).
//
// Pure and deterministic: no `$ref` resolution, no regex/format checks, no
// numeric bounds. Upstream schemas are assumed self-contained at the
// structural level this compiler cares about.

use serde_json::Value;
use std::collections::BTreeMap;

/// A compiled schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaType {
    Object {
        properties: BTreeMap<String, SchemaType>,
        required: Vec<String>,
    },
    Array(Box<SchemaType>),
    String,
    Number,
    Integer,
    Boolean,
    Null,
    Unknown,
}

/// A structured validation failure with a dotted path to the offending
/// field, mirroring Zod-style error reporting (spec.md §4.G `invoke`).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Compile a JSON Schema object (as ingested from a `listTools` response)
/// into a [`SchemaType`]. Unknown or missing `type` collapses to
/// [`SchemaType::Unknown`]; object fields absent from `required` are
/// optional but their presence is still type-checked when present.
pub fn compile(schema: &Value) -> SchemaType {
    let Some(obj) = schema.as_object() else {
        return SchemaType::Unknown;
    };

    match obj.get("type").and_then(Value::as_str) {
        Some("object") => {
            let mut properties = BTreeMap::new();
            if let Some(props) = obj.get("properties").and_then(Value::as_object) {
                for (name, sub) in props {
                    properties.insert(name.clone(), compile(sub));
                }
            }
            let required = obj
                .get("required")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            SchemaType::Object {
                properties,
                required,
            }
        }
        Some("array") => {
            let items = obj
                .get("items")
                .map(compile)
                .unwrap_or(SchemaType::Unknown);
            SchemaType::Array(Box::new(items))
        }
        Some("string") => SchemaType::String,
        Some("number") => SchemaType::Number,
        Some("integer") => SchemaType::Integer,
        Some("boolean") => SchemaType::Boolean,
        Some("null") => SchemaType::Null,
        _ => {
            // No explicit `type`: infer object/array shape from structural
            // hints the way the surface engine's generated types do, else
            // fall back to `unknown`.
            if obj.contains_key("properties") {
                compile(&Value::Object({
                    let mut m = obj.clone();
                    m.insert("type".into(), Value::String("object".into()));
                    m
                }))
            } else if obj.contains_key("items") {
                compile(&Value::Object({
                    let mut m = obj.clone();
                    m.insert("type".into(), Value::String("array".into()));
                    m
                }))
            } else {
                SchemaType::Unknown
            }
        }
    }
}

/// Validate `input` against `schema`, returning the validated value
/// unchanged on success (the compiler does no coercion) or the first
/// structural error encountered, depth-first, left-to-right.
pub fn validate(input: &Value, schema: &SchemaType) -> Result<Value, ValidationError> {
    validate_at(input, schema, "$")?;
    Ok(input.clone())
}

fn validate_at(input: &Value, schema: &SchemaType, path: &str) -> Result<(), ValidationError> {
    match schema {
        SchemaType::Unknown => Ok(()),
        SchemaType::Null => {
            if input.is_null() {
                Ok(())
            } else {
                Err(mismatch(path, "null", input))
            }
        }
        SchemaType::Boolean => {
            if input.is_boolean() {
                Ok(())
            } else {
                Err(mismatch(path, "boolean", input))
            }
        }
        SchemaType::String => {
            if input.is_string() {
                Ok(())
            } else {
                Err(mismatch(path, "string", input))
            }
        }
        SchemaType::Number => {
            if input.is_number() {
                Ok(())
            } else {
                Err(mismatch(path, "number", input))
            }
        }
        SchemaType::Integer => {
            if input.as_i64().is_some() || input.as_u64().is_some() {
                Ok(())
            } else {
                Err(mismatch(path, "integer", input))
            }
        }
        SchemaType::Array(item_schema) => {
            let Some(arr) = input.as_array() else {
                return Err(mismatch(path, "array", input));
            };
            for (i, item) in arr.iter().enumerate() {
                validate_at(item, item_schema, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        SchemaType::Object {
            properties,
            required,
        } => {
            let Some(map) = input.as_object() else {
                return Err(mismatch(path, "object", input));
            };
            for name in required {
                if !map.contains_key(name) {
                    return Err(ValidationError {
                        path: format!("{path}.{name}"),
                        message: "required field is missing".to_string(),
                    });
                }
            }
            for (name, field_schema) in properties {
                if let Some(value) = map.get(name) {
                    validate_at(value, field_schema, &format!("{path}.{name}"))?;
                }
            }
            Ok(())
        }
    }
}

fn mismatch(path: &str, expected: &str, actual: &Value) -> ValidationError {
    ValidationError {
        path: path.to_string(),
        message: format!("expected {expected}, got {}", kind_name(actual)),
    }
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a [`SchemaType`] as a TypeScript-flavored type fragment, used
/// both for the per-tool `Input` interface and for inline property types.
pub fn type_text(schema: &SchemaType) -> String {
    match schema {
        SchemaType::Unknown => "unknown".to_string(),
        SchemaType::Null => "null".to_string(),
        SchemaType::Boolean => "boolean".to_string(),
        SchemaType::String => "string".to_string(),
        SchemaType::Number => "number".to_string(),
        SchemaType::Integer => "number".to_string(),
        SchemaType::Array(items) => format!("{}[]", type_text(items)),
        SchemaType::Object {
            properties,
            required,
        } => {
            if properties.is_empty() {
                return "Record<string, unknown>".to_string();
            }
            let fields: Vec<String> = properties
                .iter()
                .map(|(name, field_schema)| {
                    let optional = if required.contains(name) { "" } else { "?" };
                    format!("{name}{optional}: {}", type_text(field_schema))
                })
                .collect();
            format!("{{ {} }}", fields.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn compiles_object_with_required() {
        let schema = json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        });
        let compiled = compile(&schema);
        assert_eq!(
            compiled,
            SchemaType::Object {
                properties: BTreeMap::from([("path".to_string(), SchemaType::String)]),
                required: vec!["path".to_string()],
            }
        );
    }

    #[test]
    fn unknown_type_collapses() {
        assert_eq!(compile(&json!({"type": "weird"})), SchemaType::Unknown);
        assert_eq!(compile(&json!(null)), SchemaType::Unknown);
    }

    #[test]
    fn validate_passes_matching_object() {
        let schema = compile(&json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        }));
        let input = json!({ "path": "/tmp" });
        assert!(validate(&input, &schema).is_ok());
    }

    #[test]
    fn validate_reports_missing_required_field() {
        let schema = compile(&json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        }));
        let err = validate(&json!({}), &schema).unwrap_err();
        assert_eq!(err.path, "$.path");
    }

    #[test]
    fn validate_reports_type_mismatch_with_dotted_path() {
        let schema = compile(&json!({
            "type": "object",
            "properties": { "count": { "type": "integer" } },
            "required": ["count"]
        }));
        let err = validate(&json!({"count": "not a number"}), &schema).unwrap_err();
        assert_eq!(err.path, "$.count");
        assert!(err.message.contains("integer"));
    }

    #[test]
    fn optional_fields_are_not_required() {
        let schema = compile(&json!({
            "type": "object",
            "properties": { "path": { "type": "string" }, "recursive": { "type": "boolean" } },
            "required": ["path"]
        }));
        assert!(validate(&json!({"path": "/tmp"}), &schema).is_ok());
    }

    #[test_case(json!({"type": "string"}), "string"; "string")]
    #[test_case(json!({"type": "array", "items": {"type": "string"}}), "string[]"; "array of strings")]
    #[test_case(json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}), "{ path: string }"; "required object field")]
    #[test_case(json!({"type": "object", "properties": {"path": {"type": "string"}}}), "{ path?: string }"; "optional object field")]
    fn type_text_renders_expected(schema: Value, expected: &str) {
        assert_eq!(type_text(&compile(&schema)), expected);
    }
}
