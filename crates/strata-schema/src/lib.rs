#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strata-schema** – JSON Schema validation for annotation payloads.
//!
//! Wraps the `jsonschema` crate (draft-04 minimum, draft-07 accepted as a
//! compatible superset per spec.md §9) behind two deterministic,
//! side-effect-free entry points: does a byte string parse as a JSON
//! Schema document at all (gating `SchemaCreate`/`SchemaUpdate`), and does
//! an instance validate against a compiled schema (gating
//! `AnnotationCreate`/`AnnotationUpdate`, spec I6).

use jsonschema::JSONSchema;
use serde_json::Value;

/// Errors raised while parsing or evaluating a JSON Schema document.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The bytes did not parse as JSON at all.
    #[error("not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    /// The document parsed as JSON but is not a valid JSON Schema.
    #[error("not a valid JSON Schema document: {0}")]
    InvalidSchema(String),
    /// The instance failed validation against the schema, with the
    /// collected per-field error messages.
    #[error("instance failed schema validation: {0}")]
    InstanceInvalid(String),
}

/// Parse `bytes` as JSON and confirm it compiles as a JSON Schema
/// document. Used by `SchemaCreate`/`SchemaUpdate` validation (spec §4.2:
/// "body parses as JSON Schema").
pub fn parses_as_json_schema(bytes: &[u8]) -> Result<(), SchemaError> {
    let value: Value = serde_json::from_slice(bytes)?;
    JSONSchema::compile(&value).map_err(|e| SchemaError::InvalidSchema(e.to_string()))?;
    Ok(())
}

/// Validate `instance_bytes` (parsed as JSON) against the JSON Schema
/// document in `schema_bytes`. Used by `AnnotationCreate`/
/// `AnnotationUpdate` validation (spec §4.2, I6) — schema validity is
/// checked once, at annotation creation time; later schema evolutions do
/// not retroactively invalidate already-accepted annotations.
pub fn validate_instance(schema_bytes: &[u8], instance_bytes: &[u8]) -> Result<(), SchemaError> {
    let schema_value: Value = serde_json::from_slice(schema_bytes)?;
    let compiled =
        JSONSchema::compile(&schema_value).map_err(|e| SchemaError::InvalidSchema(e.to_string()))?;
    let instance: Value = serde_json::from_slice(instance_bytes)?;

    let result = compiled.validate(&instance);
    if let Err(errors) = result {
        let joined = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        return Err(SchemaError::InstanceInvalid(joined));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL_SCHEMA: &[u8] = br#"{
        "type": "object",
        "properties": { "label": { "type": "string" } },
        "required": ["label"]
    }"#;

    #[test]
    fn accepts_well_formed_schema() {
        assert!(parses_as_json_schema(LABEL_SCHEMA).is_ok());
    }

    #[test]
    fn rejects_non_json_bytes() {
        assert!(parses_as_json_schema(b"not json at all").is_err());
    }

    #[test]
    fn rejects_json_that_is_not_a_schema() {
        // A bare string is valid JSON but `jsonschema` rejects it as a
        // schema document (schemas must be an object or boolean).
        assert!(parses_as_json_schema(br#""just a string""#).is_err());
    }

    #[test]
    fn validates_matching_instance() {
        let instance = br#"{"label": "bird"}"#;
        assert!(validate_instance(LABEL_SCHEMA, instance).is_ok());
    }

    #[test]
    fn rejects_instance_with_wrong_type() {
        let instance = br#"{"label": 42}"#;
        assert!(validate_instance(LABEL_SCHEMA, instance).is_err());
    }

    #[test]
    fn rejects_instance_missing_required_field() {
        let instance = br#"{}"#;
        assert!(validate_instance(LABEL_SCHEMA, instance).is_err());
    }
}
