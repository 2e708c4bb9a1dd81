//! Instance payload validation against a type's `create_schema`.

use crate::core::error::{MediatorError, MediatorResult};
use crate::policy::model::{PolicyType, CREATE_SCHEMA_FIELD, TYPE_ID_FIELD};
use serde_json::Value;

/// Compiled validator for one policy type.
pub struct PayloadValidator {
    validator: jsonschema::Validator,
}

impl PayloadValidator {
    /// Compile a schema document.
    pub fn compile(schema: &Value) -> MediatorResult<Self> {
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            MediatorError::invalid_type(format!("{CREATE_SCHEMA_FIELD} does not compile: {e}"))
        })?;
        Ok(Self { validator })
    }

    /// Compile the validator for a stored type.
    pub fn for_type(policy_type: &PolicyType) -> MediatorResult<Self> {
        let schema = policy_type.create_schema().ok_or_else(|| {
            MediatorError::internal(format!(
                "stored policy type {} has no {CREATE_SCHEMA_FIELD}",
                policy_type.id
            ))
        })?;
        Self::compile(schema)
    }

    /// Validate a payload.
    pub fn validate(&self, payload: &Value) -> MediatorResult<()> {
        self.validator
            .validate(payload)
            .map_err(|e| MediatorError::SchemaValidation {
                message: e.to_string(),
            })
    }
}

/// Check a type body before registration.
///
/// The body must be an object with an object-valued `create_schema` that
/// compiles. If it echoes `policy_type_id`, that must equal `type_id`.
pub fn check_type_definition(type_id: i64, body: &Value) -> MediatorResult<()> {
    let obj = body
        .as_object()
        .ok_or_else(|| MediatorError::invalid_type("type body must be a JSON object"))?;

    if let Some(echoed) = obj.get(TYPE_ID_FIELD) {
        if echoed.as_i64() != Some(type_id) {
            return Err(MediatorError::invalid_type(format!(
                "{TYPE_ID_FIELD} {echoed} does not match {type_id}"
            )));
        }
    }

    let schema = obj
        .get(CREATE_SCHEMA_FIELD)
        .ok_or_else(|| MediatorError::invalid_type(format!("missing {CREATE_SCHEMA_FIELD}")))?;
    if !schema.is_object() {
        return Err(MediatorError::invalid_type(format!(
            "{CREATE_SCHEMA_FIELD} must be an object"
        )));
    }

    PayloadValidator::compile(schema).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "enforce": { "type": "boolean" },
                "window_length": { "type": "integer", "minimum": 1 }
            },
            "required": ["enforce", "window_length"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_payload() {
        let v = PayloadValidator::compile(&schema()).unwrap();
        assert!(v.validate(&json!({"enforce": true, "window_length": 10})).is_ok());
    }

    #[test]
    fn test_invalid_payload() {
        let v = PayloadValidator::compile(&schema()).unwrap();
        let err = v.validate(&json!({"not": "expected"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(err, MediatorError::SchemaValidation { .. }));

        let err = v
            .validate(&json!({"enforce": true, "window_length": 0}))
            .unwrap_err();
        assert!(matches!(err, MediatorError::SchemaValidation { .. }));
    }

    #[test]
    fn test_type_definition_checks() {
        assert!(check_type_definition(1, &json!({"create_schema": schema()})).is_ok());
        assert!(check_type_definition(
            1,
            &json!({"policy_type_id": 1, "create_schema": schema()})
        )
        .is_ok());

        for bad in [
            json!("not an object"),
            json!({"name": "no schema"}),
            json!({"create_schema": "string schema"}),
            json!({"policy_type_id": 2, "create_schema": schema()}),
            json!({"create_schema": {"type": 12}}),
        ] {
            let err = check_type_definition(1, &bad).unwrap_err();
            assert!(
                matches!(err, MediatorError::InvalidTypeDefinition { .. }),
                "expected invalid definition for {bad}"
            );
        }
    }
}
