//! Declarative parameter file (`definition.json`) loading.

use std::fs;
use std::path::Path;

use jsonschema::Draft;
use serde_json::Value;

use crate::core::arguments::{ArgumentSet, DefinitionFile};
use crate::error::BbError;

pub const DEFINITION_FILE: &str = "definition.json";

const V1_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/definition/v1.schema.json"
));

/// Validate raw definition text against the bundled schema and convert it.
pub fn parse_definition(contents: &str, path: &Path) -> Result<ArgumentSet, BbError> {
    let parse_error = |message: String| BbError::ConfigParse {
        path: path.to_path_buf(),
        message,
    };
    let instance: Value =
        serde_json::from_str(contents).map_err(|err| parse_error(err.to_string()))?;
    validate_schema(&instance).map_err(parse_error)?;
    let definition: DefinitionFile =
        serde_json::from_value(instance).map_err(|err| parse_error(err.to_string()))?;
    definition.into_argument_set()
}

pub fn load_definition(path: &Path) -> Result<ArgumentSet, BbError> {
    let contents = fs::read_to_string(path)
        .map_err(|err| BbError::io(format!("read {}", path.display()), err))?;
    parse_definition(&contents, path)
}

fn validate_schema(instance: &Value) -> Result<(), String> {
    let schema: Value =
        serde_json::from_str(V1_SCHEMA).map_err(|err| format!("parse bundled schema: {err}"))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| format!("compile bundled schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(format!(
            "schema validation failed:\n- {}",
            messages.join("\n- ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arguments::{DEFAULT_MODE, ParameterKind};

    #[test]
    fn valid_definition_is_converted() {
        let set = parse_definition(
            r#"{
                "short_description": "align",
                "use_description": "short",
                "parameters": {
                    "run": [
                        {"type": "input", "name": "reads", "format": "file", "description": "reads"},
                        {"type": "output", "name": "out", "format": "folder"}
                    ]
                }
            }"#,
            Path::new(DEFINITION_FILE),
        )
        .expect("definition");
        let mode = set.mode(DEFAULT_MODE).expect("default mode");
        assert_eq!(mode.get("out").expect("out").kind, ParameterKind::Directory);
    }

    #[test]
    fn unknown_format_is_rejected_by_schema() {
        let err = parse_definition(
            r#"{"use_description": "short",
                "parameters": {"run": [{"type": "input", "name": "x", "format": "blob"}]}}"#,
            Path::new(DEFINITION_FILE),
        )
        .expect_err("unknown format");
        match err {
            BbError::ConfigParse { message, .. } => {
                assert!(message.contains("schema validation failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = parse_definition("{", Path::new(DEFINITION_FILE)).expect_err("invalid json");
        assert!(matches!(err, BbError::ConfigParse { .. }));
    }

    #[test]
    fn reserved_parameter_name_is_a_config_error() {
        let err = parse_definition(
            r#"{"use_description": "long",
                "parameters": {"run": [{"type": "input", "name": "memory", "format": "int"}]}}"#,
            Path::new(DEFINITION_FILE),
        )
        .expect_err("reserved");
        assert!(matches!(err, BbError::Config(_)));
    }
}
