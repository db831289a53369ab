//! Run configuration passed to a building block with `-c/--config` (YAML).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_yaml::Value;
use tracing::debug;

use crate::core::flags::FlagValue;
use crate::error::BbError;

/// Key/value mapping read from the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockConfig {
    values: BTreeMap<String, Value>,
}

impl BlockConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A configuration entry as a task flag value.
    pub fn flag_value(&self, key: &str) -> Result<Option<FlagValue>, BbError> {
        self.get(key)
            .map(|value| yaml_to_flag(key, value))
            .transpose()
    }
}

/// Parse configuration text. An empty document is an empty mapping.
pub fn parse_config(contents: &str, path: &Path) -> Result<BlockConfig, BbError> {
    let parse_error = |message: String| BbError::ConfigParse {
        path: path.to_path_buf(),
        message,
    };
    let document: Value =
        serde_yaml::from_str(contents).map_err(|err| parse_error(err.to_string()))?;
    let mapping = match document {
        Value::Null => return Ok(BlockConfig::default()),
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(parse_error(format!(
                "expected a mapping at the top level, found {}",
                kind_of(&other)
            )));
        }
    };
    let mut values = BTreeMap::new();
    for (key, value) in mapping {
        let key = match key {
            Value::String(key) => key,
            other => {
                return Err(parse_error(format!(
                    "configuration keys must be strings, found {}",
                    kind_of(&other)
                )));
            }
        };
        values.insert(key, value);
    }
    Ok(BlockConfig { values })
}

/// Load the configuration file if a path was given.
pub fn load_config(path: Option<&Path>) -> Result<Option<BlockConfig>, BbError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let contents = fs::read_to_string(path)
        .map_err(|err| BbError::io(format!("read {}", path.display()), err))?;
    let config = parse_config(&contents, path)?;
    debug!(path = %path.display(), keys = ?config.keys().collect::<Vec<_>>(), "loaded configuration");
    Ok(Some(config))
}

fn yaml_to_flag(key: &str, value: &Value) -> Result<FlagValue, BbError> {
    match value {
        Value::String(text) => Ok(FlagValue::scalar(text.clone())),
        Value::Number(number) => Ok(FlagValue::scalar(number.to_string())),
        Value::Bool(flag) => Ok(FlagValue::scalar(flag.to_string())),
        Value::Sequence(items) => items
            .iter()
            .map(|item| yaml_to_flag(key, item))
            .collect::<Result<Vec<_>, _>>()
            .map(FlagValue::List),
        Value::Tagged(tagged) => yaml_to_flag(key, &tagged.value),
        Value::Null | Value::Mapping(_) => Err(BbError::config(format!(
            "configuration key `{key}` must be a scalar or a list, found {}",
            kind_of(value)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
