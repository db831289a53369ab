//! Typed description of a building block's inputs and outputs.
//!
//! An [`ArgumentSet`] groups parameters by mode. A single declared mode is
//! always stored as [`DEFAULT_MODE`]; with several modes the caller must pick
//! one on the command line.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BbError;

/// Mode name used when a building block declares a single invocation shape.
pub const DEFAULT_MODE: &str = "default";

/// Flag names every building block CLI already exposes.
pub const RESERVED_NAMES: &[&str] = &[
    "config",
    "debug",
    "log_level",
    "tmpdir",
    "processes",
    "gpus",
    "memory",
    "mount_points",
    "disable_container",
    "help",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Int,
    Float,
    Bool,
    File,
    Directory,
}

impl ParameterKind {
    /// Name of the value type shown in help output.
    pub fn value_name(self) -> &'static str {
        match self {
            Self::String | Self::File | Self::Directory => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistenceCheck {
    #[default]
    None,
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub direction: Direction,
    pub description: String,
    pub existence_check: ExistenceCheck,
    pub mode: String,
}

impl ParameterSpec {
    /// Help line in the form `(INPUT - str (file)) description`.
    pub fn help_text(&self) -> String {
        let value_type = match self.existence_check {
            ExistenceCheck::None => self.kind.value_name().to_string(),
            ExistenceCheck::File => format!("{} (file)", self.kind.value_name()),
            ExistenceCheck::Folder => format!("{} (folder)", self.kind.value_name()),
        };
        format!(
            "({} - {}) {}",
            self.direction.label(),
            value_type,
            self.description
        )
    }
}

/// Parameters of one mode, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeArguments {
    pub inputs: Vec<ParameterSpec>,
    pub outputs: Vec<ParameterSpec>,
}

impl ModeArguments {
    /// Inputs first, then outputs.
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters().find(|param| param.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSet {
    description: String,
    modes: BTreeMap<String, ModeArguments>,
}

impl ArgumentSet {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            modes: BTreeMap::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn add_input(
        &mut self,
        mode: &str,
        name: &str,
        kind: ParameterKind,
        description: &str,
        existence_check: ExistenceCheck,
    ) -> Result<(), BbError> {
        self.add(mode, name, kind, Direction::Input, description, existence_check)
    }

    /// Outputs never carry an existence check: they are produced by the run.
    pub fn add_output(
        &mut self,
        mode: &str,
        name: &str,
        kind: ParameterKind,
        description: &str,
    ) -> Result<(), BbError> {
        self.add(
            mode,
            name,
            kind,
            Direction::Output,
            description,
            ExistenceCheck::None,
        )
    }

    /// Declare a mode, even one without parameters.
    pub fn add_mode(&mut self, mode: &str) {
        self.modes.entry(mode.to_string()).or_default();
    }

    fn add(
        &mut self,
        mode: &str,
        name: &str,
        kind: ParameterKind,
        direction: Direction,
        description: &str,
        existence_check: ExistenceCheck,
    ) -> Result<(), BbError> {
        if name.trim().is_empty() {
            return Err(BbError::config(format!(
                "mode `{mode}` declares a parameter with an empty name"
            )));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(BbError::config(format!(
                "parameter `{name}` clashes with a common building block flag"
            )));
        }
        let entry = self.modes.entry(mode.to_string()).or_default();
        if entry.get(name).is_some() {
            return Err(BbError::config(format!(
                "duplicate parameter `{name}` in mode `{mode}`"
            )));
        }
        let spec = ParameterSpec {
            name: name.to_string(),
            kind,
            direction,
            description: description.to_string(),
            existence_check,
            mode: mode.to_string(),
        };
        match direction {
            Direction::Input => entry.inputs.push(spec),
            Direction::Output => entry.outputs.push(spec),
        }
        Ok(())
    }

    pub fn modes(&self) -> &BTreeMap<String, ModeArguments> {
        &self.modes
    }

    pub fn mode(&self, name: &str) -> Option<&ModeArguments> {
        self.modes.get(name)
    }

    /// More than one mode means a mode selector is mandatory.
    pub fn is_multi_mode(&self) -> bool {
        self.modes.len() > 1
    }
}

impl fmt::Display for ArgumentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.description.is_empty() {
            writeln!(f, "{}", self.description)?;
        }
        for (mode, args) in &self.modes {
            writeln!(f, "Mode: {mode}")?;
            for param in args.parameters() {
                writeln!(f, "- {}: {}", param.name, param.help_text())?;
            }
        }
        Ok(())
    }
}

/// How the building block CLI is shaped, decided once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentSource {
    /// Parameters declared by the block.
    Declarative(ArgumentSet),
    /// Generic `--input` / `--output` surface.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionChoice {
    Short,
    Long,
}

/// Value format of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterFormat {
    Str,
    Int,
    Float,
    Bool,
    File,
    Folder,
}

impl ParameterFormat {
    /// `file`/`folder` carry an existence check of the same name.
    pub fn kind_and_check(self) -> (ParameterKind, ExistenceCheck) {
        match self {
            Self::Str => (ParameterKind::String, ExistenceCheck::None),
            Self::Int => (ParameterKind::Int, ExistenceCheck::None),
            Self::Float => (ParameterKind::Float, ExistenceCheck::None),
            Self::Bool => (ParameterKind::Bool, ExistenceCheck::None),
            Self::File => (ParameterKind::File, ExistenceCheck::File),
            Self::Folder => (ParameterKind::Directory, ExistenceCheck::Folder),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionParameter {
    #[serde(rename = "type")]
    pub direction: Direction,
    pub name: String,
    pub format: ParameterFormat,
    #[serde(default)]
    pub description: String,
}

/// Contents of a declarative parameter file (`definition.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionFile {
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    pub use_description: DescriptionChoice,
    pub parameters: BTreeMap<String, Vec<DefinitionParameter>>,
}

impl DefinitionFile {
    pub fn into_argument_set(self) -> Result<ArgumentSet, BbError> {
        if self.parameters.is_empty() {
            return Err(BbError::config("definition declares no parameter modes"));
        }
        let description = match self.use_description {
            DescriptionChoice::Short => self.short_description,
            DescriptionChoice::Long => self.long_description,
        };
        let mut set = ArgumentSet::new(description);
        let single_mode = self.parameters.len() == 1;
        for (mode, params) in self.parameters {
            let mode = if single_mode {
                DEFAULT_MODE.to_string()
            } else {
                mode
            };
            set.add_mode(&mode);
            for param in params {
                let (kind, check) = param.format.kind_and_check();
                match param.direction {
                    Direction::Input => {
                        set.add_input(&mode, &param.name, kind, &param.description, check)?;
                    }
                    Direction::Output => {
                        set.add_output(&mode, &param.name, kind, &param.description)?;
                    }
                }
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(raw: serde_json::Value) -> DefinitionFile {
        serde_json::from_value(raw).expect("definition")
    }

    #[test]
    fn single_mode_is_stored_as_default() {
        let set = definition(serde_json::json!({
            "short_description": "copy a file",
            "long_description": "copy a file, verbosely",
            "use_description": "short",
            "parameters": {
                "copy": [
                    {"type": "input", "name": "model", "format": "file", "description": "source"},
                    {"type": "output", "name": "result", "format": "file", "description": "target"},
                    {"type": "input", "name": "level", "format": "int", "description": "level"}
                ]
            }
        }))
        .into_argument_set()
        .expect("argument set");

        assert_eq!(set.description(), "copy a file");
        assert!(!set.is_multi_mode());
        let mode = set.mode(DEFAULT_MODE).expect("default mode");
        let names: Vec<&str> = mode.parameters().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["model", "level", "result"]);

        let model = mode.get("model").expect("model");
        assert_eq!(model.kind, ParameterKind::File);
        assert_eq!(model.existence_check, ExistenceCheck::File);
        let result = mode.get("result").expect("result");
        assert_eq!(result.existence_check, ExistenceCheck::None);
        assert_eq!(mode.get("level").expect("level").kind, ParameterKind::Int);
    }

    #[test]
    fn multiple_modes_keep_their_names() {
        let set = definition(serde_json::json!({
            "use_description": "long",
            "long_description": "two shapes",
            "parameters": {
                "fast": [{"type": "input", "name": "data", "format": "folder"}],
                "slow": [{"type": "input", "name": "data", "format": "str"}]
            }
        }))
        .into_argument_set()
        .expect("argument set");

        assert!(set.is_multi_mode());
        assert!(set.mode(DEFAULT_MODE).is_none());
        assert_eq!(
            set.mode("fast").expect("fast").inputs[0].existence_check,
            ExistenceCheck::Folder
        );
    }

    #[test]
    fn mode_without_parameters_is_kept() {
        let set = definition(serde_json::json!({
            "use_description": "short",
            "parameters": {
                "fast": [],
                "slow": [{"type": "input", "name": "seed", "format": "int"}]
            }
        }))
        .into_argument_set()
        .expect("argument set");

        assert!(set.is_multi_mode());
        let modes: Vec<&str> = set.modes().keys().map(String::as_str).collect();
        assert_eq!(modes, vec!["fast", "slow"]);
        assert_eq!(set.mode("fast").expect("fast").parameters().count(), 0);
    }

    #[test]
    fn single_empty_mode_becomes_default() {
        let set = definition(serde_json::json!({
            "use_description": "short",
            "parameters": {"run": []}
        }))
        .into_argument_set()
        .expect("argument set");

        assert!(!set.is_multi_mode());
        assert!(set.mode(DEFAULT_MODE).is_some());
    }

    #[test]
    fn names_are_unique_across_inputs_and_outputs() {
        let mut set = ArgumentSet::new("");
        set.add_input(DEFAULT_MODE, "x", ParameterKind::String, "", ExistenceCheck::None)
            .expect("first");
        let err = set
            .add_output(DEFAULT_MODE, "x", ParameterKind::String, "")
            .expect_err("duplicate");
        assert!(err.to_string().contains("duplicate parameter `x`"));
    }

    #[test]
    fn common_flag_names_are_rejected() {
        let mut set = ArgumentSet::new("");
        let err = set
            .add_input(DEFAULT_MODE, "tmpdir", ParameterKind::String, "", ExistenceCheck::None)
            .expect_err("reserved");
        assert!(matches!(err, BbError::Config(_)));
    }

    #[test]
    fn help_text_mentions_direction_and_check() {
        let mut set = ArgumentSet::new("");
        set.add_input(DEFAULT_MODE, "model", ParameterKind::File, "the model", ExistenceCheck::File)
            .expect("add");
        let param = set.mode(DEFAULT_MODE).expect("mode").get("model").expect("param");
        assert_eq!(param.help_text(), "(INPUT - str (file)) the model");
    }
}
