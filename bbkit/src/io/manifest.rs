//! Block manifest (`bb.toml`) and block directory loading.
//!
//! A block directory holds `bb.toml` and, for blocks that declare their
//! parameters, `definition.json`. Without a definition the block gets the
//! legacy `--input`/`--output` surface.
//!
//! ```toml
//! [container]
//! engine = "apptainer"
//! image = "aligner.sif"
//!
//! [binary]
//! path = "/opt/aligner/bin/align"
//! environment = ["OMP_NUM_THREADS"]
//!
//! [[tasks.default.flags]]
//! name = "reads"
//! direction = "file_in"
//! param = "reads"
//!
//! [[tasks.default.flags]]
//! name = "threads"
//! runtime = "processes"
//! default = "-t 1"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::core::arguments::{
    ArgumentSource, DEFAULT_MODE, Direction, ExistenceCheck, ModeArguments, ParameterKind,
    ParameterSpec,
};
use crate::core::command::Engine;
use crate::core::flags::FlagValue;
use crate::core::mounts::PathDirection;
use crate::error::BbError;
use crate::io::definition::{DEFINITION_FILE, load_definition};
use crate::parser::{INPUT_ARG, OUTPUT_ARG};

pub const MANIFEST_FILE: &str = "bb.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockManifest {
    pub container: ContainerSection,
    pub binary: Option<BinarySection>,
    pub mpi: Option<MpiSection>,
    #[serde(default)]
    pub constraint: ConstraintSection,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSection>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerSection {
    #[serde(default)]
    pub engine: Engine,
    /// Absolute, or relative to `BBKIT_IMAGES`.
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinarySection {
    pub path: String,
    #[serde(default)]
    pub environment: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MpiSection {
    pub runner: String,
    pub binary: String,
    #[serde(default = "one")]
    pub computing_nodes: u32,
    #[serde(default)]
    pub environment: Vec<String>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintSection {
    pub computing_units: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSection {
    #[serde(default)]
    pub flags: Vec<FlagSpec>,
}

/// One positional flag of a task, in command-line order.
///
/// The value is taken from the first source present: the parsed parameter
/// `param`, the configuration key `config`, the runtime key `runtime`
/// (`tmpdir`, `processes`, `gpus`, `memory`, `mount_points`), then `default`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagSpec {
    pub name: String,
    pub direction: Option<PathDirection>,
    pub param: Option<String>,
    pub config: Option<String>,
    pub runtime: Option<String>,
    pub default: Option<toml::Value>,
}

impl FlagSpec {
    pub fn default_value(&self) -> Result<Option<FlagValue>, BbError> {
        self.default
            .as_ref()
            .map(|value| toml_to_flag(&self.name, value))
            .transpose()
    }
}

const RUNTIME_KEYS: &[&str] = &["tmpdir", "processes", "gpus", "memory", "mount_points"];

fn toml_to_flag(name: &str, value: &toml::Value) -> Result<FlagValue, BbError> {
    match value {
        toml::Value::String(text) => Ok(FlagValue::scalar(text.clone())),
        toml::Value::Integer(number) => Ok(FlagValue::scalar(number.to_string())),
        toml::Value::Float(number) => Ok(FlagValue::scalar(number.to_string())),
        toml::Value::Boolean(flag) => Ok(FlagValue::scalar(flag.to_string())),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| toml_to_flag(name, item))
            .collect::<Result<Vec<_>, _>>()
            .map(FlagValue::List),
        toml::Value::Datetime(_) | toml::Value::Table(_) => Err(BbError::config(format!(
            "default of flag `{name}` must be a string, number, boolean or array"
        ))),
    }
}

impl BlockManifest {
    pub fn task(&self, mode: &str) -> Option<&TaskSection> {
        self.tasks.get(mode)
    }

    /// Check the manifest against the block's argument surface.
    pub fn validate(&self, source: &ArgumentSource) -> Result<(), BbError> {
        match (&self.binary, &self.mpi) {
            (Some(_), None) | (None, Some(_)) => {}
            (None, None) => {
                return Err(BbError::config(
                    "manifest must declare either [binary] or [mpi]",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(BbError::config(
                    "manifest declares both [binary] and [mpi]",
                ));
            }
        }
        if self.container.image.trim().is_empty() {
            return Err(BbError::config("container.image must not be empty"));
        }

        let legacy = legacy_parameters();
        let modes: Vec<(&str, &ModeArguments)> = match source {
            ArgumentSource::Declarative(set) => set
                .modes()
                .iter()
                .map(|(mode, args)| (mode.as_str(), args))
                .collect(),
            ArgumentSource::Legacy => vec![(DEFAULT_MODE, &legacy)],
        };
        for (mode, args) in &modes {
            let Some(task) = self.task(mode) else {
                return Err(BbError::config(format!("no task declared for mode `{mode}`")));
            };
            for flag in &task.flags {
                validate_flag(mode, flag, args)?;
            }
        }
        for mode in self.tasks.keys() {
            if !modes.iter().any(|(known, _)| known == mode) {
                return Err(BbError::config(format!(
                    "task `{mode}` does not match any parameter mode"
                )));
            }
        }
        Ok(())
    }

    /// Give flags wired to a file or folder parameter without a `direction`
    /// the one the parameter implies, so they are mounted and rewritten.
    pub fn infer_directions(&mut self, source: &ArgumentSource) {
        let legacy = legacy_parameters();
        for (mode, task) in &mut self.tasks {
            let args = match source {
                ArgumentSource::Declarative(set) => set.mode(mode),
                ArgumentSource::Legacy => Some(&legacy),
            };
            let Some(args) = args else {
                continue;
            };
            for flag in task.flags.iter_mut().filter(|flag| flag.direction.is_none()) {
                flag.direction = flag
                    .param
                    .as_deref()
                    .and_then(|param| args.get(param))
                    .and_then(implied_direction);
            }
        }
    }
}

/// Direction a path parameter implies; `None` for scalar kinds.
fn implied_direction(param: &ParameterSpec) -> Option<PathDirection> {
    match (param.kind, param.direction) {
        (ParameterKind::File, Direction::Input) => Some(PathDirection::FileIn),
        (ParameterKind::File, Direction::Output) => Some(PathDirection::FileOut),
        (ParameterKind::Directory, Direction::Input) => Some(PathDirection::DirectoryIn),
        (ParameterKind::Directory, Direction::Output) => Some(PathDirection::DirectoryOut),
        (ParameterKind::String | ParameterKind::Int | ParameterKind::Float | ParameterKind::Bool, _) => {
            None
        }
    }
}

fn validate_flag(mode: &str, flag: &FlagSpec, args: &ModeArguments) -> Result<(), BbError> {
    if flag.param.is_none()
        && flag.config.is_none()
        && flag.runtime.is_none()
        && flag.default.is_none()
    {
        return Err(BbError::config(format!(
            "flag `{}` in task `{mode}` has no value source",
            flag.name
        )));
    }
    if let Some(param) = flag.param.as_deref().filter(|param| args.get(param).is_none()) {
        return Err(BbError::config(format!(
            "flag `{}` in task `{mode}` refers to unknown parameter `{param}`",
            flag.name
        )));
    }
    if let Some(key) = flag.runtime.as_deref().filter(|key| !RUNTIME_KEYS.contains(key)) {
        return Err(BbError::config(format!(
            "flag `{}` in task `{mode}` refers to unknown runtime key `{key}`",
            flag.name
        )));
    }
    flag.default_value()?;
    Ok(())
}

/// Parameters the legacy surface always provides.
fn legacy_parameters() -> ModeArguments {
    let spec = |name: &str, direction| ParameterSpec {
        name: name.to_string(),
        kind: ParameterKind::File,
        direction,
        description: String::new(),
        existence_check: ExistenceCheck::None,
        mode: DEFAULT_MODE.to_string(),
    };
    ModeArguments {
        inputs: vec![spec(INPUT_ARG, Direction::Input)],
        outputs: vec![spec(OUTPUT_ARG, Direction::Output)],
    }
}

pub fn parse_manifest(contents: &str, path: &Path) -> Result<BlockManifest, BbError> {
    toml::from_str(contents).map_err(|err| BbError::ConfigParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// A loaded block directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub dir: PathBuf,
    pub manifest: BlockManifest,
    pub source: ArgumentSource,
}

/// Load `bb.toml` and the optional `definition.json` from `dir`.
pub fn load_block(dir: &Path) -> Result<Block, BbError> {
    if !dir.is_dir() {
        return Err(BbError::config(format!(
            "building block directory {} does not exist",
            dir.display()
        )));
    }
    let manifest_path = dir.join(MANIFEST_FILE);
    let contents = fs::read_to_string(&manifest_path)
        .map_err(|err| BbError::io(format!("read {}", manifest_path.display()), err))?;
    let mut manifest = parse_manifest(&contents, &manifest_path)?;

    let definition_path = dir.join(DEFINITION_FILE);
    let source = if definition_path.exists() {
        ArgumentSource::Declarative(load_definition(&definition_path)?)
    } else {
        ArgumentSource::Legacy
    };
    manifest.validate(&source)?;
    manifest.infer_directions(&source);

    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "building_block".to_string());
    debug!(block = %name, legacy = matches!(source, ArgumentSource::Legacy), "loaded block");
    Ok(Block {
        name,
        dir: dir.to_path_buf(),
        manifest,
        source,
    })
}
