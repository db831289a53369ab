//! Command-line surface of a single building block.
//!
//! The surface is built at runtime from the block's [`ArgumentSource`]:
//!
//! - `Legacy`: `-i/--input` and `-o/--output`, one or more paths each.
//! - one mode: a required `--<name>` flag per declared parameter.
//! - several modes: a required mode subcommand, then that mode's flags.
//!
//! The common flags (`--config`, `--debug`, `--log_level`, resources, mount
//! points) are global and accepted before or after the mode.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::debug;

use crate::core::arguments::{
    ArgumentSet, ArgumentSource, DEFAULT_MODE, ExistenceCheck, ModeArguments, ParameterKind,
};
use crate::core::flags::FlagValue;
use crate::error::BbError;
use crate::io::environ::RuntimeEnvironment;
use crate::logging::LogLevel;

pub const INPUT_ARG: &str = "input";
pub const OUTPUT_ARG: &str = "output";

/// A parsed parameter value, typed after the parameter kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
}

impl ParamValue {
    pub fn to_flag(&self) -> FlagValue {
        match self {
            Self::Str(value) => FlagValue::scalar(value.clone()),
            Self::Int(value) => FlagValue::scalar(value.to_string()),
            Self::Float(value) => FlagValue::scalar(value.to_string()),
            Self::Bool(value) => FlagValue::scalar(value.to_string()),
            Self::List(values) => FlagValue::list(values.iter().cloned()),
        }
    }

    /// Path-like values of the parameter, one per list element.
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            Self::Str(value) => vec![PathBuf::from(value)],
            Self::List(values) => values.iter().map(PathBuf::from).collect(),
            Self::Int(_) | Self::Float(_) | Self::Bool(_) => Vec::new(),
        }
    }
}

/// Everything the caller asked for on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    /// Selected mode; `None` for legacy blocks.
    pub mode: Option<String>,
    pub values: BTreeMap<String, ParamValue>,
    pub debug: bool,
    /// `None` when `--log_level` was not given.
    pub log_level: Option<LogLevel>,
    pub config: Option<PathBuf>,
    /// Resource and mount values given as flags.
    pub runtime: RuntimeEnvironment,
    pub disable_container: bool,
}

impl InvocationRequest {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Mode used to look up the block's task definition.
    pub fn mode_or_default(&self) -> &str {
        self.mode.as_deref().unwrap_or(DEFAULT_MODE)
    }
}

fn common_args() -> Vec<Arg> {
    vec![
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .value_parser(value_parser!(PathBuf))
            .help("Configuration file (YAML)"),
        Arg::new("debug")
            .short('d')
            .long("debug")
            .action(ArgAction::SetTrue)
            .help("Enable debug output"),
        Arg::new("log_level")
            .short('l')
            .long("log_level")
            .value_parser(value_parser!(LogLevel))
            .help("Logging level"),
        Arg::new("tmpdir")
            .long("tmpdir")
            .value_name("DIR")
            .value_parser(value_parser!(PathBuf))
            .help("Temporary directory, also mounted in the container"),
        Arg::new("processes")
            .long("processes")
            .value_parser(value_parser!(u32))
            .help("Number of processes"),
        Arg::new("gpus")
            .long("gpus")
            .value_parser(value_parser!(u32))
            .help("Number of GPUs"),
        Arg::new("memory")
            .long("memory")
            .value_parser(value_parser!(u64))
            .help("Memory limit"),
        Arg::new("mount_points")
            .long("mount_points")
            .value_name("ALIAS:PATH,...")
            .help("Extra container binds"),
        Arg::new("disable_container")
            .long("disable_container")
            .action(ArgAction::SetTrue)
            .hide(true),
    ]
    .into_iter()
    .map(|arg| arg.global(true))
    .collect()
}

fn parameter_arg(name: &str, kind: ParameterKind, help: String) -> Arg {
    let arg = Arg::new(name.to_string())
        .long(name.to_string())
        .required(true)
        .help(help);
    match kind {
        ParameterKind::Int => arg.value_parser(value_parser!(i64)),
        ParameterKind::Float => arg.value_parser(value_parser!(f64)),
        ParameterKind::Bool => arg.value_parser(value_parser!(bool)),
        ParameterKind::String | ParameterKind::File | ParameterKind::Directory => {
            arg.value_parser(value_parser!(String))
        }
    }
}

fn mode_args(args: &ModeArguments) -> Vec<Arg> {
    args.parameters()
        .map(|param| parameter_arg(&param.name, param.kind, param.help_text()))
        .collect()
}

/// Build the clap command for a block.
pub fn build_command(source: &ArgumentSource, program: &str) -> Command {
    let cmd = Command::new(program.to_string()).args(common_args());
    match source {
        ArgumentSource::Legacy => cmd
            .arg(
                Arg::new(INPUT_ARG)
                    .short('i')
                    .long(INPUT_ARG)
                    .num_args(1..)
                    .action(ArgAction::Append)
                    .help("Input file(s)"),
            )
            .arg(
                Arg::new(OUTPUT_ARG)
                    .short('o')
                    .long(OUTPUT_ARG)
                    .num_args(1..)
                    .action(ArgAction::Append)
                    .help("Output file(s)"),
            ),
        ArgumentSource::Declarative(set) => declarative_command(cmd, set),
    }
}

fn declarative_command(cmd: Command, set: &ArgumentSet) -> Command {
    let cmd = cmd.about(set.description().to_string());
    if !set.is_multi_mode() {
        return match set.modes().values().next() {
            Some(args) => cmd.args(mode_args(args)),
            None => cmd,
        };
    }
    set.modes()
        .iter()
        .fold(cmd.subcommand_required(true), |cmd, (mode, args)| {
            cmd.subcommand(Command::new(mode.clone()).args(mode_args(args)))
        })
}

/// Parse `args` (without the program name) against the block's surface.
pub fn parse_invocation(
    source: &ArgumentSource,
    program: &str,
    args: &[String],
) -> Result<InvocationRequest, BbError> {
    let mut cmd = build_command(source, program);
    let argv = std::iter::once(program.to_string()).chain(args.iter().cloned());
    let matches = cmd.try_get_matches_from_mut(argv).map_err(clap_error)?;

    let (mode, values, common) = match source {
        ArgumentSource::Legacy => {
            let values = legacy_values(&matches, &mut cmd)?;
            (None, values, &matches)
        }
        ArgumentSource::Declarative(set) if set.is_multi_mode() => {
            let Some((mode, sub)) = matches.subcommand() else {
                return Err(usage(&mut cmd, "a mode is required"));
            };
            let args = set
                .mode(mode)
                .ok_or_else(|| usage(&mut cmd, &format!("unknown mode `{mode}`")))?;
            (Some(mode.to_string()), declared_values(sub, args), sub)
        }
        ArgumentSource::Declarative(set) => match set.modes().iter().next() {
            Some((mode, args)) => (Some(mode.clone()), declared_values(&matches, args), &matches),
            None => (Some(DEFAULT_MODE.to_string()), BTreeMap::new(), &matches),
        },
    };

    let request = InvocationRequest {
        mode,
        values,
        debug: common.get_flag("debug"),
        log_level: common.get_one::<LogLevel>("log_level").copied(),
        config: common.get_one::<PathBuf>("config").cloned(),
        runtime: RuntimeEnvironment {
            tmpdir: common.get_one::<PathBuf>("tmpdir").cloned(),
            processes: common.get_one::<u32>("processes").copied(),
            gpus: common.get_one::<u32>("gpus").copied(),
            memory: common.get_one::<u64>("memory").copied(),
            mount_points: common.get_one::<String>("mount_points").cloned(),
        },
        disable_container: common.get_flag("disable_container"),
    };
    debug!(mode = ?request.mode, values = ?request.values, "parsed invocation");
    Ok(request)
}

fn legacy_values(
    matches: &ArgMatches,
    cmd: &mut Command,
) -> Result<BTreeMap<String, ParamValue>, BbError> {
    let mut values = BTreeMap::new();
    for name in [INPUT_ARG, OUTPUT_ARG] {
        let Some(paths) = matches.get_many::<String>(name) else {
            return Err(usage(cmd, &format!("the following argument is required: --{name}")));
        };
        values.insert(name.to_string(), ParamValue::List(paths.cloned().collect()));
    }
    Ok(values)
}

fn declared_values(matches: &ArgMatches, args: &ModeArguments) -> BTreeMap<String, ParamValue> {
    let mut values = BTreeMap::new();
    for param in args.parameters() {
        let name = param.name.as_str();
        let value = match param.kind {
            ParameterKind::Int => matches.get_one::<i64>(name).copied().map(ParamValue::Int),
            ParameterKind::Float => matches.get_one::<f64>(name).copied().map(ParamValue::Float),
            ParameterKind::Bool => matches.get_one::<bool>(name).copied().map(ParamValue::Bool),
            ParameterKind::String | ParameterKind::File | ParameterKind::Directory => matches
                .get_one::<String>(name)
                .cloned()
                .map(ParamValue::Str),
        };
        if let Some(value) = value {
            values.insert(param.name.clone(), value);
        }
    }
    values
}

fn clap_error(err: clap::Error) -> BbError {
    let rendered = err.render().to_string();
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => BbError::Help(rendered),
        _ => BbError::Usage { message: rendered },
    }
}

fn usage(cmd: &mut Command, message: &str) -> BbError {
    BbError::Usage {
        message: format!("error: {message}\n\n{}", cmd.render_usage()),
    }
}

/// Check that every declared input file or folder exists.
///
/// All violations are collected into one [`BbError::Validation`].
pub fn validate_request(source: &ArgumentSource, request: &InvocationRequest) -> Result<(), BbError> {
    let ArgumentSource::Declarative(set) = source else {
        return Ok(());
    };
    let Some(args) = set.mode(request.mode_or_default()) else {
        return Ok(());
    };
    let mut issues = Vec::new();
    for param in &args.inputs {
        let Some(value) = request.get(&param.name) else {
            continue;
        };
        for path in value.paths() {
            if let Some(issue) = check_existence(&param.name, param.existence_check, &path) {
                issues.push(issue);
            }
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(BbError::Validation { issues })
    }
}

fn check_existence(name: &str, check: ExistenceCheck, path: &Path) -> Option<String> {
    match check {
        ExistenceCheck::None => None,
        ExistenceCheck::File if !path.is_file() => Some(format!(
            "--{name}: file {} does not exist",
            path.display()
        )),
        ExistenceCheck::Folder if !path.is_dir() => Some(format!(
            "--{name}: folder {} does not exist",
            path.display()
        )),
        ExistenceCheck::File | ExistenceCheck::Folder => None,
    }
}

/// Parse, then validate.
pub fn parse_and_validate(
    source: &ArgumentSource,
    program: &str,
    args: &[String],
) -> Result<InvocationRequest, BbError> {
    let request = parse_invocation(source, program, args)?;
    validate_request(source, &request)?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arguments::ArgumentSet;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    fn single_mode() -> ArgumentSource {
        let mut set = ArgumentSet::new("copy a file");
        set.add_input(DEFAULT_MODE, "source", ParameterKind::File, "source", ExistenceCheck::File)
            .expect("source");
        set.add_input(DEFAULT_MODE, "level", ParameterKind::Int, "level", ExistenceCheck::None)
            .expect("level");
        set.add_output(DEFAULT_MODE, "target", ParameterKind::File, "target")
            .expect("target");
        ArgumentSource::Declarative(set)
    }

    fn two_modes() -> ArgumentSource {
        let mut set = ArgumentSet::new("two shapes");
        set.add_input("fast", "seed", ParameterKind::Int, "", ExistenceCheck::None)
            .expect("seed");
        set.add_input("slow", "rounds", ParameterKind::Int, "", ExistenceCheck::None)
            .expect("rounds");
        ArgumentSource::Declarative(set)
    }

    #[test]
    fn single_mode_exposes_one_required_flag_per_parameter() {
        let cmd = build_command(&single_mode(), "copy");
        let mut required: Vec<&str> = cmd
            .get_arguments()
            .filter(|arg| arg.is_required_set())
            .filter_map(|arg| arg.get_long())
            .collect();
        required.sort_unstable();
        assert_eq!(required, vec!["level", "source", "target"]);
    }

    #[test]
    fn single_mode_values_are_typed() {
        let request = parse_invocation(
            &single_mode(),
            "copy",
            &argv(&["--source", "a.txt", "--level", "3", "--target", "b.txt", "-l", "info"]),
        )
        .expect("parse");
        assert_eq!(request.mode.as_deref(), Some(DEFAULT_MODE));
        assert_eq!(request.get("level"), Some(&ParamValue::Int(3)));
        assert_eq!(request.get("source"), Some(&ParamValue::Str("a.txt".to_string())));
        assert_eq!(request.log_level, Some(LogLevel::Info));
        assert!(!request.debug);
    }

    #[test]
    fn non_numeric_int_is_a_usage_error() {
        let err = parse_invocation(
            &single_mode(),
            "copy",
            &argv(&["--source", "a", "--level", "high", "--target", "b"]),
        )
        .expect_err("bad int");
        assert!(matches!(err, BbError::Usage { .. }));
    }

    #[test]
    fn missing_mode_is_a_usage_error() {
        let err = parse_invocation(&two_modes(), "tool", &argv(&["--debug"])).expect_err("no mode");
        assert!(matches!(err, BbError::Usage { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn common_flags_are_accepted_around_the_mode() {
        let request = parse_invocation(
            &two_modes(),
            "tool",
            &argv(&["--processes", "4", "fast", "--seed", "7", "--gpus", "1"]),
        )
        .expect("parse");
        assert_eq!(request.mode.as_deref(), Some("fast"));
        assert_eq!(request.get("seed"), Some(&ParamValue::Int(7)));
        assert_eq!(request.runtime.processes, Some(4));
        assert_eq!(request.runtime.gpus, Some(1));
    }

    #[test]
    fn flags_of_another_mode_are_rejected() {
        let err = parse_invocation(
            &two_modes(),
            "tool",
            &argv(&["fast", "--seed", "7", "--rounds", "2"]),
        )
        .expect_err("cross-mode flag");
        assert!(matches!(err, BbError::Usage { .. }));
    }

    #[test]
    fn mode_without_parameters_still_needs_selecting() {
        let mut set = ArgumentSet::new("");
        set.add_mode("fast");
        set.add_input("slow", "seed", ParameterKind::Int, "", ExistenceCheck::None)
            .expect("seed");
        let source = ArgumentSource::Declarative(set);

        let err = parse_invocation(&source, "tool", &argv(&["--seed", "3"])).expect_err("no mode");
        assert!(matches!(err, BbError::Usage { .. }));

        let request = parse_invocation(&source, "tool", &argv(&["fast"])).expect("fast");
        assert_eq!(request.mode.as_deref(), Some("fast"));
        assert!(request.values.is_empty());

        let request =
            parse_invocation(&source, "tool", &argv(&["slow", "--seed", "3"])).expect("slow");
        assert_eq!(request.get("seed"), Some(&ParamValue::Int(3)));
    }

    #[test]
    fn single_mode_reports_its_own_name() {
        let mut set = ArgumentSet::new("");
        set.add_input("only", "seed", ParameterKind::Int, "", ExistenceCheck::None)
            .expect("seed");
        let request = parse_invocation(
            &ArgumentSource::Declarative(set),
            "tool",
            &argv(&["--seed", "9"]),
        )
        .expect("parse");
        assert_eq!(request.mode.as_deref(), Some("only"));
        assert_eq!(request.get("seed"), Some(&ParamValue::Int(9)));
    }

    #[test]
    fn help_is_not_a_failure() {
        let err = parse_invocation(&single_mode(), "copy", &argv(&["--help"])).expect_err("help");
        match err {
            BbError::Help(text) => assert!(text.contains("--source")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn legacy_surface_takes_input_and_output_lists() {
        let request = parse_invocation(
            &ArgumentSource::Legacy,
            "legacy",
            &argv(&["-i", "a", "b", "-o", "c", "--disable_container"]),
        )
        .expect("parse");
        assert_eq!(request.mode, None);
        assert_eq!(
            request.get(INPUT_ARG),
            Some(&ParamValue::List(vec!["a".to_string(), "b".to_string()]))
        );
        assert_eq!(request.get(OUTPUT_ARG), Some(&ParamValue::List(vec!["c".to_string()])));
        assert!(request.disable_container);
        assert_eq!(request.mode_or_default(), DEFAULT_MODE);
    }

    #[test]
    fn legacy_surface_requires_both_lists() {
        let err = parse_invocation(&ArgumentSource::Legacy, "legacy", &argv(&["-i", "a"]))
            .expect_err("no output");
        match err {
            BbError::Usage { message } => assert!(message.contains("--output")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn all_missing_inputs_are_reported_together() {
        let mut set = ArgumentSet::new("");
        set.add_input(DEFAULT_MODE, "first", ParameterKind::File, "", ExistenceCheck::File)
            .expect("first");
        set.add_input(DEFAULT_MODE, "second", ParameterKind::File, "", ExistenceCheck::File)
            .expect("second");
        let source = ArgumentSource::Declarative(set);

        let err = parse_and_validate(
            &source,
            "pair",
            &argv(&["--first", "/nonexistent/a", "--second", "/nonexistent/b"]),
        )
        .expect_err("validation");
        match err {
            BbError::Validation { issues } => assert_eq!(issues.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn existing_folder_input_passes_validation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut set = ArgumentSet::new("");
        set.add_input(DEFAULT_MODE, "db", ParameterKind::Directory, "", ExistenceCheck::Folder)
            .expect("db");
        let source = ArgumentSource::Declarative(set);
        let dir = temp.path().to_str().expect("utf8").to_string();

        parse_and_validate(&source, "db", &[String::from("--db"), dir.clone()]).expect("valid");

        let file = temp.path().join("file.txt");
        std::fs::write(&file, "x").expect("write");
        let err = parse_and_validate(
            &source,
            "db",
            &[String::from("--db"), file.display().to_string()],
        )
        .expect_err("file is not a folder");
        assert!(matches!(err, BbError::Validation { .. }));
    }
}
