//! Task builder: accumulates a block's execution settings and flags, then
//! produces and launches one container invocation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::core::command::{Action, ContainerInvocation, Engine, Executable};
use crate::core::flags::{FlagSet, FlagValue};
use crate::core::mounts::PathDirection;
use crate::error::BbError;
use crate::io::environ::{HostEnvironment, RuntimeEnvironment};
use crate::io::mounts::{PathFlag, resolve_mounts};
use crate::io::process::{CommandRunner, ExecutionResult, run_and_relay};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Program {
    Binary(String),
    Mpi { runner: String, binary: String },
}

/// Settings gathered for one task before it is rendered.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    engine: Engine,
    image: String,
    program: Program,
    computing_nodes: u32,
    computing_units: Option<u32>,
    env_vars: Vec<String>,
    flags: FlagSet,
    directions: BTreeMap<String, PathDirection>,
    action: Action,
    run_in_container: bool,
}

/// Context a task is prepared in.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub runtime: &'a RuntimeEnvironment,
    pub host: &'a HostEnvironment,
    /// Working directory: relative paths resolve against it and the
    /// container starts in it.
    pub cwd: &'a Path,
}

impl TaskBuilder {
    fn new(engine: Engine, image: impl Into<String>, program: Program) -> Self {
        Self {
            engine,
            image: image.into(),
            program,
            computing_nodes: 1,
            computing_units: None,
            env_vars: Vec::new(),
            flags: FlagSet::new(),
            directions: BTreeMap::new(),
            action: Action::Exec,
            run_in_container: true,
        }
    }

    /// Task running a single binary.
    pub fn binary(engine: Engine, image: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(engine, image, Program::Binary(path.into()))
    }

    /// Task running `binary` under an MPI launcher.
    pub fn mpi(
        engine: Engine,
        image: impl Into<String>,
        runner: impl Into<String>,
        binary: impl Into<String>,
    ) -> Self {
        Self::new(
            engine,
            image,
            Program::Mpi {
                runner: runner.into(),
                binary: binary.into(),
            },
        )
    }

    /// Informational only: recorded in the logs, never on the command line.
    pub fn computing_nodes(mut self, nodes: u32) -> Self {
        self.computing_nodes = nodes;
        self
    }

    /// Without an explicit value MPI tasks read `BBKIT_COMPUTING_UNITS`.
    pub fn computing_units(mut self, units: u32) -> Self {
        self.computing_units = Some(units);
        self
    }

    pub fn env_var(mut self, name: impl Into<String>) -> Self {
        self.env_vars.push(name.into());
        self
    }

    /// Declare a flag with its default value.
    pub fn flag(mut self, name: &str, value: FlagValue) -> Self {
        self.flags.declare(name, value);
        self
    }

    /// Declare a flag that carries paths to mount.
    pub fn path_flag(mut self, name: &str, direction: PathDirection, value: FlagValue) -> Self {
        self.flags.declare(name, value);
        self.directions.insert(name.to_string(), direction);
        self
    }

    /// Override a flag value, keeping its declared position.
    pub fn assign(mut self, name: &str, value: FlagValue) -> Self {
        self.flags.assign(name, value);
        self
    }

    pub fn shell(mut self, shell: bool) -> Self {
        self.action = if shell { Action::Shell } else { Action::Exec };
        self
    }

    pub fn run_in_container(mut self, enabled: bool) -> Self {
        self.run_in_container = enabled;
        self
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    fn path_flags(&self) -> Vec<PathFlag> {
        self.directions
            .iter()
            .filter_map(|(name, direction)| {
                self.flags.get(name).map(|value| PathFlag {
                    name: name.clone(),
                    direction: *direction,
                    value: value.clone(),
                })
            })
            .collect()
    }

    fn image_path(&self, host: &HostEnvironment) -> Result<String, BbError> {
        if !self.run_in_container || Path::new(&self.image).is_absolute() {
            return Ok(self.image.clone());
        }
        let root: PathBuf = host.images_root()?;
        Ok(root.join(&self.image).display().to_string())
    }

    fn executable(&self, host: &HostEnvironment) -> Result<Executable, BbError> {
        Ok(match &self.program {
            Program::Binary(path) => Executable::Binary(path.clone()),
            Program::Mpi { runner, binary } => Executable::Mpi {
                runner: runner.clone(),
                computing_units: match self.computing_units {
                    Some(units) => units,
                    None => host.computing_units()?,
                },
                binary: binary.clone(),
            },
        })
    }

    /// Resolve mounts and paths and produce the invocation.
    ///
    /// Output directories named by path flags are created here.
    pub fn prepare(&self, ctx: TaskContext<'_>) -> Result<ContainerInvocation, BbError> {
        let resolution = resolve_mounts(&self.path_flags(), ctx.runtime, ctx.cwd)?;
        let mut flags = self.flags.clone();
        for (name, value) in &resolution.replacements {
            flags.assign(name, value.clone());
        }
        let invocation = ContainerInvocation {
            engine: self.engine,
            action: self.action,
            workdir: ctx.cwd.to_path_buf(),
            image: self.image_path(ctx.host)?,
            executable: self.executable(ctx.host)?,
            mounts: resolution.plan(),
            env_vars: self.env_vars.clone(),
            user_flags: flags.values(),
            run_in_container: self.run_in_container,
        };
        debug!(
            computing_nodes = self.computing_nodes,
            line = %invocation.render(),
            "task prepared"
        );
        Ok(invocation)
    }

    /// Prepare, then run the command and relay its output.
    ///
    /// The runtime environment is exported into the child only.
    #[instrument(skip_all, fields(engine = self.engine.program(), container = self.run_in_container))]
    pub fn launch(
        &self,
        runner: &dyn CommandRunner,
        ctx: TaskContext<'_>,
    ) -> Result<ExecutionResult, BbError> {
        let invocation = self.prepare(ctx)?;
        run_and_relay(runner, &invocation.tokens(), &ctx.runtime.env_pairs())
    }
}
