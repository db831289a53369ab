//! Running a manifest-described building block.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::flags::FlagValue;
use crate::error::BbError;
use crate::invoke::ResolvedConfig;
use crate::io::manifest::{Block, FlagSpec};
use crate::io::process::{CommandRunner, ExecutionResult};
use crate::parser::InvocationRequest;
use crate::task::{TaskBuilder, TaskContext};

/// Value of a task flag, taken from the first source that has one.
fn flag_value(
    flag: &FlagSpec,
    request: &InvocationRequest,
    resolved: &ResolvedConfig,
) -> Result<FlagValue, BbError> {
    if let Some(value) = flag.param.as_deref().and_then(|param| request.get(param)) {
        return Ok(value.to_flag());
    }
    if let Some(key) = flag.config.as_deref() {
        let from_config = match &resolved.config {
            Some(config) => config.flag_value(key)?,
            None => None,
        };
        if let Some(value) = from_config {
            return Ok(value);
        }
    }
    if let Some(value) = flag.runtime.as_deref().and_then(|key| resolved.runtime.get(key)) {
        return Ok(FlagValue::Scalar(value));
    }
    flag.default_value()?.ok_or_else(|| {
        BbError::config(format!(
            "no value for flag `{}`: not given on the command line, in the configuration or as a default",
            flag.name
        ))
    })
}

/// Build the task for the selected mode of `block`.
pub fn build_task(
    block: &Block,
    request: &InvocationRequest,
    resolved: &ResolvedConfig,
    shell: bool,
) -> Result<TaskBuilder, BbError> {
    let manifest = &block.manifest;
    let container = &manifest.container;
    let mut task = match (&manifest.binary, &manifest.mpi) {
        (Some(binary), _) => binary.environment.iter().fold(
            TaskBuilder::binary(container.engine, container.image.clone(), binary.path.clone()),
            |task, var| task.env_var(var.clone()),
        ),
        (None, Some(mpi)) => mpi.environment.iter().fold(
            TaskBuilder::mpi(
                container.engine,
                container.image.clone(),
                mpi.runner.clone(),
                mpi.binary.clone(),
            )
            .computing_nodes(mpi.computing_nodes),
            |task, var| task.env_var(var.clone()),
        ),
        (None, None) => {
            return Err(BbError::config(
                "manifest must declare either [binary] or [mpi]",
            ));
        }
    };
    if let Some(units) = manifest.constraint.computing_units {
        task = task.computing_units(units);
    }

    let mode = request.mode_or_default();
    let section = manifest
        .task(mode)
        .ok_or_else(|| BbError::config(format!("no task declared for mode `{mode}`")))?;
    for flag in &section.flags {
        let value = flag_value(flag, request, resolved)?;
        task = match flag.direction {
            Some(direction) => task.path_flag(&flag.name, direction, value),
            None => task.flag(&flag.name, value),
        };
    }
    debug!(block = %block.name, mode, flags = ?task.flags().names().collect::<Vec<_>>(), "task built");
    Ok(task.shell(shell).run_in_container(!request.disable_container))
}

/// Build and launch the block's task in `cwd`.
pub fn run_block(
    block: &Block,
    request: &InvocationRequest,
    resolved: &ResolvedConfig,
    runner: &dyn CommandRunner,
    shell: bool,
    cwd: &Path,
) -> Result<ExecutionResult> {
    let task = build_task(block, request, resolved, shell)
        .with_context(|| format!("build task for {}", block.name))?;
    let ctx = TaskContext {
        runtime: &resolved.runtime,
        host: &resolved.host,
        cwd,
    };
    let result = task
        .launch(runner, ctx)
        .with_context(|| format!("run building block {}", block.name))?;
    Ok(result)
}
