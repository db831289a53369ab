//! `bbkit execute`: run a building block directory or an application.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::block::run_block;
use crate::core::application::{WorkflowManager, workflow_command};
use crate::invoke::invoke;
use crate::io::environ::HostEnvironment;
use crate::io::manifest::load_block;
use crate::io::process::{CommandRunner, ExecutionResult, run_and_relay};
use crate::logging::LogSettings;

/// Load the block in `dir` and run it with `args` as its command line.
pub fn execute_block(
    dir: &Path,
    shell: bool,
    args: &[String],
    fallback: LogSettings,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let block =
        load_block(dir).with_context(|| format!("load building block {}", dir.display()))?;
    let cwd = std::env::current_dir().context("read current directory")?;
    invoke(
        &block.source,
        &block.name,
        args,
        HostEnvironment::from_process(),
        fallback,
        |request, resolved| {
            run_block(&block, request, resolved, runner, shell, &cwd)?;
            Ok(())
        },
    )
}

/// Run `application` through its workflow manager.
pub fn execute_application(
    runner: &dyn CommandRunner,
    manager: WorkflowManager,
    flags: &[String],
    application: &str,
    parameters: &[String],
) -> Result<ExecutionResult> {
    let command = workflow_command(manager, flags, application, parameters);
    info!(manager = manager.program(), application, "executing application");
    let result = run_and_relay(runner, &command, &[])
        .with_context(|| format!("run application {application}"))?;
    Ok(result)
}
