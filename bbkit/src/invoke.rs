//! Building block entry point.
//!
//! Parse and validate the block's arguments, initialize logging, resolve the
//! configuration file and runtime environment, then hand control to the
//! block itself.

use anyhow::{Context, Result};
use tracing::info;

use crate::core::arguments::ArgumentSource;
use crate::error::BbError;
use crate::io::config::{BlockConfig, load_config};
use crate::io::environ::{HostEnvironment, RuntimeEnvironment};
use crate::logging::{self, LogSettings};
use crate::parser::{InvocationRequest, parse_and_validate};

/// Configuration view handed to a block together with its request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Parsed `--config` file, if one was given.
    pub config: Option<BlockConfig>,
    /// Inherited values overridden by command-line flags.
    pub runtime: RuntimeEnvironment,
    pub host: HostEnvironment,
}

/// Resolve the configuration view for a parsed request.
pub fn resolve_config(request: &InvocationRequest, host: HostEnvironment) -> Result<ResolvedConfig> {
    let config = load_config(request.config.as_deref())?;
    let inherited = host.runtime()?;
    let runtime = RuntimeEnvironment::resolve(inherited, &request.runtime)?;
    Ok(ResolvedConfig {
        config,
        runtime,
        host,
    })
}

/// Run a building block invocation.
///
/// `--help` prints the block's help and returns `Ok`. Usage, validation and
/// configuration errors stop before `block` is called.
pub fn invoke<F>(
    source: &ArgumentSource,
    program: &str,
    args: &[String],
    host: HostEnvironment,
    fallback: LogSettings,
    block: F,
) -> Result<()>
where
    F: FnOnce(&InvocationRequest, &ResolvedConfig) -> Result<()>,
{
    let request = match parse_and_validate(source, program, args) {
        Ok(request) => request,
        Err(BbError::Help(text)) => {
            print!("{text}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    logging::init(
        request.debug || fallback.debug,
        request.log_level.unwrap_or(fallback.level),
    );

    let resolved = resolve_config(&request, host)
        .with_context(|| format!("resolve configuration for {program}"))?;
    info!(
        block = program,
        mode = request.mode_or_default(),
        exported = ?resolved.runtime.exported(),
        "invoking building block"
    );
    block(&request, &resolved)
}
