//! Building block invocation and containerized execution.
//!
//! A building block is a directory holding a manifest (`bb.toml`) and an
//! optional parameter definition (`definition.json`). bbkit turns the
//! definition into a command-line surface, validates an invocation against
//! it, resolves the paths to bind into the container and runs the resulting
//! container command, relaying its output and exit code.
//!
//! - **[`core`]**: pure logic (argument model, flag ordering, bind ordering,
//!   command rendering). No I/O.
//! - **[`io`]**: side effects (configuration files, environment, filesystem,
//!   processes, network).
//!
//! Orchestration modules ([`invoke`], [`block`], [`execute`]) tie the two
//! together for the CLI commands.

pub mod block;
pub mod core;
pub mod error;
pub mod execute;
pub mod exit_codes;
pub mod invoke;
pub mod io;
pub mod logging;
pub mod parser;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
