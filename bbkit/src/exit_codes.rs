//! Stable exit codes for bbkit CLI commands.
//!
//! A failing wrapped command is not listed here: its own exit code is
//! propagated unchanged.

/// Command succeeded (or help was printed).
pub const OK: i32 = 0;
/// Usage, validation, configuration or I/O failure before or around the
/// wrapped command.
pub const FAILURE: i32 = 1;
/// Base added to a signal number when the wrapped command was killed.
pub const SIGNAL_BASE: i32 = 128;
