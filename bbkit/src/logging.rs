//! Level-selection wrapper around `tracing-subscriber`.
//!
//! Output goes to stderr in compact format so that the relayed stdout of the
//! wrapped command stays clean.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log levels accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
    Critical,
}

impl LogLevel {
    /// Directive understood by [`EnvFilter`]. `critical` has no tracing
    /// counterpart and maps to `error`.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

/// Logging flags given on the top-level command line.
///
/// A building block entry point falls back to these when its own flags do
/// not ask for anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub debug: bool,
    pub level: LogLevel,
}

/// Pick the filter directive: `debug` forces debug output, otherwise
/// `RUST_LOG` wins over the requested level.
pub fn filter_directive(debug: bool, level: LogLevel, rust_log: Option<&str>) -> String {
    if debug {
        return "debug".to_string();
    }
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive.to_string(),
        _ => level.as_directive().to_string(),
    }
}

/// Initialize the global subscriber.
///
/// The top-level CLI and a building block entry point may both ask for
/// logging; only the first call installs a subscriber.
pub fn init(debug: bool, level: LogLevel) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(debug, level, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("error"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
