//! Error taxonomy for building-block invocations.
//!
//! Every variant is fatal at this layer: nothing retries. The CLI maps each
//! variant to a process exit code via [`BbError::exit_code`].

use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

#[derive(Debug, Error)]
pub enum BbError {
    /// Malformed or incomplete command line. Carries the rendered usage text.
    #[error("{message}")]
    Usage { message: String },

    /// `--help` was requested; the rendered help is not an error for the user.
    #[error("{0}")]
    Help(String),

    /// Declared input files/folders that do not exist, all of them at once.
    #[error("wrong or missing argument(s):\n- {}", issues.join("\n- "))]
    Validation { issues: Vec<String> },

    #[error("{0}")]
    Config(String),

    #[error("parse {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("input directory for `{parameter}` does not exist: {}", path.display())]
    MissingInput { parameter: String, path: PathBuf },

    /// The wrapped process finished with a non-zero exit code.
    #[error("`{program}` exited with code {code}")]
    ExternalCommand { program: String, code: i32 },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Exit code the whole process should terminate with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Help(_) => exit_codes::OK,
            Self::ExternalCommand { code, .. } => *code,
            Self::Usage { .. }
            | Self::Validation { .. }
            | Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::MissingInput { .. }
            | Self::Io { .. } => exit_codes::FAILURE,
        }
    }
}

/// Find the first [`BbError`] in an `anyhow` error chain.
pub fn find_bb_error(err: &anyhow::Error) -> Option<&BbError> {
    err.chain().find_map(|cause| cause.downcast_ref::<BbError>())
}
