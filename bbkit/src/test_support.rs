//! Test-only helpers: a recording command runner and block fixtures.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use crate::error::BbError;
use crate::io::process::{CommandRunner, ExecutionResult};

/// One recorded call: command tokens plus the exported environment.
pub type RecordedCall = (Vec<String>, Vec<(String, String)>);

/// Runner that records command lines instead of spawning them.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    exit_code: i32,
    stdout: String,
    calls: RefCell<Vec<RecordedCall>>,
}

impl RecordingRunner {
    pub fn succeeding() -> Self {
        Self::exiting(0)
    }

    /// Every call finishes with `exit_code`.
    pub fn exiting(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &[String], env: &[(String, String)]) -> Result<ExecutionResult, BbError> {
        self.calls
            .borrow_mut()
            .push((command.to_vec(), env.to_vec()));
        Ok(ExecutionResult {
            stdout: self.stdout.clone(),
            stderr: String::new(),
            exit_code: self.exit_code,
        })
    }
}

/// Write a block directory with a manifest and, optionally, a definition.
pub fn write_block(dir: &Path, manifest: &str, definition: Option<&str>) {
    fs::create_dir_all(dir).expect("create block dir");
    fs::write(dir.join("bb.toml"), manifest).expect("write bb.toml");
    if let Some(definition) = definition {
        fs::write(dir.join("definition.json"), definition).expect("write definition.json");
    }
}

/// Manifest running `binary` outside any container image root.
pub fn binary_manifest(binary: &str, flags: &str) -> String {
    format!(
        "[container]\nimage = \"/images/block.sif\"\n\n[binary]\npath = \"{binary}\"\n\n{flags}"
    )
}
