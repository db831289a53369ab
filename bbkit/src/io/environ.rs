//! Runtime environment shared between a block invocation and its child process.
//!
//! Process-wide configuration with a lifecycle of one invocation: the
//! [`RuntimeEnvironment`] is resolved once at the start of each invocation from
//! the inherited variables and the command-line flags, then threaded through
//! the components that need it. It only reaches a real environment table when
//! it is exported into the spawned child.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::BbError;

pub const TMPDIR_VAR: &str = "BBKIT_TMPDIR";
pub const PROCESSES_VAR: &str = "BBKIT_PROCESSES";
pub const GPUS_VAR: &str = "BBKIT_GPUS";
pub const MEMORY_VAR: &str = "BBKIT_MEMORY";
pub const MOUNT_POINTS_VAR: &str = "BBKIT_MOUNT_POINTS";
/// Root directory holding container images. Required to run in a container.
pub const IMAGES_VAR: &str = "BBKIT_IMAGES";
/// Default computing units for MPI blocks that do not declare a constraint.
pub const COMPUTING_UNITS_VAR: &str = "BBKIT_COMPUTING_UNITS";

/// Snapshot of the variables inherited from the parent process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    vars: BTreeMap<String, String>,
}

impl HostEnvironment {
    pub fn from_process() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    /// Entries whose name or value is not valid UTF-8 are skipped.
    pub fn from_os_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self::from_vars(vars.into_iter().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn images_root(&self) -> Result<PathBuf, BbError> {
        self.get(IMAGES_VAR).map(PathBuf::from).ok_or_else(|| {
            BbError::config(format!(
                "please define the {IMAGES_VAR} environment variable with the container images path"
            ))
        })
    }

    pub fn computing_units(&self) -> Result<u32, BbError> {
        match self.get(COMPUTING_UNITS_VAR) {
            None => Ok(1),
            Some(raw) => parse_number(COMPUTING_UNITS_VAR, raw),
        }
    }

    /// Runtime values already exported by an outer invocation.
    pub fn runtime(&self) -> Result<RuntimeEnvironment, BbError> {
        Ok(RuntimeEnvironment {
            tmpdir: self.get(TMPDIR_VAR).map(PathBuf::from),
            processes: self
                .get(PROCESSES_VAR)
                .map(|raw| parse_number(PROCESSES_VAR, raw))
                .transpose()?,
            gpus: self
                .get(GPUS_VAR)
                .map(|raw| parse_number(GPUS_VAR, raw))
                .transpose()?,
            memory: self
                .get(MEMORY_VAR)
                .map(|raw| parse_number(MEMORY_VAR, raw))
                .transpose()?,
            mount_points: self.get(MOUNT_POINTS_VAR).map(str::to_string),
        })
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, BbError> {
    raw.trim()
        .parse()
        .map_err(|_| BbError::config(format!("{var} must be a non-negative integer, got `{raw}`")))
}

/// Resources and mounts requested for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    pub tmpdir: Option<PathBuf>,
    pub processes: Option<u32>,
    pub gpus: Option<u32>,
    pub memory: Option<u64>,
    pub mount_points: Option<String>,
}

impl RuntimeEnvironment {
    /// Overlay command-line values on the inherited ones and check them.
    ///
    /// `tmpdir` must exist and is stored as its canonical path.
    pub fn resolve(
        inherited: RuntimeEnvironment,
        requested: &RuntimeEnvironment,
    ) -> Result<Self, BbError> {
        let mut merged = Self {
            tmpdir: requested.tmpdir.clone().or(inherited.tmpdir),
            processes: requested.processes.or(inherited.processes),
            gpus: requested.gpus.or(inherited.gpus),
            memory: requested.memory.or(inherited.memory),
            mount_points: requested.mount_points.clone().or(inherited.mount_points),
        };
        if let Some(tmpdir) = merged.tmpdir.take() {
            merged.tmpdir = Some(existing_tmpdir(&tmpdir)?);
        }
        debug!(exported = ?merged.exported(), "runtime environment resolved");
        Ok(merged)
    }

    /// The exported subset keyed by `tmpdir`, `processes`, `gpus`, `memory`
    /// and `mount_points`; absent values are omitted.
    pub fn exported(&self) -> BTreeMap<&'static str, String> {
        let mut out = BTreeMap::new();
        if let Some(tmpdir) = &self.tmpdir {
            out.insert("tmpdir", tmpdir.display().to_string());
        }
        if let Some(processes) = self.processes {
            out.insert("processes", processes.to_string());
        }
        if let Some(gpus) = self.gpus {
            out.insert("gpus", gpus.to_string());
        }
        if let Some(memory) = self.memory {
            out.insert("memory", memory.to_string());
        }
        if let Some(mount_points) = &self.mount_points {
            out.insert("mount_points", mount_points.clone());
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.exported().remove(key)
    }

    /// Variable assignments for the child process environment.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.exported()
            .into_iter()
            .map(|(key, value)| (var_name(key).to_string(), value))
            .collect()
    }
}

fn var_name(key: &str) -> &'static str {
    match key {
        "tmpdir" => TMPDIR_VAR,
        "processes" => PROCESSES_VAR,
        "gpus" => GPUS_VAR,
        "memory" => MEMORY_VAR,
        _ => MOUNT_POINTS_VAR,
    }
}

fn existing_tmpdir(path: &Path) -> Result<PathBuf, BbError> {
    if !path.exists() {
        return Err(BbError::config(format!(
            "tmpdir {} does not exist",
            path.display()
        )));
    }
    path.canonicalize()
        .map_err(|err| BbError::io(format!("resolve tmpdir {}", path.display()), err))
}
