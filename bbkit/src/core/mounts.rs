//! Pure ordering and parsing rules for container bind mounts.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::BbError;

/// How a task flag that carries a path is treated by the mount resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathDirection {
    FileIn,
    FileOut,
    DirectoryIn,
    /// Created on the host when absent.
    DirectoryOut,
}

impl PathDirection {
    pub fn is_file(self) -> bool {
        matches!(self, Self::FileIn | Self::FileOut)
    }
}

/// One `source:target` bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub source: String,
    pub target: String,
}

impl Bind {
    /// Host path mounted at the same location inside the container.
    pub fn same_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            target: path,
        }
    }

    pub fn clause(&self) -> String {
        format!("{}:{}", self.source, self.target)
    }
}

/// Ordered binds handed to the container command builder.
///
/// Computed binds come first, user-declared binds after them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountPlan {
    pub computed: Vec<Bind>,
    pub user: Vec<Bind>,
}

impl MountPlan {
    pub fn binds(&self) -> impl Iterator<Item = &Bind> {
        self.computed.iter().chain(self.user.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.computed.is_empty() && self.user.is_empty()
    }
}

/// Sort mount candidates by path-string length, shortest first.
///
/// Shorter (broader) binds are registered before longer (nested) ones. This
/// is a heuristic: equal-length unrelated paths keep their input order and no
/// prefix relation is checked. Exact duplicates are dropped.
pub fn sort_by_length(candidates: &[PathBuf]) -> Vec<PathBuf> {
    let mut sorted: Vec<PathBuf> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !sorted.contains(candidate) {
            sorted.push(candidate.clone());
        }
    }
    sorted.sort_by_key(|path| path.as_os_str().len());
    sorted
}

/// Parse a comma-separated `alias:path` list into binds, used verbatim.
pub fn parse_user_binds(raw: &str) -> Result<Vec<Bind>, BbError> {
    let mut binds = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(source), Some(target), None) if !source.is_empty() && !target.is_empty() => {
                binds.push(Bind {
                    source: source.to_string(),
                    target: target.to_string(),
                });
            }
            _ => {
                return Err(BbError::config(format!(
                    "invalid mount point `{entry}` (expected alias:path)"
                )));
            }
        }
    }
    Ok(binds)
}
