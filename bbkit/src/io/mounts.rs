//! Filesystem side of mount resolution: absolute paths, output directories
//! and the final bind list.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::flags::FlagValue;
use crate::core::mounts::{Bind, MountPlan, PathDirection, parse_user_binds, sort_by_length};
use crate::error::BbError;
use crate::io::environ::RuntimeEnvironment;

/// A task flag whose value is one or more paths.
#[derive(Debug, Clone, PartialEq)]
pub struct PathFlag {
    pub name: String,
    pub direction: PathDirection,
    pub value: FlagValue,
}

/// Result of resolving every path flag of a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MountResolution {
    /// Host directories to bind, shortest path first.
    pub candidates: Vec<PathBuf>,
    /// Flag values rewritten to absolute paths, keyed by flag name.
    pub replacements: BTreeMap<String, FlagValue>,
    /// Binds declared through `mount_points`, if any.
    pub user_binds: Option<Vec<Bind>>,
}

impl MountResolution {
    pub fn plan(&self) -> MountPlan {
        MountPlan {
            computed: self
                .candidates
                .iter()
                .map(|path| Bind::same_path(path.display().to_string()))
                .collect(),
            user: self.user_binds.clone().unwrap_or_default(),
        }
    }
}

/// Resolve path flags against `cwd`, creating absent output directories.
pub fn resolve_mounts(
    flags: &[PathFlag],
    runtime: &RuntimeEnvironment,
    cwd: &Path,
) -> Result<MountResolution, BbError> {
    let mut candidates = Vec::new();
    let mut replacements = BTreeMap::new();

    for flag in flags {
        let rewritten = rewrite(&flag.value, &mut |raw: &str| {
            let path = absolute(cwd, Path::new(raw));
            let (resolved, mount_dir) = if flag.direction.is_file() {
                resolve_file(&path)?
            } else {
                let dir = resolve_directory(&flag.name, flag.direction, &path)?;
                (dir.clone(), dir)
            };
            candidates.push(mount_dir);
            Ok(resolved.display().to_string())
        })?;
        replacements.insert(flag.name.clone(), rewritten);
    }

    if let Some(tmpdir) = &runtime.tmpdir {
        candidates.push(tmpdir.clone());
    }

    let user_binds = runtime
        .mount_points
        .as_deref()
        .map(parse_user_binds)
        .transpose()?;

    let resolution = MountResolution {
        candidates: sort_by_length(&candidates),
        replacements,
        user_binds,
    };
    debug!(candidates = ?resolution.candidates, "mount candidates resolved");
    Ok(resolution)
}

fn rewrite(
    value: &FlagValue,
    resolve: &mut dyn FnMut(&str) -> Result<String, BbError>,
) -> Result<FlagValue, BbError> {
    match value {
        FlagValue::Scalar(raw) => resolve(raw).map(FlagValue::Scalar),
        FlagValue::List(items) => items
            .iter()
            .map(|item| rewrite(item, resolve))
            .collect::<Result<Vec<_>, _>>()
            .map(FlagValue::List),
    }
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn canonical(path: &Path) -> Result<PathBuf, BbError> {
    path.canonicalize()
        .map_err(|err| BbError::io(format!("resolve {}", path.display()), err))
}

/// Real path of a file plus the directory that contains it.
///
/// The file itself need not exist; its parent is canonicalized when present.
fn resolve_file(path: &Path) -> Result<(PathBuf, PathBuf), BbError> {
    if path.exists() {
        let resolved = canonical(path)?;
        let dir = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| resolved.clone());
        return Ok((resolved, dir));
    }
    let parent = path.parent().unwrap_or(Path::new("/"));
    let dir = if parent.exists() {
        canonical(parent)?
    } else {
        parent.to_path_buf()
    };
    let resolved = match path.file_name() {
        Some(name) => dir.join(name),
        None => dir.clone(),
    };
    Ok((resolved, dir))
}

fn resolve_directory(
    name: &str,
    direction: PathDirection,
    path: &Path,
) -> Result<PathBuf, BbError> {
    if path.exists() {
        return canonical(path);
    }
    match direction {
        PathDirection::DirectoryOut => {
            info!(path = %path.display(), "creating output directory");
            fs::create_dir(path)
                .map_err(|err| BbError::io(format!("create {}", path.display()), err))?;
            canonical(path)
        }
        _ => Err(BbError::MissingInput {
            parameter: name.to_string(),
            path: path.to_path_buf(),
        }),
    }
}
