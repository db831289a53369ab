//! Scaffolding for new building blocks and applications.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use minijinja::{Environment, context};
use tracing::debug;

const BLOCK_MANIFEST: &str = include_str!("templates/block/bb.toml.j2");
const BLOCK_DEFINITION: &str = include_str!("templates/block/definition.json.j2");
const BLOCK_README: &str = include_str!("templates/block/README.md.j2");
const APP_PYCOMPSS: &str = include_str!("templates/application/app.py.j2");
const APP_NEXTFLOW: &str = include_str!("templates/application/main.nf.j2");
const APP_SNAKEMAKE: &str = include_str!("templates/application/Snakefile.j2");

/// Application flavours a template can be created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AppTemplate {
    /// One skeleton per workflow manager.
    #[default]
    All,
    Pycompss,
    Nextflow,
    Snakemake,
}

/// What to scaffold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    BuildingBlock,
    Application(AppTemplate),
}

/// A line still to be completed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItem {
    pub file: PathBuf,
    pub line: usize,
    pub text: String,
}

/// Files to write, as `(relative path, template source)`.
fn files_for(artifact: Artifact) -> Vec<(&'static str, &'static str)> {
    let pycompss = ("app.py", APP_PYCOMPSS);
    let nextflow = ("main.nf", APP_NEXTFLOW);
    let snakemake = ("Snakefile", APP_SNAKEMAKE);
    match artifact {
        Artifact::BuildingBlock => vec![
            ("bb.toml", BLOCK_MANIFEST),
            ("definition.json", BLOCK_DEFINITION),
            ("README.md", BLOCK_README),
        ],
        Artifact::Application(AppTemplate::Pycompss) => vec![pycompss],
        Artifact::Application(AppTemplate::Nextflow) => vec![nextflow],
        Artifact::Application(AppTemplate::Snakemake) => vec![snakemake],
        Artifact::Application(AppTemplate::All) => vec![
            ("PyCOMPSs/app.py", APP_PYCOMPSS),
            ("NextFlow/main.nf", APP_NEXTFLOW),
            ("SnakeMake/Snakefile", APP_SNAKEMAKE),
        ],
    }
}

fn render(source: &str, name: &str, path: &str) -> Result<String> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_template(path, source)
        .with_context(|| format!("load template {path}"))?;
    let rendered = env
        .get_template(path)?
        .render(context! { name => name })
        .with_context(|| format!("render template {path}"))?;
    Ok(rendered)
}

/// Create `<cwd>/<name>` from the artifact's templates.
///
/// Refuses to touch an existing folder. Returns the created folder.
pub fn create_template(artifact: Artifact, name: &str, cwd: &Path) -> Result<PathBuf> {
    if name.trim().is_empty() || name.contains(['/', '\\']) {
        bail!("invalid template name `{name}`");
    }
    let root = cwd.join(name);
    if root.exists() {
        bail!(
            "can not create template: a folder named {name} already exists in {}",
            cwd.display()
        );
    }
    for (relative, source) in files_for(artifact) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let contents = render(source, name, relative)?;
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), "template file written");
    }
    Ok(root)
}

/// Collect every `TODO` line under `root`, files in path order.
pub fn collect_todos(root: &Path) -> Result<Vec<TodoItem>> {
    let mut files = Vec::new();
    walk(root, &mut files)?;
    files.sort();
    let mut todos = Vec::new();
    for file in files {
        let contents =
            fs::read_to_string(&file).with_context(|| format!("read {}", file.display()))?;
        for (index, line) in contents.lines().enumerate() {
            if let Some(position) = line.find("TODO") {
                todos.push(TodoItem {
                    file: file.clone(),
                    line: index + 1,
                    text: line[position..].trim().to_string(),
                });
            }
        }
    }
    Ok(todos)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arguments::ArgumentSource;
    use crate::io::manifest::load_block;

    #[test]
    fn block_template_is_a_loadable_block() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = create_template(Artifact::BuildingBlock, "copier", temp.path()).expect("create");

        let block = load_block(&root).expect("generated block loads");
        assert_eq!(block.name, "copier");
        assert_eq!(block.manifest.container.image, "copier.sif");
        assert!(matches!(block.source, ArgumentSource::Declarative(_)));
    }

    #[test]
    fn existing_folder_is_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join("taken")).expect("mkdir");
        let err = create_template(Artifact::BuildingBlock, "taken", temp.path())
            .expect_err("exists");
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn all_application_templates_get_their_own_folder() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = create_template(Artifact::Application(AppTemplate::All), "study", temp.path())
            .expect("create");
        for file in ["PyCOMPSs/app.py", "NextFlow/main.nf", "SnakeMake/Snakefile"] {
            assert!(root.join(file).is_file(), "missing {file}");
        }
        let app = fs::read_to_string(root.join("PyCOMPSs/app.py")).expect("read");
        assert!(app.contains("study application"));
    }

    #[test]
    fn single_application_template_is_flat() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = create_template(
            Artifact::Application(AppTemplate::Snakemake),
            "study",
            temp.path(),
        )
        .expect("create");
        assert!(root.join("Snakefile").is_file());
        assert!(!root.join("app.py").exists());
    }

    #[test]
    fn todos_are_listed_with_line_numbers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = create_template(Artifact::BuildingBlock, "copier", temp.path()).expect("create");
        let todos = collect_todos(&root).expect("todos");
        assert!(!todos.is_empty());
        assert!(todos.iter().all(|todo| todo.text.starts_with("TODO")));
        assert!(todos.iter().any(|todo| todo.file.ends_with("bb.toml") && todo.line > 1));
    }
}
