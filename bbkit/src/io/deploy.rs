//! Deployment of building block containers and workflows.
//!
//! Building blocks are checked against the public catalogue and their image
//! is pulled with `apptainer pull`. Workflows are downloaded as a zip archive
//! of their main branch, extracted in place, and their required building
//! blocks are deployed in turn.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::io::process::{CommandRunner, run_and_relay};

/// Remote locations used by deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySources {
    /// Base URL of the building block catalogue; `<base>/<name>` must exist.
    pub catalogue: String,
    /// Base URL of workflow repositories; `<base>/<name>` must exist.
    pub workflows: String,
    /// Image registry prefix for `apptainer pull`.
    pub registry: String,
}

impl Default for DeploySources {
    fn default() -> Self {
        Self {
            catalogue: "https://github.com/PerMedCoE/BuildingBlocks/tree/main".to_string(),
            workflows: "https://github.com/PerMedCoE".to_string(),
            registry: "docker://ghcr.io/jaantollander".to_string(),
        }
    }
}

impl DeploySources {
    pub fn block_url(&self, name: &str) -> String {
        format!("{}/{name}", self.catalogue.trim_end_matches('/'))
    }

    pub fn workflow_url(&self, name: &str) -> String {
        format!("{}/{name}/", self.workflows.trim_end_matches('/'))
    }

    pub fn workflow_archive_url(&self, name: &str) -> String {
        format!(
            "{}/{name}/archive/refs/heads/main.zip",
            self.workflows.trim_end_matches('/')
        )
    }

    pub fn image_ref(&self, name: &str) -> String {
        format!("{}/{name}:latest", self.registry.trim_end_matches('/'))
    }
}

/// Access to remote resources.
pub trait Remote {
    /// Whether `url` answers with a success status.
    fn exists(&self, url: &str) -> Result<bool>;
    /// Download `url` into a new file at `dest`.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Plain blocking HTTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpRemote;

impl Remote for HttpRemote {
    fn exists(&self, url: &str) -> Result<bool> {
        match ureq::get(url).call() {
            Ok(resp) => Ok(resp.status() == 200),
            Err(ureq::Error::StatusCode(code)) => {
                debug!(url, code, "remote resource not available");
                Ok(false)
            }
            Err(err) => Err(err).with_context(|| format!("GET {url}")),
        }
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let resp = ureq::get(url)
            .call()
            .with_context(|| format!("GET {url}"))?;
        let mut reader = resp.into_body().into_reader();
        let mut out = File::create(dest).with_context(|| format!("create {}", dest.display()))?;
        io::copy(&mut reader, &mut out).with_context(|| format!("write {}", dest.display()))?;
        Ok(())
    }
}

/// Everything deployment needs from its surroundings.
pub struct Deployer<'a> {
    pub sources: &'a DeploySources,
    pub remote: &'a dyn Remote,
    pub runner: &'a dyn CommandRunner,
    /// Folder receiving `<name>.sif` images.
    pub images_root: &'a Path,
}

impl Deployer<'_> {
    /// Check that the building block exists and pull its image if missing.
    pub fn deploy_block(&self, name: &str) -> Result<()> {
        let url = self.sources.block_url(name);
        debug!(block = name, url = %url, "checking building block");
        if !self.remote.exists(&url)? {
            bail!("building block {name} not found");
        }
        let image = self.images_root.join(format!("{name}.sif"));
        if image.is_file() {
            info!(image = %image.display(), "container already present");
            return Ok(());
        }
        let command = vec![
            "apptainer".to_string(),
            "pull".to_string(),
            image.display().to_string(),
            self.sources.image_ref(name),
        ];
        run_and_relay(self.runner, &command, &[])
            .with_context(|| format!("pull container for {name}"))?;
        Ok(())
    }

    /// Download and extract the workflow into `cwd/<name>`, then deploy the
    /// building blocks it lists.
    pub fn deploy_workflow(&self, name: &str, cwd: &Path) -> Result<PathBuf> {
        if !self.remote.exists(&self.sources.workflow_url(name))? {
            bail!("workflow {name} not found");
        }
        let archive_url = self.sources.workflow_archive_url(name);
        if !self.remote.exists(&archive_url)? {
            bail!("could not find the zip archive of workflow {name}");
        }

        let archive = cwd.join("main.zip");
        if archive.exists() {
            bail!(
                "a file named {} already exists; try again in another folder or remove it",
                archive.display()
            );
        }
        let target = cwd.join(name);
        if target.exists() {
            bail!("a folder named {} already exists", target.display());
        }

        info!(url = %archive_url, "downloading workflow");
        self.remote.download(&archive_url, &archive)?;
        extract_zip(&archive, cwd)?;
        let extracted = cwd.join(format!("{name}-main"));
        fs::rename(&extracted, &target).with_context(|| {
            format!("rename {} to {}", extracted.display(), target.display())
        })?;
        fs::remove_file(&archive).with_context(|| format!("remove {}", archive.display()))?;

        let required_path = target.join("BuildingBlocks").join("required_BBs.txt");
        let required = fs::read_to_string(&required_path).with_context(|| {
            format!(
                "could not install the workflow building blocks: missing {}",
                required_path.display()
            )
        })?;
        for block in parse_required_blocks(&required) {
            self.deploy_block(&block)
                .with_context(|| format!("deploy building block {block} required by {name}"))?;
        }
        Ok(target)
    }
}

/// Block names listed one per line; blank lines and `#` comments are skipped.
pub fn parse_required_blocks(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Next steps printed after a workflow is deployed.
pub fn workflow_instructions(target: &Path, name: &str, sources: &DeploySources) -> String {
    format!(
        "\nINFORMATION:\n\n\
         \t- The workflow has been deployed in: {target}\n\
         \t- Its associated building blocks have been installed.\n\n\
         NEXT STEPS:\n\n\
         \t- 1st: Make sure that the desired workflow manager is installed\n\
         \t       (PyCOMPSs, Snakemake or Nextflow).\n\
         \t- 2nd: Go to the workflow folder, for example:\n\
         \t       cd {target}/Workflow/PyCOMPSs\n\
         \t- 3rd: Run the dataset preparation script if there is one:\n\
         \t       ./0_prepare_dataset.sh\n\
         \t- 4th: Locate and run the execution script:\n\
         \t       ./run.sh\n\n\
         For more information, check the workflow documentation: {url}\n",
        target = target.display(),
        url = sources.workflow_url(name),
    )
}

fn extract_zip(path: &Path, out_dir: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("open zip")?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).context("zip entry")?;
        let name = entry.name().to_string();
        let out_path = out_dir.join(sanitize_rel_path(Path::new(&name))?);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("create directory {}", out_path.display()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut out =
            File::create(&out_path).with_context(|| format!("create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out).with_context(|| format!("write {}", out_path.display()))?;
    }
    Ok(())
}

fn sanitize_rel_path(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                bail!("invalid archive path (absolute): {}", path.display())
            }
            Component::ParentDir => bail!("invalid archive path (..): {}", path.display()),
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Write;

    use super::*;
    use crate::test_support::RecordingRunner;

    /// Remote serving in-memory bodies keyed by URL.
    #[derive(Default)]
    struct FakeRemote {
        bodies: BTreeMap<String, Vec<u8>>,
    }

    impl FakeRemote {
        fn with(mut self, url: String, body: Vec<u8>) -> Self {
            self.bodies.insert(url, body);
            self
        }
    }

    impl Remote for FakeRemote {
        fn exists(&self, url: &str) -> Result<bool> {
            Ok(self.bodies.contains_key(url))
        }

        fn download(&self, url: &str, dest: &Path) -> Result<()> {
            let body = self.bodies.get(url).context("no such url")?;
            fs::write(dest, body)?;
            Ok(())
        }
    }

    fn workflow_zip(name: &str, required: &str) -> Vec<u8> {
        let mut buf = io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            writer
                .add_directory(format!("{name}-main/BuildingBlocks/"), options)
                .expect("dir");
            writer
                .start_file(format!("{name}-main/BuildingBlocks/required_BBs.txt"), options)
                .expect("file");
            writer.write_all(required.as_bytes()).expect("write");
            writer
                .start_file(format!("{name}-main/README.md"), options)
                .expect("file");
            writer.write_all(b"workflow").expect("write");
            writer.finish().expect("finish");
        }
        buf.into_inner()
    }

    #[test]
    fn required_blocks_skip_comments_and_blanks() {
        assert_eq!(
            parse_required_blocks("# blocks\nalpha\n\n  beta  \n#gamma\n"),
            vec!["alpha", "beta"]
        );
    }

    #[test]
    fn block_image_is_pulled_when_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sources = DeploySources::default();
        let remote = FakeRemote::default().with(sources.block_url("alpha"), Vec::new());
        let runner = RecordingRunner::succeeding();
        let deployer = Deployer {
            sources: &sources,
            remote: &remote,
            runner: &runner,
            images_root: temp.path(),
        };

        deployer.deploy_block("alpha").expect("deploy");
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            vec![
                "apptainer".to_string(),
                "pull".to_string(),
                temp.path().join("alpha.sif").display().to_string(),
                "docker://ghcr.io/jaantollander/alpha:latest".to_string(),
            ]
        );

        fs::write(temp.path().join("alpha.sif"), "image").expect("write");
        deployer.deploy_block("alpha").expect("deploy again");
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn unknown_block_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = RecordingRunner::succeeding();
        let deployer = Deployer {
            sources: &DeploySources::default(),
            remote: &FakeRemote::default(),
            runner: &runner,
            images_root: temp.path(),
        };
        let err = deployer.deploy_block("ghost").expect_err("not found");
        assert!(err.to_string().contains("not found"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn workflow_is_extracted_and_its_blocks_deployed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let images = temp.path().join("images");
        fs::create_dir(&images).expect("mkdir");
        let sources = DeploySources::default();
        let remote = FakeRemote::default()
            .with(sources.workflow_url("study"), Vec::new())
            .with(
                sources.workflow_archive_url("study"),
                workflow_zip("study", "# needed\nalpha\nbeta\n"),
            )
            .with(sources.block_url("alpha"), Vec::new())
            .with(sources.block_url("beta"), Vec::new());
        let runner = RecordingRunner::succeeding();
        let deployer = Deployer {
            sources: &sources,
            remote: &remote,
            runner: &runner,
            images_root: &images,
        };

        let target = deployer.deploy_workflow("study", temp.path()).expect("deploy");
        assert_eq!(target, temp.path().join("study"));
        assert!(target.join("README.md").is_file());
        assert!(!temp.path().join("main.zip").exists());
        assert!(!temp.path().join("study-main").exists());
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn existing_archive_stops_workflow_deployment() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("main.zip"), "old").expect("write");
        let sources = DeploySources::default();
        let remote = FakeRemote::default()
            .with(sources.workflow_url("study"), Vec::new())
            .with(sources.workflow_archive_url("study"), Vec::new());
        let runner = RecordingRunner::succeeding();
        let deployer = Deployer {
            sources: &sources,
            remote: &remote,
            runner: &runner,
            images_root: temp.path(),
        };
        let err = deployer
            .deploy_workflow("study", temp.path())
            .expect_err("archive exists");
        assert!(err.to_string().contains("already exists"));
        assert_eq!(fs::read_to_string(temp.path().join("main.zip")).expect("read"), "old");
    }

    #[test]
    fn archive_paths_cannot_escape() {
        assert!(sanitize_rel_path(Path::new("../evil")).is_err());
        assert!(sanitize_rel_path(Path::new("/etc/passwd")).is_err());
        assert_eq!(
            sanitize_rel_path(Path::new("./a/b")).expect("relative"),
            PathBuf::from("a/b")
        );
    }
}
