//! Command lines for running an application through a workflow manager.

/// Workflow managers an application can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WorkflowManager {
    /// Plain `python3 <app>`.
    #[default]
    None,
    Pycompss,
    Nextflow,
    Snakemake,
}

impl WorkflowManager {
    pub fn program(self) -> &'static str {
        match self {
            Self::None => "python3",
            Self::Pycompss => "runcompss",
            Self::Nextflow => "nextflow",
            Self::Snakemake => "snakemake",
        }
    }
}

/// Build `<manager> [flags...] [--snakefile] <app> [params...]`.
///
/// Every flag and parameter string is split on whitespace, so `-f "--a 1"`
/// contributes two tokens.
pub fn workflow_command(
    manager: WorkflowManager,
    flags: &[String],
    application: &str,
    parameters: &[String],
) -> Vec<String> {
    let mut command = vec![manager.program().to_string()];
    command.extend(
        flags
            .iter()
            .flat_map(|flag| flag.split_whitespace())
            .map(str::to_string),
    );
    if manager == WorkflowManager::Snakemake {
        command.push("--snakefile".to_string());
    }
    command.push(application.to_string());
    command.extend(
        parameters
            .iter()
            .flat_map(|param| param.split_whitespace())
            .map(str::to_string),
    );
    command
}
