//! Building block toolkit.
//!
//! Runs containerized building blocks and workflow applications, scaffolds
//! new ones from templates and deploys published ones.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};

use bbkit::core::application::WorkflowManager;
use bbkit::error::{BbError, find_bb_error};
use bbkit::execute::{execute_application, execute_block};
use bbkit::exit_codes;
use bbkit::io::deploy::{DeploySources, Deployer, HttpRemote, workflow_instructions};
use bbkit::io::environ::HostEnvironment;
use bbkit::io::process::{SEPARATOR, SystemRunner};
use bbkit::io::template::{AppTemplate, Artifact, collect_todos, create_template};
use bbkit::logging::{self, LogLevel, LogSettings};

#[derive(Parser)]
#[command(
    name = "bbkit",
    version,
    about = "Run, scaffold and deploy containerized building blocks"
)]
struct Cli {
    /// Enable debug output.
    #[arg(short, long, global = true)]
    debug: bool,
    /// Log level.
    #[arg(
        short = 'l',
        long = "log_level",
        value_enum,
        default_value_t = LogLevel::Error,
        global = true
    )]
    log_level: LogLevel,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a building block or an application.
    #[command(alias = "x", subcommand)]
    Execute(ExecuteTarget),
    /// Create a building block or application skeleton in the current folder.
    #[command(alias = "t", subcommand)]
    Template(TemplateTarget),
    /// Deploy a building block container or a workflow.
    #[command(alias = "d", subcommand)]
    Deploy(DeployTarget),
}

#[derive(Subcommand)]
enum ExecuteTarget {
    /// Run the building block in DIR with the remaining arguments.
    #[command(name = "building_block", alias = "bb")]
    BuildingBlock(ExecuteBlockArgs),
    /// Run an application through a workflow manager.
    #[command(name = "application", alias = "app")]
    Application(ExecuteAppArgs),
}

#[derive(Args)]
struct ExecuteBlockArgs {
    /// Run the block's command through a shell inside the container.
    #[arg(long)]
    shell: bool,
    /// Block directory followed by the block's own arguments.
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "DIR [ARGS]"
    )]
    invocation: Vec<String>,
}

#[derive(Args)]
struct ExecuteAppArgs {
    /// Application file (script, main.nf or Snakefile).
    name: String,
    /// Application parameters.
    parameters: Vec<String>,
    /// Workflow manager to run the application with.
    #[arg(short = 'w', long = "workflow_manager", value_enum, default_value_t)]
    workflow_manager: WorkflowManager,
    /// Extra flags for the workflow manager, one quoted string per use.
    #[arg(short = 'f', long = "flags", allow_hyphen_values = true)]
    flags: Vec<String>,
}

#[derive(Subcommand)]
enum TemplateTarget {
    /// Building block skeleton.
    #[command(name = "building_block", alias = "bb")]
    BuildingBlock { name: String },
    /// Application skeleton.
    #[command(name = "application", alias = "app")]
    Application {
        name: String,
        /// Workflow manager to create the skeleton for.
        #[arg(short = 't', long = "type", value_enum, default_value_t)]
        kind: AppTemplate,
    },
}

#[derive(Subcommand)]
enum DeployTarget {
    /// Pull a building block container into the images folder.
    #[command(name = "building_block", alias = "bb")]
    BuildingBlock { name: String },
    /// Download a workflow and deploy its building blocks.
    #[command(name = "workflow", alias = "app")]
    Workflow { name: String },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::OK,
                _ => exit_codes::FAILURE,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        let code = find_bb_error(&err).map_or(exit_codes::FAILURE, BbError::exit_code);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = LogSettings {
        debug: cli.debug,
        level: cli.log_level,
    };
    match cli.command {
        // The block's own `--debug`/`--log_level` take precedence.
        Command::Execute(ExecuteTarget::BuildingBlock(args)) => cmd_execute_block(args, settings),
        Command::Execute(ExecuteTarget::Application(args)) => {
            logging::init(settings.debug, settings.level);
            cmd_execute_application(args)
        }
        Command::Template(target) => {
            logging::init(settings.debug, settings.level);
            cmd_template(target)
        }
        Command::Deploy(target) => {
            logging::init(settings.debug, settings.level);
            cmd_deploy(target)
        }
    }
}

fn cmd_execute_block(args: ExecuteBlockArgs, settings: LogSettings) -> Result<()> {
    let Some((dir, rest)) = args.invocation.split_first() else {
        bail!("missing building block directory");
    };
    execute_block(&PathBuf::from(dir), args.shell, rest, settings, &SystemRunner)
}

fn cmd_execute_application(args: ExecuteAppArgs) -> Result<()> {
    execute_application(
        &SystemRunner,
        args.workflow_manager,
        &args.flags,
        &args.name,
        &args.parameters,
    )?;
    Ok(())
}

fn cmd_template(target: TemplateTarget) -> Result<()> {
    let (artifact, name) = match target {
        TemplateTarget::BuildingBlock { name } => (Artifact::BuildingBlock, name),
        TemplateTarget::Application { name, kind } => (Artifact::Application(kind), name),
    };
    let cwd = std::env::current_dir().context("read current directory")?;
    let root = create_template(artifact, &name, &cwd)?;
    println!("Created {}", root.display());

    let todos = collect_todos(&root)?;
    if !todos.is_empty() {
        println!("To be completed:");
        println!("{SEPARATOR}");
        for todo in &todos {
            let relative = todo.file.strip_prefix(&root).unwrap_or(&todo.file);
            println!("{}:{}: {}", relative.display(), todo.line, todo.text);
        }
        println!("{SEPARATOR}");
    }
    Ok(())
}

fn cmd_deploy(target: DeployTarget) -> Result<()> {
    let host = HostEnvironment::from_process();
    let images_root = host.images_root()?;
    let sources = DeploySources::default();
    let deployer = Deployer {
        sources: &sources,
        remote: &HttpRemote,
        runner: &SystemRunner,
        images_root: &images_root,
    };
    match target {
        DeployTarget::BuildingBlock { name } => {
            deployer.deploy_block(&name)?;
            println!("Building block {name} deployed in {}", images_root.display());
        }
        DeployTarget::Workflow { name } => {
            let cwd = std::env::current_dir().context("read current directory")?;
            let target = deployer.deploy_workflow(&name, &cwd)?;
            print!("{}", workflow_instructions(&target, &name, &sources));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_execute_block_keeps_block_arguments() {
        let cli = Cli::parse_from([
            "bbkit", "x", "bb", "--shell", "blocks/align", "--reads", "r.fq", "--help",
        ]);
        let Command::Execute(ExecuteTarget::BuildingBlock(args)) = cli.command else {
            panic!("expected execute building_block");
        };
        assert!(args.shell);
        assert_eq!(args.invocation, vec!["blocks/align", "--reads", "r.fq", "--help"]);
    }

    #[test]
    fn parse_execute_application_with_manager() {
        let cli = Cli::parse_from([
            "bbkit",
            "execute",
            "application",
            "main.nf",
            "-w",
            "nextflow",
            "-l",
            "debug",
        ]);
        assert_eq!(cli.log_level, LogLevel::Debug);
        let Command::Execute(ExecuteTarget::Application(args)) = cli.command else {
            panic!("expected execute application");
        };
        assert_eq!(args.workflow_manager, WorkflowManager::Nextflow);
        assert_eq!(args.name, "main.nf");
    }

    #[test]
    fn parse_template_application_type() {
        let cli = Cli::parse_from(["bbkit", "t", "app", "study", "--type", "snakemake"]);
        assert!(matches!(
            cli.command,
            Command::Template(TemplateTarget::Application {
                kind: AppTemplate::Snakemake,
                ..
            })
        ));
    }

    #[test]
    fn parse_deploy_workflow_alias() {
        let cli = Cli::parse_from(["bbkit", "d", "app", "covid"]);
        assert!(matches!(
            cli.command,
            Command::Deploy(DeployTarget::Workflow { ref name }) if name == "covid"
        ));
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["bbkit"]).is_err());
    }
}
