//! Container-runtime command line rendering.
//!
//! Field order is fixed:
//! `engine base → action → action flags → mounts → envs → image → executable → user flags`.
//! Without a container only `executable → user flags` are rendered.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::mounts::{Bind, MountPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    #[serde(alias = "SINGULARITY")]
    Singularity,
    #[serde(alias = "APPTAINER")]
    Apptainer,
}

impl Engine {
    pub fn program(self) -> &'static str {
        match self {
            Self::Singularity => "singularity",
            Self::Apptainer => "apptainer",
        }
    }

    fn base(self) -> String {
        format!("{} --silent", self.program())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Exec,
    /// Interactive shell inside the image, for debugging a block.
    Shell,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::Shell => "shell",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executable {
    Binary(String),
    /// `<runner> -np <computing_units> <binary>`.
    Mpi {
        runner: String,
        computing_units: u32,
        binary: String,
    },
}

impl Executable {
    pub fn parts(&self) -> Vec<String> {
        match self {
            Self::Binary(path) => vec![path.clone()],
            Self::Mpi {
                runner,
                computing_units,
                binary,
            } => vec![
                runner.clone(),
                "-np".to_string(),
                computing_units.to_string(),
                binary.clone(),
            ],
        }
    }
}

/// Everything needed to render one command line. Built per task, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInvocation {
    pub engine: Engine,
    pub action: Action,
    /// Host working directory, pinned inside the container with `--pwd`.
    pub workdir: PathBuf,
    pub image: String,
    pub executable: Executable,
    pub mounts: MountPlan,
    pub env_vars: Vec<String>,
    pub user_flags: Vec<String>,
    pub run_in_container: bool,
}

impl ContainerInvocation {
    fn action_flags(&self) -> String {
        format!("--contain --cleanenv --pwd {}", self.workdir.display())
    }

    fn mounts_field(&self) -> String {
        if self.mounts.is_empty() {
            return String::new();
        }
        let clauses: Vec<String> = self.mounts.binds().map(Bind::clause).collect();
        format!("-B {}", clauses.join(","))
    }

    fn envs_field(&self) -> String {
        if self.env_vars.is_empty() {
            return String::new();
        }
        format!("--env {}", self.env_vars.join(","))
    }

    /// Render the whitespace-normalized command line.
    pub fn render(&self) -> String {
        let mut fields: Vec<String> = Vec::new();
        if self.run_in_container {
            fields.push(self.engine.base());
            fields.push(self.action.as_str().to_string());
            fields.push(self.action_flags());
            fields.push(self.mounts_field());
            fields.push(self.envs_field());
            fields.push(self.image.clone());
        }
        fields.push(self.executable.parts().join(" "));
        fields.push(self.user_flags.join(" "));
        normalize_whitespace(&fields.join(" "))
    }

    /// Program plus arguments, split from the rendered line.
    pub fn tokens(&self) -> Vec<String> {
        tokenize(&self.render())
    }
}

/// Collapse runs of spaces into one and trim the ends.
pub fn normalize_whitespace(line: &str) -> String {
    line.split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn tokenize(line: &str) -> Vec<String> {
    line.split(' ')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> ContainerInvocation {
        ContainerInvocation {
            engine: Engine::Singularity,
            action: Action::Exec,
            workdir: PathBuf::from("/work"),
            image: "img.sif".to_string(),
            executable: Executable::Binary("/bin/tool".to_string()),
            mounts: MountPlan {
                computed: vec![Bind::same_path("/x")],
                user: Vec::new(),
            },
            env_vars: vec!["FOO".to_string()],
            user_flags: vec!["-v".to_string()],
            run_in_container: true,
        }
    }

    #[test]
    fn renders_fields_in_fixed_order() {
        assert_eq!(
            invocation().tokens(),
            vec![
                "singularity",
                "--silent",
                "exec",
                "--contain",
                "--cleanenv",
                "--pwd",
                "/work",
                "-B",
                "/x:/x",
                "--env",
                "FOO",
                "img.sif",
                "/bin/tool",
                "-v",
            ]
        );
    }

    #[test]
    fn binds_and_envs_are_comma_joined_in_one_flag() {
        let mut inv = invocation();
        inv.mounts.computed.push(Bind::same_path("/x/y"));
        inv.mounts.user.push(Bind {
            source: "db".to_string(),
            target: "/db".to_string(),
        });
        inv.env_vars.push("BAR".to_string());
        let line = inv.render();
        assert!(line.contains("-B /x:/x,/x/y:/x/y,db:/db --env FOO,BAR img.sif"));
    }

    #[test]
    fn disabled_container_renders_only_executable_and_flags() {
        let mut inv = invocation();
        inv.run_in_container = false;
        assert_eq!(inv.tokens(), vec!["/bin/tool", "-v"]);
    }

    #[test]
    fn mpi_executable_wraps_binary_with_runner() {
        let mut inv = invocation();
        inv.executable = Executable::Mpi {
            runner: "mpirun".to_string(),
            computing_units: 4,
            binary: "/opt/solver".to_string(),
        };
        assert!(inv.render().ends_with("img.sif mpirun -np 4 /opt/solver -v"));
    }

    #[test]
    fn shell_action_and_empty_fields() {
        let mut inv = invocation();
        inv.action = Action::Shell;
        inv.engine = Engine::Apptainer;
        inv.mounts = MountPlan::default();
        inv.env_vars.clear();
        inv.user_flags = vec!["-k  5".to_string(), String::new()];
        assert_eq!(
            inv.render(),
            "apptainer --silent shell --contain --cleanenv --pwd /work img.sif /bin/tool -k 5"
        );
    }
}
