//! Represents a single planned credential check — one AWS CLI invocation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// AWS service a check exercises.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    Ecr,
    SecretsManager,
    S3,
    CloudWatchLogs,
    Ecs,
    Iam,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Service::Ecr => "ECR",
            Service::SecretsManager => "Secrets Manager",
            Service::S3 => "S3",
            Service::CloudWatchLogs => "CloudWatch Logs",
            Service::Ecs => "ECS",
            Service::Iam => "IAM",
        };
        f.write_str(label)
    }
}

/// A check in the run plan.
///
/// `args` holds the AWS CLI subcommand and its arguments. The program name and
/// the global `--region` / `--profile` flags are added by the runner.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CheckSpec {
    /// Human-readable label printed in the report.
    pub name: String,

    /// Service the command talks to.
    pub service: Service,

    /// Subcommand and arguments passed to the `aws` binary.
    pub args: Vec<String>,

    /// Whether the command changes remote state (the S3 write/delete pair).
    pub mutates: bool,
}

impl CheckSpec {
    pub fn read_only<I, S>(name: impl Into<String>, service: Service, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            service,
            args: args.into_iter().map(Into::into).collect(),
            mutates: false,
        }
    }

    pub fn mutating<I, S>(name: impl Into<String>, service: Service, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mutates: true,
            ..Self::read_only(name, service, args)
        }
    }

    /// The command as an operator would type it, without global flags.
    pub fn command_line(&self) -> String {
        let mut line = String::from("aws");
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}
