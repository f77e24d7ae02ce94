//! AWS CLI execution.
//!
//! Checks talk to AWS exclusively through the installed `aws` binary so the
//! tool exercises exactly the credential chain an operator or CI job would.
//! The [`AwsCli`] trait is the seam the suite is tested through.

use crate::errors::{CheckError, CheckResult};
use async_trait::async_trait;
use std::{process::Stdio, time::Duration};
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished AWS CLI process.
#[derive(Debug, Clone, Default)]
pub struct CliOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    #[cfg(test)]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[cfg(test)]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// First non-blank stderr line, trimmed.
    pub fn stderr_summary(&self) -> String {
        self.stderr
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// Runs AWS CLI subcommands.
///
/// Returns `Err` only when no exit status could be obtained (spawn failure or
/// timeout). A non-zero exit is `Ok` with `success == false`.
#[async_trait]
pub trait AwsCli: Send + Sync {
    async fn run(&self, args: &[String]) -> CheckResult<CliOutput>;
}

/// [`AwsCli`] backed by a real subprocess.
#[derive(Debug, Clone)]
pub struct ProcessAwsCli {
    program: String,
    region: String,
    profile: Option<String>,
    timeout: Option<Duration>,
}

impl ProcessAwsCli {
    pub fn new(program: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            region: region.into(),
            profile: None,
            timeout: None,
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument vector including the global flags.
    fn full_args(&self, args: &[String]) -> Vec<String> {
        let mut full = args.to_vec();
        full.push("--region".into());
        full.push(self.region.clone());
        if let Some(profile) = &self.profile {
            full.push("--profile".into());
            full.push(profile.clone());
        }
        full
    }

    /// ARN of the principal the CLI is authenticated as.
    ///
    /// Informational only; never counted as a check.
    pub async fn caller_identity(&self) -> CheckResult<Option<String>> {
        let args: Vec<String> = ["sts", "get-caller-identity", "--query", "Arn", "--output", "text"]
            .into_iter()
            .map(String::from)
            .collect();
        let output = self.run(&args).await?;
        if output.success {
            Ok(Some(output.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl AwsCli for ProcessAwsCli {
    async fn run(&self, args: &[String]) -> CheckResult<CliOutput> {
        let full_args = self.full_args(args);
        debug!(program = %self.program, args = ?full_args, "spawning aws cli");

        let mut command = Command::new(&self.program);
        command
            .args(&full_args)
            .env("AWS_PAGER", "")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let child = command.output();

        let output = match self.timeout {
            Some(after) => match tokio::time::timeout(after, child).await {
                Ok(result) => result,
                Err(_) => return Err(CheckError::Timeout { after }),
            },
            None => child.await,
        }
        .map_err(|source| CheckError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        Ok(CliOutput {
            exit_code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
