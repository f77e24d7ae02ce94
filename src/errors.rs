//! Error types for running individual credential checks.

use serde::{Deserialize, Serialize};
use std::{fmt, io, time::Duration};
use thiserror::Error;

/// Failure to obtain a result from the AWS CLI at all.
///
/// A command that ran and exited non-zero is *not* a `CheckError`; it is a
/// normal [`crate::services::aws_cli::CliOutput`] with `success == false`.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to execute `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("command timed out after {}s", after.as_secs_f64())]
    Timeout { after: Duration },
}

pub type CheckResult<T> = Result<T, CheckError>;

impl CheckError {
    /// Map a runner error onto the reported failure category.
    pub fn kind(&self) -> FailureKind {
        match self {
            CheckError::Spawn { .. } => FailureKind::CliUnavailable,
            CheckError::Timeout { .. } => FailureKind::Timeout,
        }
    }
}

/// Best-effort category of a failed check.
///
/// Only used for display. Every failure counts the same.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    AccessDenied,
    NotFound,
    NoCredentials,
    Network,
    Throttled,
    CliUnavailable,
    Timeout,
    Other,
}

/// Stderr fragments emitted by the AWS CLI, checked in order.
const STDERR_PATTERNS: &[(&str, FailureKind)] = &[
    ("Unable to locate credentials", FailureKind::NoCredentials),
    ("ExpiredToken", FailureKind::NoCredentials),
    ("InvalidClientTokenId", FailureKind::NoCredentials),
    ("UnrecognizedClientException", FailureKind::NoCredentials),
    ("The config profile", FailureKind::NoCredentials),
    ("AccessDenied", FailureKind::AccessDenied),
    ("UnauthorizedOperation", FailureKind::AccessDenied),
    ("not authorized to perform", FailureKind::AccessDenied),
    ("Forbidden", FailureKind::AccessDenied),
    ("RepositoryNotFoundException", FailureKind::NotFound),
    ("ResourceNotFoundException", FailureKind::NotFound),
    ("ClusterNotFoundException", FailureKind::NotFound),
    ("NoSuchEntity", FailureKind::NotFound),
    ("NoSuchBucket", FailureKind::NotFound),
    ("does not exist", FailureKind::NotFound),
    ("(404)", FailureKind::NotFound),
    ("Throttling", FailureKind::Throttled),
    ("TooManyRequests", FailureKind::Throttled),
    ("Could not connect to the endpoint URL", FailureKind::Network),
    ("Connect timeout", FailureKind::Network),
    ("Read timeout", FailureKind::Network),
    ("Name or service not known", FailureKind::Network),
];

impl FailureKind {
    /// Classify AWS CLI stderr output.
    pub fn classify(stderr: &str) -> Self {
        STDERR_PATTERNS
            .iter()
            .find(|(needle, _)| stderr.contains(needle))
            .map(|(_, kind)| *kind)
            .unwrap_or(FailureKind::Other)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::AccessDenied => "access denied",
            FailureKind::NotFound => "not found",
            FailureKind::NoCredentials => "no valid credentials",
            FailureKind::Network => "network error",
            FailureKind::Throttled => "throttled",
            FailureKind::CliUnavailable => "aws cli unavailable",
            FailureKind::Timeout => "timed out",
            FailureKind::Other => "error",
        };
        f.write_str(label)
    }
}
