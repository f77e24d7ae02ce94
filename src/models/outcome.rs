//! Results of executed checks and the aggregate run summary.

use crate::errors::FailureKind;
use crate::models::check::{CheckSpec, Service};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skip,
}

/// Why a check failed, as far as we can tell from the CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FailureDetail {
    pub kind: FailureKind,

    /// Process exit code, absent when the process never ran or was killed.
    pub exit_code: Option<i32>,

    /// First meaningful line of stderr or the runner error.
    pub message: String,
}

/// Outcome of one check.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckOutcome {
    pub name: String,
    pub service: Service,
    pub command: String,
    pub status: CheckStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
}

impl CheckOutcome {
    pub fn passed(spec: &CheckSpec, duration_ms: u64) -> Self {
        Self::new(spec, CheckStatus::Pass, duration_ms, None)
    }

    pub fn failed(spec: &CheckSpec, duration_ms: u64, failure: FailureDetail) -> Self {
        Self::new(spec, CheckStatus::Fail, duration_ms, Some(failure))
    }

    pub fn skipped(spec: &CheckSpec) -> Self {
        Self::new(spec, CheckStatus::Skip, 0, None)
    }

    fn new(
        spec: &CheckSpec,
        status: CheckStatus,
        duration_ms: u64,
        failure: Option<FailureDetail>,
    ) -> Self {
        Self {
            name: spec.name.clone(),
            service: spec.service,
            command: spec.command_line(),
            status,
            duration_ms,
            failure,
        }
    }
}

/// Aggregate result of a run.
///
/// `passed + failed + skipped` always equals `outcomes.len()`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub region: String,
    /// Principal the checks ran as, when `--identity` resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_arn: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<CheckOutcome>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            region: region.into(),
            caller_arn: None,
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
            passed: 0,
            failed: 0,
            skipped: 0,
        }
    }

    /// Append an outcome, bumping exactly one counter.
    pub fn record(&mut self, outcome: CheckOutcome) {
        match outcome.status {
            CheckStatus::Pass => self.passed += 1,
            CheckStatus::Fail => self.failed += 1,
            CheckStatus::Skip => self.skipped += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// `0` when nothing failed, `1` otherwise. Skips never fail a run.
    pub fn exit_code(&self) -> u8 {
        if self.all_passed() { 0 } else { 1 }
    }

    #[cfg(test)]
    pub fn outcome(&self, name: &str) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}
