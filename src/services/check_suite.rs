//! CheckSuite — the ordered set of credential checks and the loop that runs
//! them.
//!
//! Every check is independent: a failure is recorded and the run moves on.
//! The only cross-check coupling is the S3 round trip, where the write check
//! needs a staged local file and the delete check always follows it so the
//! bucket is left as it was found.

use crate::{
    config::AppConfig,
    errors::FailureKind,
    models::{
        check::{CheckSpec, Service},
        outcome::{CheckOutcome, CheckStatus, FailureDetail, RunSummary},
    },
    report::Reporter,
    services::{aws_cli::AwsCli, s3_probe::S3Probe},
};
use std::{io, time::Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Plain,
    S3Upload,
    S3Delete,
}

#[derive(Debug, Clone)]
struct PlannedCheck {
    spec: CheckSpec,
    step: Step,
}

/// Build the ordered check plan for `cfg`.
///
/// With the default configuration this yields twelve checks.
fn build_plan(cfg: &AppConfig, probe: &S3Probe) -> Vec<PlannedCheck> {
    let plain = |spec: CheckSpec| PlannedCheck {
        spec,
        step: Step::Plain,
    };
    let mut plan = Vec::new();

    plan.push(plain(CheckSpec::read_only(
        "ECR repository access",
        Service::Ecr,
        [
            "ecr",
            "describe-repositories",
            "--repository-names",
            cfg.ecr_repository.as_str(),
        ],
    )));

    // `--query Name` keeps secret material out of captured output.
    for secret_id in &cfg.secret_ids {
        plan.push(plain(CheckSpec::read_only(
            format!("Secrets Manager: {}", secret_id),
            Service::SecretsManager,
            [
                "secretsmanager",
                "get-secret-value",
                "--secret-id",
                secret_id.as_str(),
                "--query",
                "Name",
                "--output",
                "text",
            ],
        )));
    }

    let bucket_uri = format!("s3://{}", cfg.bucket);
    let object_uri = probe.object_uri(&cfg.bucket);
    let local_path = probe.local_path.to_string_lossy().into_owned();

    plan.push(plain(CheckSpec::read_only(
        "S3 bucket list",
        Service::S3,
        ["s3", "ls", bucket_uri.as_str()],
    )));
    plan.push(PlannedCheck {
        spec: CheckSpec::mutating(
            "S3 write",
            Service::S3,
            ["s3", "cp", local_path.as_str(), object_uri.as_str()],
        ),
        step: Step::S3Upload,
    });
    plan.push(PlannedCheck {
        spec: CheckSpec::mutating("S3 delete", Service::S3, ["s3", "rm", object_uri.as_str()]),
        step: Step::S3Delete,
    });

    plan.push(plain(CheckSpec::read_only(
        "CloudWatch log group",
        Service::CloudWatchLogs,
        [
            "logs",
            "describe-log-groups",
            "--log-group-name-prefix",
            cfg.log_group.as_str(),
        ],
    )));
    plan.push(plain(CheckSpec::read_only(
        "ECS cluster",
        Service::Ecs,
        ["ecs", "describe-clusters", "--clusters", cfg.cluster.as_str()],
    )));

    for role in &cfg.role_names {
        plan.push(plain(CheckSpec::read_only(
            format!("IAM role: {}", role),
            Service::Iam,
            ["iam", "get-role", "--role-name", role.as_str()],
        )));
    }

    plan
}

/// Runs the plan sequentially against an [`AwsCli`].
pub struct CheckSuite<C> {
    cli: C,
    plan: Vec<PlannedCheck>,
    probe: S3Probe,
    bucket: String,
    region: String,
    skip_s3_write: bool,
    caller_arn: Option<String>,
    // Owns the private staging directory; removed on drop.
    _staging_dir: Option<TempDir>,
}

impl<C: AwsCli> CheckSuite<C> {
    /// Suite for `cfg`, staging the S3 probe in a fresh directory only this
    /// process can write to.
    pub fn new(cli: C, cfg: &AppConfig) -> io::Result<Self> {
        let staging_dir = tempfile::Builder::new()
            .prefix("aws-credential-check-")
            .tempdir()?;
        let probe = S3Probe::for_process(staging_dir.path());
        let mut suite = Self::with_probe(cli, cfg, probe);
        suite._staging_dir = Some(staging_dir);
        Ok(suite)
    }

    pub fn with_probe(cli: C, cfg: &AppConfig, probe: S3Probe) -> Self {
        Self {
            plan: build_plan(cfg, &probe),
            cli,
            probe,
            bucket: cfg.bucket.clone(),
            region: cfg.region.clone(),
            skip_s3_write: cfg.skip_s3_write,
            caller_arn: None,
            _staging_dir: None,
        }
    }

    /// Principal the run is authenticated as, carried into the summary.
    pub fn set_caller_arn(&mut self, arn: Option<String>) {
        self.caller_arn = arn;
    }

    pub fn checks(&self) -> impl Iterator<Item = &CheckSpec> {
        self.plan.iter().map(|p| &p.spec)
    }

    /// Execute every check in order and return the tallied summary.
    ///
    /// The local probe file is removed before returning, including when the
    /// reporter fails part-way.
    pub async fn run(&self, reporter: &mut dyn Reporter) -> io::Result<RunSummary> {
        let mut summary = RunSummary::new(&self.region);
        summary.caller_arn = self.caller_arn.clone();
        let result = self.run_checks(reporter, &mut summary).await;
        if !self.skip_s3_write {
            self.probe.cleanup().await;
        }
        result?;

        summary.finish();
        info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "credential check finished"
        );
        reporter.finish(&summary)?;
        Ok(summary)
    }

    async fn run_checks(
        &self,
        reporter: &mut dyn Reporter,
        summary: &mut RunSummary,
    ) -> io::Result<()> {
        reporter.start(summary)?;

        let mut upload_passed = false;
        for planned in &self.plan {
            let spec = &planned.spec;
            reporter.check_started(spec)?;

            let outcome = match planned.step {
                Step::S3Upload | Step::S3Delete if self.skip_s3_write => {
                    debug!(check = %spec.name, "skipping s3 write test");
                    CheckOutcome::skipped(spec)
                }
                Step::S3Upload => {
                    if let Err(err) = self.probe.stage().await {
                        warn!(
                            path = %self.probe.local_path.display(),
                            error = %err,
                            "could not stage probe file; upload will fail"
                        );
                    }
                    let outcome = self.execute(spec).await;
                    upload_passed = outcome.status == CheckStatus::Pass;
                    outcome
                }
                Step::S3Delete => {
                    let outcome = self.execute(spec).await;
                    if upload_passed && outcome.status == CheckStatus::Fail {
                        warn!(
                            object = %self.probe.object_uri(&self.bucket),
                            "probe object was uploaded but could not be deleted"
                        );
                    }
                    outcome
                }
                Step::Plain => self.execute(spec).await,
            };

            reporter.check_finished(&outcome)?;
            summary.record(outcome);
        }

        Ok(())
    }

    async fn execute(&self, spec: &CheckSpec) -> CheckOutcome {
        debug!(check = %spec.name, command = %spec.command_line(), "running check");
        let started = Instant::now();
        let result = self.cli.run(&spec.args).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(output) if output.success => {
                info!(check = %spec.name, duration_ms, "check passed");
                CheckOutcome::passed(spec, duration_ms)
            }
            Ok(output) => {
                let failure = FailureDetail {
                    kind: FailureKind::classify(&output.stderr),
                    exit_code: output.exit_code,
                    message: output.stderr_summary(),
                };
                warn!(
                    check = %spec.name,
                    exit_code = ?output.exit_code,
                    kind = %failure.kind,
                    "check failed"
                );
                CheckOutcome::failed(spec, duration_ms, failure)
            }
            Err(err) => {
                warn!(check = %spec.name, error = %err, "check could not run");
                let failure = FailureDetail {
                    kind: err.kind(),
                    exit_code: None,
                    message: err.to_string(),
                };
                CheckOutcome::failed(spec, duration_ms, failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Args,
        errors::{CheckError, CheckResult},
        report::TextReporter,
        services::aws_cli::CliOutput,
    };
    use async_trait::async_trait;
    use std::{
        io::Write,
        path::Path,
        sync::{Arc, Mutex},
        time::Duration,
    };

    /// In-memory CLI: fails any call with an argument equal to a registered needle.
    #[derive(Default)]
    struct ScriptedCli {
        failing: Vec<(String, String)>,
        timing_out: Vec<String>,
        calls: Mutex<Vec<Vec<String>>>,
        probe_seen: Mutex<Option<bool>>,
    }

    impl ScriptedCli {
        fn failing_on(mut self, needle: &str, stderr: &str) -> Self {
            self.failing.push((needle.to_string(), stderr.to_string()));
            self
        }

        fn timing_out_on(mut self, needle: &str) -> Self {
            self.timing_out.push(needle.to_string());
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AwsCli for ScriptedCli {
        async fn run(&self, args: &[String]) -> CheckResult<CliOutput> {
            self.calls.lock().unwrap().push(args.to_vec());

            // Record whether the staged file existed when `s3 cp` ran.
            if args.get(1).map(String::as_str) == Some("cp") {
                *self.probe_seen.lock().unwrap() = Some(Path::new(&args[2]).exists());
            }

            if self.timing_out.iter().any(|n| args.contains(n)) {
                return Err(CheckError::Timeout {
                    after: Duration::from_secs(1),
                });
            }
            for (needle, stderr) in &self.failing {
                if args.contains(needle) {
                    return Ok(CliOutput::failed(254, stderr.clone()));
                }
            }
            Ok(CliOutput::ok(""))
        }
    }

    /// Collects formatted tracing output for assertions.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + use<> {
            let writer = self.clone();
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::WARN)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish()
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn plan_checks(cfg: &AppConfig, probe: &S3Probe) -> Vec<CheckSpec> {
        build_plan(cfg, probe).into_iter().map(|p| p.spec).collect()
    }

    fn default_config() -> AppConfig {
        AppConfig::resolve(Args::default(), |_| None).unwrap()
    }

    fn suite(cli: ScriptedCli, cfg: &AppConfig, dir: &Path) -> CheckSuite<ScriptedCli> {
        CheckSuite::with_probe(cli, cfg, S3Probe::with_pid(dir, 777))
    }

    async fn run_quiet<C: AwsCli>(suite: &CheckSuite<C>) -> (RunSummary, String) {
        let mut out = Vec::new();
        let summary = {
            let mut reporter = TextReporter::new(&mut out, false);
            suite.run(&mut reporter).await.unwrap()
        };
        (summary, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_default_plan_has_twelve_checks_in_order() {
        let cfg = default_config();
        let probe = S3Probe::with_pid("/tmp", 1);
        let plan = plan_checks(&cfg, &probe);
        let services: Vec<Service> = plan.iter().map(|c| c.service).collect();
        assert_eq!(plan.len(), 12);
        assert_eq!(
            services,
            vec![
                Service::Ecr,
                Service::SecretsManager,
                Service::SecretsManager,
                Service::SecretsManager,
                Service::S3,
                Service::S3,
                Service::S3,
                Service::CloudWatchLogs,
                Service::Ecs,
                Service::Iam,
                Service::Iam,
                Service::Iam,
            ]
        );
        assert_eq!(plan.iter().filter(|c| c.mutates).count(), 2);
        assert_eq!(
            plan[0].command_line(),
            "aws ecr describe-repositories --repository-names busyb-google-workspace-mcp"
        );
        assert_eq!(
            plan[6].command_line(),
            "aws s3 rm s3://busyb-oauth-tokens-758888582357/test-cred-1.json"
        );
    }

    #[test]
    fn test_secret_checks_never_request_the_value() {
        let cfg = default_config();
        let plan = plan_checks(&cfg, &S3Probe::with_pid("/tmp", 1));
        for check in plan.iter().filter(|c| c.service == Service::SecretsManager) {
            let query = check.args.iter().position(|a| a == "--query").unwrap();
            assert_eq!(check.args[query + 1], "Name");
        }
    }

    #[tokio::test]
    async fn test_all_checks_pass() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let suite = suite(ScriptedCli::default(), &cfg, dir.path());

        let (summary, text) = run_quiet(&suite).await;

        assert_eq!(summary.passed, 12);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.exit_code(), 0);
        assert!(text.contains("Tests Passed: 12"));
        assert!(text.contains("Tests Failed: 0"));
        assert_eq!(suite.cli.calls().len(), 12);
    }

    #[tokio::test]
    async fn test_missing_ecr_repository_fails_only_that_check() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let cli = ScriptedCli::default().failing_on(
            "describe-repositories",
            "An error occurred (RepositoryNotFoundException) when calling the \
             DescribeRepositories operation: The repository does not exist",
        );
        let suite = suite(cli, &cfg, dir.path());

        let (summary, text) = run_quiet(&suite).await;

        assert_eq!(summary.passed, 11);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_code(), 1);
        let ecr = summary.outcome("ECR repository access").unwrap();
        assert_eq!(ecr.status, CheckStatus::Fail);
        assert_eq!(ecr.failure.as_ref().unwrap().kind, FailureKind::NotFound);
        assert!(text.contains("Tests Passed: 11"));
        assert!(text.contains("Tests Failed: 1"));
        // the run continued past the failure
        assert_eq!(suite.cli.calls().len(), 12);
    }

    #[tokio::test]
    async fn test_each_failure_increments_by_one() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let plan = plan_checks(&cfg, &S3Probe::with_pid(dir.path(), 777));

        for (idx, check) in plan.iter().enumerate() {
            // pick an argument that only this check carries
            let needle = match (check.service, check.args[1].as_str()) {
                (Service::SecretsManager, _) => check.args[3].clone(),
                (Service::S3, verb) => verb.to_string(),
                _ => check.args.last().unwrap().clone(),
            };
            let cli = ScriptedCli::default().failing_on(&needle, "AccessDenied");
            let suite = suite(cli, &cfg, dir.path());
            let (summary, _) = run_quiet(&suite).await;

            assert_eq!(summary.failed, 1, "check #{idx} `{}`", check.name);
            assert_eq!(summary.passed, 11, "check #{idx} `{}`", check.name);
            assert_eq!(summary.outcomes[idx].status, CheckStatus::Fail);
            assert_eq!(summary.exit_code(), 1);
        }
    }

    #[tokio::test]
    async fn test_s3_round_trip_stages_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let suite = suite(ScriptedCli::default(), &cfg, dir.path());

        let (summary, _) = run_quiet(&suite).await;

        assert_eq!(*suite.cli.probe_seen.lock().unwrap(), Some(true));
        assert!(!suite.probe.local_path.exists());
        assert_eq!(summary.outcome("S3 write").unwrap().status, CheckStatus::Pass);
        assert_eq!(summary.outcome("S3 delete").unwrap().status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn test_delete_attempted_and_local_file_removed_when_upload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let cli = ScriptedCli::default().failing_on("cp", "upload failed: AccessDenied");
        let suite = suite(cli, &cfg, dir.path());

        let (summary, _) = run_quiet(&suite).await;

        let calls = suite.cli.calls();
        let cp = calls.iter().position(|c| c[1] == "cp").unwrap();
        let rm = calls.iter().position(|c| c[1] == "rm").unwrap();
        assert_eq!(rm, cp + 1);
        assert!(!suite.probe.local_path.exists());
        assert_eq!(summary.outcome("S3 write").unwrap().status, CheckStatus::Fail);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_failed_delete_after_upload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let cli = ScriptedCli::default().failing_on("rm", "delete failed: AccessDenied");
        let suite = suite(cli, &cfg, dir.path());

        let logs = LogCapture::default();
        let (summary, _) = {
            let _guard = tracing::subscriber::set_default(logs.subscriber());
            run_quiet(&suite).await
        };

        assert_eq!(summary.outcome("S3 write").unwrap().status, CheckStatus::Pass);
        let delete = summary.outcome("S3 delete").unwrap();
        assert_eq!(delete.status, CheckStatus::Fail);
        assert_eq!(delete.failure.as_ref().unwrap().kind, FailureKind::AccessDenied);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_code(), 1);
        assert!(!suite.probe.local_path.exists());

        let text = logs.contents();
        assert!(text.contains("probe object was uploaded but could not be deleted"));
        assert!(text.contains("s3://busyb-oauth-tokens-758888582357/test-cred-777.json"));
    }

    #[tokio::test]
    async fn test_failed_upload_does_not_warn_about_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let cli = ScriptedCli::default()
            .failing_on("cp", "AccessDenied")
            .failing_on("rm", "AccessDenied");
        let suite = suite(cli, &cfg, dir.path());

        let logs = LogCapture::default();
        let (summary, _) = {
            let _guard = tracing::subscriber::set_default(logs.subscriber());
            run_quiet(&suite).await
        };

        assert_eq!(summary.failed, 2);
        assert!(!logs.contents().contains("could not be deleted"));
    }

    #[tokio::test]
    async fn test_new_stages_in_private_dir() {
        let cfg = default_config();
        let suite = CheckSuite::new(ScriptedCli::default(), &cfg).unwrap();
        let staging = suite.probe.local_path.parent().unwrap().to_path_buf();

        assert_ne!(staging, std::env::temp_dir());
        assert!(staging.is_dir());
        assert_eq!(suite.probe.key, format!("test-cred-{}.json", std::process::id()));

        let (summary, _) = run_quiet(&suite).await;
        assert_eq!(summary.passed, 12);
        assert_eq!(*suite.cli.probe_seen.lock().unwrap(), Some(true));

        drop(suite);
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_caller_arn_carried_into_summary() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let mut suite = suite(ScriptedCli::default(), &cfg, dir.path());
        suite.set_caller_arn(Some("arn:aws:iam::1:user/ci".into()));

        let (summary, text) = run_quiet(&suite).await;

        assert_eq!(summary.caller_arn.as_deref(), Some("arn:aws:iam::1:user/ci"));
        assert!(text.contains("Caller identity: arn:aws:iam::1:user/ci"));
    }

    #[tokio::test]
    async fn test_skip_s3_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = default_config();
        cfg.skip_s3_write = true;
        let suite = suite(ScriptedCli::default(), &cfg, dir.path());

        let (summary, text) = run_quiet(&suite).await;

        assert_eq!(summary.passed, 10);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.exit_code(), 0);
        assert!(text.contains("Tests Skipped: 2"));
        assert!(suite.cli.calls().iter().all(|c| c[1] != "cp" && c[1] != "rm"));
        assert!(suite.cli.probe_seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_runner_errors_count_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let cli = ScriptedCli::default().timing_out_on("describe-clusters");
        let suite = suite(cli, &cfg, dir.path());

        let (summary, _) = run_quiet(&suite).await;

        let ecs = summary.outcome("ECS cluster").unwrap();
        assert_eq!(ecs.status, CheckStatus::Fail);
        let failure = ecs.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.exit_code, None);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_repeated_runs_agree() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = default_config();
        let cli = ScriptedCli::default().failing_on("ecsTaskExecutionRole", "NoSuchEntity");
        let suite = suite(cli, &cfg, dir.path());

        let (first, _) = run_quiet(&suite).await;
        let (second, _) = run_quiet(&suite).await;

        let statuses = |s: &RunSummary| s.outcomes.iter().map(|o| o.status).collect::<Vec<_>>();
        assert_eq!(statuses(&first), statuses(&second));
        assert_eq!(first.exit_code(), second.exit_code());
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn test_configured_lists_expand_plan() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = default_config();
        cfg.secret_ids = vec!["only/one".into()];
        cfg.role_names = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let suite = suite(ScriptedCli::default(), &cfg, dir.path());

        assert_eq!(suite.checks().count(), 1 + 1 + 3 + 2 + 4);
    }
}
