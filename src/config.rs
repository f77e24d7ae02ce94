use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, time::Duration};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_ECR_REPOSITORY: &str = "busyb-google-workspace-mcp";
pub const DEFAULT_SECRET_IDS: [&str; 3] = [
    "busyb/google-oauth-client-id",
    "busyb/google-oauth-client-secret",
    "busyb/google-oauth-redirect-uri",
];
pub const DEFAULT_BUCKET: &str = "busyb-oauth-tokens-758888582357";
pub const DEFAULT_LOG_GROUP: &str = "/ecs/busyb-google-workspace-mcp";
pub const DEFAULT_CLUSTER: &str = "busyb-cluster";
pub const DEFAULT_ROLE_NAMES: [&str; 3] = [
    "ecsTaskExecutionRole",
    "busyb-google-workspace-mcp-task-role",
    "busyb-github-actions-deploy-role",
];

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub region: String,
    pub profile: Option<String>,
    pub aws_bin: String,
    pub ecr_repository: String,
    pub secret_ids: Vec<String>,
    pub bucket: String,
    pub log_group: String,
    pub cluster: String,
    pub role_names: Vec<String>,
    pub timeout: Option<Duration>,
    pub format: OutputFormat,
    pub color: ColorChoice,
    pub no_color_env: bool,
    pub skip_s3_write: bool,
    pub list_only: bool,
    pub show_identity: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Smoke-test AWS credentials against the MCP deployment resources"
)]
pub struct Args {
    /// AWS region (overrides CREDCHECK_REGION / AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// AWS CLI profile (overrides CREDCHECK_PROFILE)
    #[arg(long)]
    pub profile: Option<String>,

    /// Path to the aws executable (overrides CREDCHECK_AWS_BIN)
    #[arg(long)]
    pub aws_bin: Option<String>,

    /// ECR repository name (overrides CREDCHECK_ECR_REPOSITORY)
    #[arg(long)]
    pub ecr_repository: Option<String>,

    /// Comma-separated Secrets Manager ids (overrides CREDCHECK_SECRET_IDS)
    #[arg(long, value_delimiter = ',')]
    pub secret_ids: Option<Vec<String>>,

    /// S3 bucket used for the list and write tests (overrides CREDCHECK_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// CloudWatch log group (overrides CREDCHECK_LOG_GROUP)
    #[arg(long)]
    pub log_group: Option<String>,

    /// ECS cluster name (overrides CREDCHECK_CLUSTER)
    #[arg(long)]
    pub cluster: Option<String>,

    /// Comma-separated IAM role names (overrides CREDCHECK_ROLE_NAMES)
    #[arg(long, value_delimiter = ',')]
    pub role_names: Option<Vec<String>>,

    /// Per-check timeout in seconds (overrides CREDCHECK_TIMEOUT_SECS)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// When to color the text report
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Skip the S3 upload/delete round trip
    #[arg(long)]
    pub skip_s3_write: bool,

    /// Print the planned checks and exit
    #[arg(long)]
    pub list: bool,

    /// Print the caller identity before running checks
    #[arg(long)]
    pub identity: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        Self::resolve(args, |key| env::var(key).ok())
    }

    /// Merge parsed args over values from `lookup`, then built-in defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Environment fallback ---
        let env_region = lookup("CREDCHECK_REGION")
            .or_else(|| lookup("AWS_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.into());
        let env_timeout = match lookup("CREDCHECK_TIMEOUT_SECS") {
            Some(value) => Some(
                value
                    .parse::<u64>()
                    .with_context(|| format!("parsing CREDCHECK_TIMEOUT_SECS value `{}`", value))?,
            ),
            None => None,
        };
        let env_secret_ids = lookup("CREDCHECK_SECRET_IDS").map(|v| split_list(&v));
        let env_role_names = lookup("CREDCHECK_ROLE_NAMES").map(|v| split_list(&v));

        // --- Merge ---
        let mut cfg = Self {
            region: args.region.unwrap_or(env_region),
            profile: args.profile.or_else(|| lookup("CREDCHECK_PROFILE")),
            aws_bin: args
                .aws_bin
                .or_else(|| lookup("CREDCHECK_AWS_BIN"))
                .unwrap_or_else(|| "aws".into()),
            ecr_repository: args
                .ecr_repository
                .or_else(|| lookup("CREDCHECK_ECR_REPOSITORY"))
                .unwrap_or_else(|| DEFAULT_ECR_REPOSITORY.into()),
            secret_ids: args
                .secret_ids
                .or(env_secret_ids)
                .unwrap_or_else(|| DEFAULT_SECRET_IDS.map(String::from).to_vec()),
            bucket: args
                .bucket
                .or_else(|| lookup("CREDCHECK_BUCKET"))
                .unwrap_or_else(|| DEFAULT_BUCKET.into()),
            log_group: args
                .log_group
                .or_else(|| lookup("CREDCHECK_LOG_GROUP"))
                .unwrap_or_else(|| DEFAULT_LOG_GROUP.into()),
            cluster: args
                .cluster
                .or_else(|| lookup("CREDCHECK_CLUSTER"))
                .unwrap_or_else(|| DEFAULT_CLUSTER.into()),
            role_names: args
                .role_names
                .or(env_role_names)
                .unwrap_or_else(|| DEFAULT_ROLE_NAMES.map(String::from).to_vec()),
            timeout: args.timeout_secs.or(env_timeout).map(Duration::from_secs),
            format: args.format,
            color: args.color,
            no_color_env: lookup("NO_COLOR").is_some_and(|v| !v.is_empty()),
            skip_s3_write: args.skip_s3_write,
            list_only: args.list,
            show_identity: args.identity,
        };

        cfg.secret_ids.retain(|s| !s.trim().is_empty());
        cfg.role_names.retain(|s| !s.trim().is_empty());
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.secret_ids.is_empty() {
            anyhow::bail!("at least one secret id is required");
        }
        if self.role_names.is_empty() {
            anyhow::bail!("at least one IAM role name is required");
        }
        let required = [
            ("region", &self.region),
            ("aws binary", &self.aws_bin),
            ("ECR repository", &self.ecr_repository),
            ("bucket name", &self.bucket),
            ("log group", &self.log_group),
            ("cluster", &self.cluster),
        ];
        for (what, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("{what} must not be empty");
            }
        }
        if self.profile.as_deref().is_some_and(|p| p.trim().is_empty()) {
            anyhow::bail!("profile must not be empty when given");
        }
        if self.timeout == Some(Duration::ZERO) {
            anyhow::bail!("timeout must be at least one second");
        }
        Ok(())
    }

    /// Whether the text report should carry ANSI colors.
    pub fn use_colors(&self, is_terminal: bool) -> bool {
        match self.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => is_terminal && !self.no_color_env,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
