use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use herald_core::{
    RetryPolicy, DEFAULT_CHANNEL_PAGE_SIZE, DEFAULT_CHANNEL_PREFIX, DEFAULT_COMMIT_PAGE_SIZE,
    DEFAULT_PRODUCTION_CHANNEL, DEFAULT_STAGING_CHANNEL,
};
use herald_github::DEFAULT_GITHUB_API_BASE;
use herald_slack::DEFAULT_SLACK_API_BASE;

const MAX_COMMIT_PAGE_SIZE: usize = 100;
const MAX_CHANNEL_PAGE_SIZE: usize = 1_000;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_bounded_usize(value: &str, max: usize) -> Result<usize, String> {
    let parsed = parse_positive_usize(value)?;
    if parsed > max {
        return Err(format!("value must be in range 1..={max}"));
    }
    Ok(parsed)
}

fn parse_commit_page_size(value: &str) -> Result<usize, String> {
    parse_bounded_usize(value, MAX_COMMIT_PAGE_SIZE)
}

fn parse_channel_page_size(value: &str) -> Result<usize, String> {
    parse_bounded_usize(value, MAX_CHANNEL_PAGE_SIZE)
}

/// Splits the invite list input; users may separate ids with spaces,
/// newlines or commas.
pub fn parse_slack_user_ids(raw: &str) -> Vec<String> {
    raw.split(|ch: char| ch.is_whitespace() || ch == ',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Parser)]
#[command(
    name = "herald",
    about = "Bridge pull request and deploy events into Slack channels",
    version
)]
/// Public struct `Cli` used across Herald components.
pub struct Cli {
    #[arg(
        long = "action-type",
        env = "INPUT_ACTION-TYPE",
        help = "Event kind to handle: PR_OPEN, PR_CLOSED, PR_REVIEWED, DEPLOY_STAGING or DEPLOY_PRODUCTION"
    )]
    pub action_type: String,

    #[arg(
        long = "github-token",
        env = "INPUT_GITHUB-TOKEN",
        hide_env_values = true,
        help = "Token used for GitHub REST calls"
    )]
    pub github_token: String,

    #[arg(
        long = "bot-oauth-secret",
        env = "INPUT_BOT-OAUTH-SECRET",
        hide_env_values = true,
        help = "Slack bot OAuth token"
    )]
    pub bot_oauth_secret: String,

    #[arg(
        long = "slack-user-ids",
        env = "INPUT_SLACK-USER-IDS",
        default_value = "",
        help = "Slack user ids invited to new pull request channels, separated by spaces or commas"
    )]
    pub slack_user_ids: String,

    #[arg(
        long = "channel-prefix",
        env = "INPUT_CHANNEL_PREFIX",
        default_value = DEFAULT_CHANNEL_PREFIX,
        help = "Prefix of derived pull request channel names"
    )]
    pub channel_prefix: String,

    #[arg(
        long = "private-channels",
        env = "INPUT_PRIVATE-CHANNELS",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Create pull request channels as private channels"
    )]
    pub private_channels: bool,

    #[arg(
        long = "staging-channel",
        env = "INPUT_STAGING-CHANNEL",
        default_value = DEFAULT_STAGING_CHANNEL,
        help = "Channel receiving staging deploy digests"
    )]
    pub staging_channel: String,

    #[arg(
        long = "production-channel",
        env = "INPUT_PRODUCTION-CHANNEL",
        default_value = DEFAULT_PRODUCTION_CHANNEL,
        help = "Channel receiving production deploy digests"
    )]
    pub production_channel: String,

    #[arg(
        long = "commit-page-size",
        env = "INPUT_COMMIT-PAGE-SIZE",
        default_value_t = DEFAULT_COMMIT_PAGE_SIZE,
        value_parser = parse_commit_page_size,
        help = "Commits fetched when searching for the previous deploy marker (1..=100)"
    )]
    pub commit_page_size: usize,

    #[arg(
        long = "channel-page-size",
        env = "INPUT_CHANNEL-PAGE-SIZE",
        default_value_t = DEFAULT_CHANNEL_PAGE_SIZE,
        value_parser = parse_channel_page_size,
        help = "Channels requested per directory page (1..=1000)"
    )]
    pub channel_page_size: usize,

    #[arg(
        long = "require-deploy-marker",
        env = "INPUT_REQUIRE-DEPLOY-MARKER",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Fail deploy events when the previous deploy marker is not within the fetched commits"
    )]
    pub require_deploy_marker: bool,

    #[arg(
        long = "github-api-base",
        env = "GITHUB_API_URL",
        default_value = DEFAULT_GITHUB_API_BASE,
        help = "Base URL for the GitHub REST API"
    )]
    pub github_api_base: String,

    #[arg(
        long = "slack-api-base",
        env = "INPUT_SLACK-API-BASE",
        default_value = DEFAULT_SLACK_API_BASE,
        help = "Base URL for the Slack Web API"
    )]
    pub slack_api_base: String,

    #[arg(
        long,
        env = "GITHUB_REPOSITORY",
        help = "Repository in owner/name format"
    )]
    pub repository: String,

    #[arg(long, env = "GITHUB_SHA", help = "Commit that triggered the workflow")]
    pub sha: Option<String>,

    #[arg(
        long = "event-path",
        env = "GITHUB_EVENT_PATH",
        help = "Path to the webhook payload JSON"
    )]
    pub event_path: PathBuf,

    #[arg(
        long = "output-path",
        env = "GITHUB_OUTPUT",
        help = "Step output file; outputs are printed as workflow commands when unset"
    )]
    pub output_path: Option<PathBuf>,

    #[arg(
        long = "request-timeout-ms",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Timeout for each HTTP request"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Attempts per HTTP call, including the first"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay for exponential retry backoff"
    )]
    pub retry_base_delay_ms: u64,
}

impl Cli {
    pub fn invite_user_ids(&self) -> Vec<String> {
        parse_slack_user_ids(&self.slack_user_ids)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, self.retry_base_delay_ms)
    }

    /// Rejects blank credentials and channel names before any network call.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("--action-type", self.action_type.as_str()),
            ("--github-token", self.github_token.as_str()),
            ("--bot-oauth-secret", self.bot_oauth_secret.as_str()),
            ("--staging-channel", self.staging_channel.as_str()),
            ("--production-channel", self.production_channel.as_str()),
        ];
        for (flag, value) in required {
            if value.trim().is_empty() {
                bail!("{flag} must not be empty");
            }
        }
        Ok(())
    }
}
