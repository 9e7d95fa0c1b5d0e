use anyhow::{Context, Result};
use herald_cli::Cli;
use herald_core::ChannelName;
use herald_github::GithubApiClient;
use herald_runtime::{DispatchOutcome, DispatcherConfig, EventContext, EventDispatcher};
use herald_slack::SlackApiClient;
use tracing::info;

pub(crate) fn dispatcher_config(cli: &Cli) -> DispatcherConfig {
    DispatcherConfig {
        channel_prefix: cli.channel_prefix.clone(),
        invite_user_ids: cli.invite_user_ids(),
        private_channels: cli.private_channels,
        staging_channel: ChannelName::fixed(&cli.staging_channel),
        production_channel: ChannelName::fixed(&cli.production_channel),
        commit_page_size: cli.commit_page_size,
        channel_page_size: cli.channel_page_size,
        require_deploy_marker: cli.require_deploy_marker,
    }
}

/// Builds both API clients and the event context, then dispatches once.
pub(crate) async fn run_cli(cli: Cli) -> Result<DispatchOutcome> {
    cli.validate()?;
    let retry = cli.retry_policy();
    let github = GithubApiClient::new(
        cli.github_api_base.clone(),
        cli.github_token.clone(),
        cli.request_timeout_ms,
        retry,
    )?;
    let slack = SlackApiClient::new(
        cli.slack_api_base.clone(),
        cli.bot_oauth_secret.clone(),
        cli.request_timeout_ms,
        retry,
    )?;
    let context = EventContext::load(&cli.repository, cli.sha.clone(), &cli.event_path)?;

    let action_type = cli.action_type.trim().to_string();
    info!(kind = %action_type, repo = %context.repo.as_slug(), "starting herald run");
    let dispatcher = EventDispatcher::new(dispatcher_config(&cli), context, &github, &slack);
    dispatcher
        .dispatch(&action_type)
        .await
        .with_context(|| format!("failed to handle {action_type}"))
}
