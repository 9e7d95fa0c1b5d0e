//! Single entry point mapping one action event onto chat and tracker calls.
//!
//! Each event kind runs exactly one fixed sequence. The first fatal failure
//! aborts the rest of the sequence; only invite failures are tolerated.

use anyhow::Context;
use herald_core::{
    deploy_digest_message, extract_commit_window_from_page, name_for_pull_request,
    pr_opened_message, review_message, ChannelDirectory, ChannelDirectoryError, ChannelName,
    ChatService, DeployEnvironment, DeployPayload, Event, EventKind, EventPayloadError,
    InviteReport, IssueTracker, PullRequestRef, ReviewPayload, UnknownEventKind, WindowBoundary,
    DEFAULT_CHANNEL_PAGE_SIZE, DEFAULT_CHANNEL_PREFIX, DEFAULT_COMMIT_PAGE_SIZE,
    DEFAULT_PRODUCTION_CHANNEL, DEFAULT_STAGING_CHANNEL,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::event_context::EventContext;


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub channel_prefix: String,
    pub invite_user_ids: Vec<String>,
    pub private_channels: bool,
    pub staging_channel: ChannelName,
    pub production_channel: ChannelName,
    pub commit_page_size: usize,
    pub channel_page_size: usize,
    /// Fail deploy events whose previous marker is outside the fetched page.
    pub require_deploy_marker: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
            invite_user_ids: Vec::new(),
            private_channels: false,
            staging_channel: ChannelName::fixed(DEFAULT_STAGING_CHANNEL),
            production_channel: ChannelName::fixed(DEFAULT_PRODUCTION_CHANNEL),
            commit_page_size: DEFAULT_COMMIT_PAGE_SIZE,
            channel_page_size: DEFAULT_CHANNEL_PAGE_SIZE,
            require_deploy_marker: false,
        }
    }
}

impl DispatcherConfig {
    fn deploy_channel(&self, environment: DeployEnvironment) -> &ChannelName {
        match environment {
            DeployEnvironment::Staging => &self.staging_channel,
            DeployEnvironment::Production => &self.production_channel,
        }
    }
}

#[derive(Debug, Error)]
/// Enumerates supported `DispatchError` values.
pub enum DispatchError {
    #[error(transparent)]
    UnknownEventKind(#[from] UnknownEventKind),
    #[error(transparent)]
    Payload(#[from] EventPayloadError),
    #[error(transparent)]
    Tracker(#[from] anyhow::Error),
    #[error(transparent)]
    Directory(#[from] ChannelDirectoryError),
    #[error("channel '{name}' was not found")]
    ChannelNotFound { name: String },
    #[error("no previous {environment} deploy marker within the last {scanned} commits")]
    DeployMarkerNotFound {
        environment: DeployEnvironment,
        scanned: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// What a successful dispatch did, for the host to report.
pub struct DispatchOutcome {
    pub kind: EventKind,
    pub channel_name: ChannelName,
    pub channel_id: Option<String>,
    pub posted_ts: Option<String>,
    pub invites: Option<InviteReport>,
    pub window_boundary: Option<WindowBoundary>,
}

impl DispatchOutcome {
    fn new(kind: EventKind, channel_name: ChannelName) -> Self {
        Self {
            kind,
            channel_name,
            channel_id: None,
            posted_ts: None,
            invites: None,
            window_boundary: None,
        }
    }
}

pub struct EventDispatcher<'a> {
    config: DispatcherConfig,
    context: EventContext,
    tracker: &'a dyn IssueTracker,
    chat: &'a dyn ChatService,
}

impl<'a> EventDispatcher<'a> {
    pub fn new(
        config: DispatcherConfig,
        context: EventContext,
        tracker: &'a dyn IssueTracker,
        chat: &'a dyn ChatService,
    ) -> Self {
        Self {
            config,
            context,
            tracker,
            chat,
        }
    }

    fn directory(&self) -> ChannelDirectory<'a> {
        ChannelDirectory::new(self.chat).with_page_size(self.config.channel_page_size)
    }

    /// Validates the raw kind before any collaborator call, then runs it.
    pub async fn dispatch(&self, raw_kind: &str) -> Result<DispatchOutcome, DispatchError> {
        let kind = raw_kind.parse::<EventKind>()?;
        let event = Event::from_payload(kind, &self.context.payload, self.context.sha.as_deref())?;
        self.run(event).await
    }

    pub async fn run(&self, event: Event) -> Result<DispatchOutcome, DispatchError> {
        info!(kind = %event.kind(), repo = %self.context.repo.as_slug(), "dispatching event");
        match event {
            Event::PullRequestOpened(payload) => self.pull_request_opened(payload.number).await,
            Event::PullRequestClosed(payload) => self.pull_request_closed(payload.number).await,
            Event::PullRequestReviewed(payload) => self.pull_request_reviewed(payload).await,
            Event::DeployStaging(payload) => {
                self.deployed(EventKind::DeployStaging, DeployEnvironment::Staging, payload)
                    .await
            }
            Event::DeployProduction(payload) => {
                self.deployed(
                    EventKind::DeployProduction,
                    DeployEnvironment::Production,
                    payload,
                )
                .await
            }
        }
    }

    async fn pull_request_channel(
        &self,
        number: u64,
    ) -> Result<(PullRequestRef, ChannelName), DispatchError> {
        let pull_request = self
            .tracker
            .get_pull_request(&self.context.repo, number)
            .await
            .with_context(|| format!("failed to fetch pull request #{number}"))?;
        let name = name_for_pull_request(&self.config.channel_prefix, &pull_request);
        Ok((pull_request, name))
    }

    async fn require_channel(&self, name: &ChannelName) -> Result<String, DispatchError> {
        self.directory()
            .find_by_name(name)
            .await?
            .map(|channel| channel.id)
            .ok_or_else(|| DispatchError::ChannelNotFound {
                name: name.to_string(),
            })
    }

    async fn pull_request_opened(&self, number: u64) -> Result<DispatchOutcome, DispatchError> {
        let (pull_request, name) = self.pull_request_channel(number).await?;
        self.tracker
            .add_labels(&self.context.repo, number, &[number.to_string()])
            .await
            .with_context(|| format!("failed to label pull request #{number}"))?;

        let directory = self.directory();
        let channel = directory
            .create_or_recover(&name, self.config.private_channels)
            .await?;
        let invites = directory
            .invite(&channel.id, &self.config.invite_user_ids)
            .await;
        if !invites.is_clean() {
            warn!(
                channel = %name,
                failed = invites.failed.len(),
                "some users could not be invited"
            );
        }
        let posted = directory
            .post(
                &channel.id,
                &pr_opened_message(&pull_request.repo_full_name(), number),
            )
            .await?;
        info!(channel = %name, channel_id = %channel.id, "pull request channel ready");

        let mut outcome = DispatchOutcome::new(EventKind::PullRequestOpen, name);
        outcome.channel_id = Some(channel.id);
        outcome.posted_ts = Some(posted.ts);
        outcome.invites = Some(invites);
        Ok(outcome)
    }

    async fn pull_request_closed(&self, number: u64) -> Result<DispatchOutcome, DispatchError> {
        let (_, name) = self.pull_request_channel(number).await?;
        let channel_id = self.require_channel(&name).await?;
        self.directory().archive(&channel_id).await?;
        info!(channel = %name, channel_id = %channel_id, "archived pull request channel");

        let mut outcome = DispatchOutcome::new(EventKind::PullRequestClosed, name);
        outcome.channel_id = Some(channel_id);
        Ok(outcome)
    }

    async fn pull_request_reviewed(
        &self,
        payload: ReviewPayload,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (_, name) = self
            .pull_request_channel(payload.pull_request_number)
            .await?;
        let channel_id = self.require_channel(&name).await?;
        let posted = self
            .directory()
            .post(&channel_id, &review_message(&payload.review))
            .await?;
        info!(
            channel = %name,
            state = payload.review.state.as_str(),
            reviewer = %payload.review.reviewer_login,
            "posted review notification"
        );

        let mut outcome = DispatchOutcome::new(EventKind::PullRequestReviewed, name);
        outcome.channel_id = Some(channel_id);
        outcome.posted_ts = Some(posted.ts);
        Ok(outcome)
    }

    async fn deployed(
        &self,
        kind: EventKind,
        environment: DeployEnvironment,
        payload: DeployPayload,
    ) -> Result<DispatchOutcome, DispatchError> {
        let commits = self
            .tracker
            .list_commits(
                &self.context.repo,
                &payload.git_ref,
                self.config.commit_page_size,
            )
            .await
            .with_context(|| format!("failed to list commits for {}", payload.git_ref))?;
        let window =
            extract_commit_window_from_page(&commits, environment, self.config.commit_page_size);
        match window.boundary {
            WindowBoundary::Open { scanned } => {
                if self.config.require_deploy_marker {
                    return Err(DispatchError::DeployMarkerNotFound {
                        environment,
                        scanned,
                    });
                }
                warn!(
                    environment = %environment,
                    scanned,
                    "previous deploy marker not found; digest may be incomplete"
                );
            }
            WindowBoundary::HistoryStart { scanned } => {
                info!(environment = %environment, scanned, "first deploy; reporting full history");
            }
            WindowBoundary::Marker { .. } => {}
        }
        let digest = window.digest();
        info!(
            environment = %environment,
            commits = digest.feature_messages.len(),
            actions = digest.action_messages.len(),
            "built deploy digest"
        );

        let name = self.config.deploy_channel(environment).clone();
        let channel_id = self.require_channel(&name).await?;
        let posted = self
            .directory()
            .post(&channel_id, &deploy_digest_message(&window))
            .await?;

        let mut outcome = DispatchOutcome::new(kind, name);
        outcome.channel_id = Some(channel_id);
        outcome.posted_ts = Some(posted.ts);
        outcome.window_boundary = Some(window.boundary);
        Ok(outcome)
    }
}
