//! Event-to-action mapping core for the Herald pull-request chat bridge.
//!
//! Provides channel naming, paginated channel directory operations, deploy
//! commit window extraction and notification formatting, plus the trait
//! contracts the GitHub and Slack clients implement.

pub mod channel_directory;
pub mod channel_naming;
pub mod collaborators;
pub mod commit_window;
pub mod event_model;
pub mod notification_format;
pub mod retry_policy;

pub use channel_directory::{
    ChannelDirectory, ChannelDirectoryError, InviteFailure, InviteReport,
    DEFAULT_CHANNEL_PAGE_SIZE,
};
pub use channel_naming::{
    name_for, name_for_pull_request, slugify, ChannelName, DEFAULT_CHANNEL_PREFIX,
};
pub use collaborators::{
    Channel, ChannelPage, ChatService, ChatServiceError, IssueTracker, PostedMessage,
};
pub use commit_window::{
    extract_commit_window, extract_commit_window_from_page, CommitWindow, DeployDigest,
    DeployEnvironment, WindowBoundary, DEFAULT_PRODUCTION_CHANNEL, DEFAULT_STAGING_CHANNEL,
    DEFAULT_COMMIT_PAGE_SIZE,
};
pub use event_model::{
    CommitRecord, DeployPayload, Event, EventKind, EventPayloadError, PullRequestPayload,
    PullRequestRef, RepoRef, ReviewEvent, ReviewPayload, ReviewState, UnknownEventKind,
};
pub use notification_format::{
    deploy_digest_message, pr_opened_message, review_message, Block, Message,
    ACTION_REQUIRED_HEADER,
};
pub use retry_policy::RetryPolicy;
