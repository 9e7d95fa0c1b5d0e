//! Trait contracts for the issue tracker and chat service collaborators.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::channel_naming::ChannelName;
use crate::event_model::{CommitRecord, PullRequestRef, RepoRef};
use crate::notification_format::Message;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Chat channel as known to the chat directory; `id` is the identity.
pub struct Channel {
    pub id: String,
    pub name: String,
    /// `None` when the service did not report archive state.
    pub is_archived: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPage {
    pub channels: Vec<Channel>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel_id: String,
    pub ts: String,
}

#[derive(Debug, Error)]
/// Enumerates supported `ChatServiceError` values.
pub enum ChatServiceError {
    #[error("channel name '{name}' is already taken")]
    NameTaken { name: String },
    #[error("chat api {method} failed: {code}")]
    Api { method: String, code: String },
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

impl ChatServiceError {
    pub fn api(method: &str, code: impl Into<String>) -> Self {
        Self::Api {
            method: method.to_string(),
            code: code.into(),
        }
    }

    /// Error code reported by the chat service, if the failure came from it.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code.as_str()),
            Self::NameTaken { .. } => Some("name_taken"),
            Self::Request(_) => None,
        }
    }
}

#[async_trait]
/// Trait contract for `IssueTracker` behavior.
pub trait IssueTracker: Send + Sync {
    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> Result<PullRequestRef>;

    async fn add_labels(&self, repo: &RepoRef, issue_number: u64, labels: &[String])
        -> Result<()>;

    /// Most recent commits reachable from `git_ref`, in the tracker's order.
    async fn list_commits(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        per_page: usize,
    ) -> Result<Vec<CommitRecord>>;
}

#[async_trait]
/// Trait contract for `ChatService` behavior.
pub trait ChatService: Send + Sync {
    async fn list_channels(
        &self,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ChannelPage, ChatServiceError>;

    async fn create_channel(
        &self,
        name: &ChannelName,
        is_private: bool,
    ) -> Result<Channel, ChatServiceError>;

    async fn invite_members(
        &self,
        channel_id: &str,
        user_ids: &[String],
    ) -> Result<(), ChatServiceError>;

    async fn archive_channel(&self, channel_id: &str) -> Result<(), ChatServiceError>;

    async fn unarchive_channel(&self, channel_id: &str) -> Result<(), ChatServiceError>;

    async fn post_message(
        &self,
        channel_id: &str,
        message: &Message,
    ) -> Result<PostedMessage, ChatServiceError>;
}
