//! Channel lookup and lifecycle on top of a paginated chat directory.
//!
//! Lookup walks the directory with an explicit cursor loop and stops at the
//! first page holding the name. Creation is idempotent: a `name_taken` reply is
//! resolved by finding and unarchiving the existing channel.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::channel_naming::ChannelName;
use crate::collaborators::{Channel, ChatService, ChatServiceError, PostedMessage};
use crate::notification_format::Message;

pub const DEFAULT_CHANNEL_PAGE_SIZE: usize = 200;
pub const DEFAULT_CHANNEL_MAX_PAGES: usize = 1_000;

const ALREADY_IN_CHANNEL: &str = "already_in_channel";
const ALREADY_ARCHIVED: &str = "already_archived";
const NOT_ARCHIVED: &str = "not_archived";

#[derive(Debug, Error)]
/// Enumerates supported `ChannelDirectoryError` values.
pub enum ChannelDirectoryError {
    #[error(transparent)]
    Chat(#[from] ChatServiceError),
    #[error("channel listing returned cursor '{cursor}' twice; aborting lookup for '{name}'")]
    RepeatedCursor { name: String, cursor: String },
    #[error("channel lookup for '{name}' exceeded {max_pages} pages")]
    PageLimitExceeded { name: String, max_pages: usize },
    #[error("channel '{name}' is taken but was not found in the directory")]
    TakenButMissing { name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Outcome of a best-effort invite pass.
pub struct InviteReport {
    pub invited: Vec<String>,
    pub already_member: Vec<String>,
    pub failed: Vec<InviteFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteFailure {
    pub user_id: String,
    pub reason: String,
}

impl InviteReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ChannelDirectory<'a> {
    chat: &'a dyn ChatService,
    page_size: usize,
    max_pages: usize,
}

impl<'a> ChannelDirectory<'a> {
    pub fn new(chat: &'a dyn ChatService) -> Self {
        Self {
            chat,
            page_size: DEFAULT_CHANNEL_PAGE_SIZE,
            max_pages: DEFAULT_CHANNEL_MAX_PAGES,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub async fn find_by_name(
        &self,
        name: &ChannelName,
    ) -> Result<Option<Channel>, ChannelDirectoryError> {
        let mut cursor: Option<String> = None;
        let mut seen_cursors = Vec::new();
        for page in 1..=self.max_pages {
            let listing = self
                .chat
                .list_channels(self.page_size, cursor.as_deref())
                .await?;
            debug!(
                channel = %name,
                page,
                channels = listing.channels.len(),
                "scanned channel directory page"
            );
            if let Some(channel) = listing
                .channels
                .into_iter()
                .find(|channel| channel.name == name.as_str())
            {
                return Ok(Some(channel));
            }

            let Some(next) = listing
                .next_cursor
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
            else {
                return Ok(None);
            };
            if seen_cursors.contains(&next) {
                return Err(ChannelDirectoryError::RepeatedCursor {
                    name: name.to_string(),
                    cursor: next,
                });
            }
            seen_cursors.push(next.clone());
            cursor = Some(next);
        }
        Err(ChannelDirectoryError::PageLimitExceeded {
            name: name.to_string(),
            max_pages: self.max_pages,
        })
    }

    pub async fn create_or_recover(
        &self,
        name: &ChannelName,
        is_private: bool,
    ) -> Result<Channel, ChannelDirectoryError> {
        match self.chat.create_channel(name, is_private).await {
            Ok(channel) => {
                info!(channel = %name, channel_id = %channel.id, "created channel");
                Ok(channel)
            }
            Err(ChatServiceError::NameTaken { .. }) => {
                info!(channel = %name, "channel name taken; recovering existing channel");
                let mut channel = self.find_by_name(name).await?.ok_or_else(|| {
                    ChannelDirectoryError::TakenButMissing {
                        name: name.to_string(),
                    }
                })?;
                if channel.is_archived != Some(false) {
                    self.unarchive(&channel.id).await?;
                    channel.is_archived = Some(false);
                }
                Ok(channel)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Invites each user separately; individual failures are logged and kept
    /// in the report instead of failing the run.
    pub async fn invite(&self, channel_id: &str, user_ids: &[String]) -> InviteReport {
        let mut report = InviteReport::default();
        for user_id in user_ids {
            let single = std::slice::from_ref(user_id);
            match self.chat.invite_members(channel_id, single).await {
                Ok(()) => report.invited.push(user_id.clone()),
                Err(error) if error.api_code() == Some(ALREADY_IN_CHANNEL) => {
                    report.already_member.push(user_id.clone());
                }
                Err(error) => {
                    warn!(
                        channel_id,
                        user_id = %user_id,
                        error = %error,
                        "failed to invite user; continuing"
                    );
                    report.failed.push(InviteFailure {
                        user_id: user_id.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }
        report
    }

    pub async fn archive(&self, channel_id: &str) -> Result<(), ChannelDirectoryError> {
        match self.chat.archive_channel(channel_id).await {
            Ok(()) => Ok(()),
            Err(error) if error.api_code() == Some(ALREADY_ARCHIVED) => {
                info!(channel_id, "channel already archived");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn unarchive(&self, channel_id: &str) -> Result<(), ChannelDirectoryError> {
        match self.chat.unarchive_channel(channel_id).await {
            Ok(()) => Ok(()),
            Err(error) if error.api_code() == Some(NOT_ARCHIVED) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    pub async fn post(
        &self,
        channel_id: &str,
        message: &Message,
    ) -> Result<PostedMessage, ChannelDirectoryError> {
        Ok(self.chat.post_message(channel_id, message).await?)
    }
}
