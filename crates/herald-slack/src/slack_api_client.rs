//! Slack Web API client backing the `ChatService` contract.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use herald_core::retry_policy::{is_retryable_status, truncate_for_error};
use herald_core::{
    Channel, ChannelName, ChannelPage, ChatService, ChatServiceError, Message, PostedMessage,
    RetryPolicy,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::slack_transport_helpers::{
    is_retryable_transport_error, normalize_next_cursor, parse_retry_after, slack_error_code,
};

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
const NAME_TAKEN: &str = "name_taken";

#[derive(Debug, Clone, Deserialize)]
struct SlackChannel {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_archived: Option<bool>,
}

impl From<SlackChannel> for Channel {
    fn from(channel: SlackChannel) -> Self {
        Channel {
            id: channel.id,
            name: channel.name,
            is_archived: channel.is_archived,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SlackResponseMetadata {
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackConversationsListResponse {
    ok: bool,
    #[serde(default)]
    channels: Vec<SlackChannel>,
    #[serde(default)]
    response_metadata: Option<SlackResponseMetadata>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackConversationResponse {
    ok: bool,
    channel: Option<SlackChannel>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackAckResponse {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

fn ensure_ok(method: &str, ok: bool, error: Option<String>) -> Result<(), ChatServiceError> {
    if ok {
        return Ok(());
    }
    Err(ChatServiceError::api(method, slack_error_code(error)))
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry: RetryPolicy,
}

impl SlackApiClient {
    pub fn new(
        api_base: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("herald-action"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
            retry,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    async fn post_json<T>(&self, method: &str, payload: serde_json::Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.method_url(method);
        self.request_json(method, || {
            self.http
                .post(&url)
                .bearer_auth(&self.bot_token)
                .json(&payload)
        })
        .await
    }

    async fn request_json<T, F>(&self, method: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header("x-herald-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode slack {method}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if is_retryable_status(status.as_u16())
                        && self.retry.allows_retry_after(attempt)
                    {
                        let delay = self.retry.delay(attempt, retry_after);
                        debug!(
                            method,
                            attempt,
                            status = status.as_u16(),
                            delay_ms = delay.as_millis() as u64,
                            "retrying slack request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    bail!(
                        "slack api {method} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if self.retry.allows_retry_after(attempt)
                        && is_retryable_transport_error(&error)
                    {
                        warn!(method, attempt, error = %error, "slack transport error; retrying");
                        tokio::time::sleep(self.retry.delay(attempt, None)).await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("slack api {method} request failed"));
                }
            }
        }
    }
}

#[async_trait]
impl ChatService for SlackApiClient {
    async fn list_channels(
        &self,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ChannelPage, ChatServiceError> {
        const METHOD: &str = "conversations.list";
        let url = self.method_url(METHOD);
        let limit = limit.max(1).to_string();
        let response: SlackConversationsListResponse = self
            .request_json(METHOD, || {
                let mut request = self.http.get(&url).bearer_auth(&self.bot_token).query(&[
                    ("limit", limit.as_str()),
                    ("exclude_archived", "false"),
                    ("types", "public_channel,private_channel"),
                ]);
                if let Some(cursor) = cursor {
                    request = request.query(&[("cursor", cursor)]);
                }
                request
            })
            .await?;
        ensure_ok(METHOD, response.ok, response.error)?;
        Ok(ChannelPage {
            channels: response.channels.into_iter().map(Channel::from).collect(),
            next_cursor: normalize_next_cursor(
                response
                    .response_metadata
                    .and_then(|metadata| metadata.next_cursor),
            ),
        })
    }

    async fn create_channel(
        &self,
        name: &ChannelName,
        is_private: bool,
    ) -> Result<Channel, ChatServiceError> {
        const METHOD: &str = "conversations.create";
        let response: SlackConversationResponse = self
            .post_json(
                METHOD,
                json!({ "name": name.as_str(), "is_private": is_private }),
            )
            .await?;
        if !response.ok && response.error.as_deref() == Some(NAME_TAKEN) {
            return Err(ChatServiceError::NameTaken {
                name: name.to_string(),
            });
        }
        ensure_ok(METHOD, response.ok, response.error)?;
        let channel = response
            .channel
            .ok_or_else(|| ChatServiceError::api(METHOD, "missing_channel"))?;
        Ok(channel.into())
    }

    async fn invite_members(
        &self,
        channel_id: &str,
        user_ids: &[String],
    ) -> Result<(), ChatServiceError> {
        const METHOD: &str = "conversations.invite";
        if user_ids.is_empty() {
            return Ok(());
        }
        let response: SlackAckResponse = self
            .post_json(
                METHOD,
                json!({ "channel": channel_id, "users": user_ids.join(",") }),
            )
            .await?;
        ensure_ok(METHOD, response.ok, response.error)
    }

    async fn archive_channel(&self, channel_id: &str) -> Result<(), ChatServiceError> {
        const METHOD: &str = "conversations.archive";
        let response: SlackAckResponse = self
            .post_json(METHOD, json!({ "channel": channel_id }))
            .await?;
        ensure_ok(METHOD, response.ok, response.error)
    }

    async fn unarchive_channel(&self, channel_id: &str) -> Result<(), ChatServiceError> {
        const METHOD: &str = "conversations.unarchive";
        let response: SlackAckResponse = self
            .post_json(METHOD, json!({ "channel": channel_id }))
            .await?;
        ensure_ok(METHOD, response.ok, response.error)
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &Message,
    ) -> Result<PostedMessage, ChatServiceError> {
        const METHOD: &str = "chat.postMessage";
        let response: SlackChatMessageResponse = self
            .post_json(
                METHOD,
                json!({
                    "channel": channel_id,
                    "text": message.text,
                    "blocks": message.blocks_json(),
                    "unfurl_links": false,
                    "unfurl_media": false,
                }),
            )
            .await?;
        ensure_ok(METHOD, response.ok, response.error)?;
        let ts = response
            .ts
            .ok_or_else(|| ChatServiceError::api(METHOD, "missing_ts"))?;
        Ok(PostedMessage {
            channel_id: response.channel.unwrap_or_else(|| channel_id.to_string()),
            ts,
        })
    }
}
