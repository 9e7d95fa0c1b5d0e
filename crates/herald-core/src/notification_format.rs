//! Chat message bodies for pull-request, review and deploy notifications.

use serde_json::{json, Value};

use crate::commit_window::{is_action_message, CommitWindow, WindowBoundary};
use crate::event_model::{ReviewEvent, ReviewState};

pub const GITHUB_WEB_BASE: &str = "https://github.com";
pub const ACTION_REQUIRED_HEADER: &str = "⚠️ ACTION REQUIRED ⚠️";
const SECTION_TEXT_MAX_CHARS: usize = 3_000;
const HEADER_TEXT_MAX_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Header(String),
    Section(String),
    Divider,
    Context(String),
}

impl Block {
    /// Slack Block Kit representation.
    pub fn to_slack_json(&self) -> Value {
        match self {
            Self::Header(text) => json!({
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": truncate_for_block(text, HEADER_TEXT_MAX_CHARS),
                    "emoji": true,
                },
            }),
            Self::Section(text) => json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": truncate_for_block(text, SECTION_TEXT_MAX_CHARS),
                },
            }),
            Self::Divider => json!({ "type": "divider" }),
            Self::Context(text) => json!({
                "type": "context",
                "elements": [{
                    "type": "mrkdwn",
                    "text": truncate_for_block(text, SECTION_TEXT_MAX_CHARS),
                }],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Structured chat message: `text` is the notification fallback.
pub struct Message {
    pub text: String,
    pub blocks: Vec<Block>,
}

impl Message {
    pub fn blocks_json(&self) -> Value {
        Value::Array(self.blocks.iter().map(Block::to_slack_json).collect())
    }

    pub fn section_texts(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Section(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate_for_block(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect::<String>();
    truncated.push_str("...");
    truncated
}

pub fn pull_request_url(repo_full_name: &str, number: u64) -> String {
    format!("{GITHUB_WEB_BASE}/{repo_full_name}/pull/{number}")
}

pub fn pr_opened_message(repo_full_name: &str, number: u64) -> Message {
    let url = pull_request_url(repo_full_name, number);
    Message {
        text: format!("Pull request opened: {url}"),
        blocks: vec![Block::Section(format!(
            "🔗 Pull request <{url}|{}#{number}>",
            escape_mrkdwn(repo_full_name)
        ))],
    }
}

pub fn review_line(review: &ReviewEvent) -> String {
    let prefix = match &review.state {
        ReviewState::ChangesRequested => "❌ Changes requested",
        ReviewState::Approved => "✅ Approved",
        ReviewState::Commented => "💬 Commented",
        ReviewState::Other(state) => {
            return format!("❓ Reviewed with unknown status {}", escape_mrkdwn(state));
        }
    };
    let mut line = format!("{prefix} by {}", escape_mrkdwn(&review.reviewer_login));
    if let Some(body) = review
        .body
        .as_deref()
        .map(str::trim)
        .filter(|body| !body.is_empty())
    {
        line.push_str(": ");
        line.push_str(&escape_mrkdwn(body));
    }
    line
}

pub fn review_message(review: &ReviewEvent) -> Message {
    let line = review_line(review);
    Message {
        text: line.clone(),
        blocks: vec![Block::Section(line)],
    }
}

pub fn deploy_digest_message(window: &CommitWindow) -> Message {
    let environment = window.environment;
    let mut blocks = vec![Block::Header(format!("🚀 Deployed to {environment}"))];

    if window.messages.is_empty() {
        blocks.push(Block::Section(format!(
            "No new commits since the last {environment} deploy."
        )));
    }
    for message in &window.messages {
        blocks.push(Block::Section(format!("• {}", escape_mrkdwn(message.trim()))));
    }

    if let WindowBoundary::Open { scanned } = window.boundary {
        blocks.push(Block::Context(format!(
            "Previous {environment} deploy marker not found in the last {scanned} commits; this list may be incomplete."
        )));
    }

    let action_messages = window
        .messages
        .iter()
        .filter(|message| is_action_message(message))
        .collect::<Vec<_>>();
    if !action_messages.is_empty() {
        blocks.push(Block::Divider);
        blocks.push(Block::Header(ACTION_REQUIRED_HEADER.to_string()));
        for message in &action_messages {
            blocks.push(Block::Section(format!(
                "❗ *{}*",
                escape_mrkdwn(message.trim())
            )));
        }
    }

    let mut text = format!(
        "Deployed to {environment}: {} commit(s)",
        window.messages.len()
    );
    if !action_messages.is_empty() {
        text.push_str(&format!(", {} action(s) required", action_messages.len()));
    }
    Message { text, blocks }
}
