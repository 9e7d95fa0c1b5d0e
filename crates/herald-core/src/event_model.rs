//! Typed event model for the five supported action kinds.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Enumerates supported `EventKind` values.
pub enum EventKind {
    PullRequestOpen,
    PullRequestClosed,
    PullRequestReviewed,
    DeployStaging,
    DeployProduction,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::PullRequestOpen,
        EventKind::PullRequestClosed,
        EventKind::PullRequestReviewed,
        EventKind::DeployStaging,
        EventKind::DeployProduction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PullRequestOpen => "PR_OPEN",
            Self::PullRequestClosed => "PR_CLOSED",
            Self::PullRequestReviewed => "PR_REVIEWED",
            Self::DeployStaging => "DEPLOY_STAGING",
            Self::DeployProduction => "DEPLOY_PRODUCTION",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action type '{0}', expected one of PR_OPEN, PR_CLOSED, PR_REVIEWED, DEPLOY_STAGING, DEPLOY_PRODUCTION")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "PR_OPEN" => Ok(Self::PullRequestOpen),
            "PR_CLOSED" | "PR_CLOSE" => Ok(Self::PullRequestClosed),
            "PR_REVIEWED" => Ok(Self::PullRequestReviewed),
            "DEPLOY_STAGING" => Ok(Self::DeployStaging),
            "DEPLOY_PRODUCTION" => Ok(Self::DeployProduction),
            _ => Err(UnknownEventKind(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self, EventPayloadError> {
        let invalid = || EventPayloadError::InvalidRepository(raw.to_string());
        let (owner, name) = raw.trim().split_once('/').ok_or_else(invalid)?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Pull request identity plus the branch pair used for channel naming.
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub head_ref: String,
    pub base_ref: String,
}

impl PullRequestRef {
    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub message: String,
    pub author_date: Option<DateTime<Utc>>,
}

impl CommitRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            author_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    ChangesRequested,
    Approved,
    Commented,
    Other(String),
}

impl ReviewState {
    /// Webhooks report lowercase states while the REST API reports uppercase.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "changes_requested" => Self::ChangesRequested,
            "approved" => Self::Approved,
            "commented" => Self::Commented,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ChangesRequested => "changes_requested",
            Self::Approved => "approved",
            Self::Commented => "commented",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewEvent {
    pub state: ReviewState,
    pub reviewer_login: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestPayload {
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPayload {
    pub pull_request_number: u64,
    pub review: ReviewEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPayload {
    pub git_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One incoming event; each variant carries only what its kind guarantees.
pub enum Event {
    PullRequestOpened(PullRequestPayload),
    PullRequestClosed(PullRequestPayload),
    PullRequestReviewed(ReviewPayload),
    DeployStaging(DeployPayload),
    DeployProduction(DeployPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventPayloadError {
    #[error("event payload for {kind} is missing '{field}'")]
    MissingField { kind: EventKind, field: &'static str },
    #[error("invalid repository '{0}', expected owner/repo")]
    InvalidRepository(String),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PullRequestOpened(_) => EventKind::PullRequestOpen,
            Self::PullRequestClosed(_) => EventKind::PullRequestClosed,
            Self::PullRequestReviewed(_) => EventKind::PullRequestReviewed,
            Self::DeployStaging(_) => EventKind::DeployStaging,
            Self::DeployProduction(_) => EventKind::DeployProduction,
        }
    }

    /// Decodes the webhook payload into the shape `kind` requires.
    ///
    /// `fallback_sha` is the workflow commit, used for deploy events when the
    /// push payload does not carry `after`.
    pub fn from_payload(
        kind: EventKind,
        payload: &Value,
        fallback_sha: Option<&str>,
    ) -> Result<Self, EventPayloadError> {
        match kind {
            EventKind::PullRequestOpen => {
                Ok(Self::PullRequestOpened(pull_request_payload(kind, payload)?))
            }
            EventKind::PullRequestClosed => {
                Ok(Self::PullRequestClosed(pull_request_payload(kind, payload)?))
            }
            EventKind::PullRequestReviewed => {
                Ok(Self::PullRequestReviewed(review_payload(kind, payload)?))
            }
            EventKind::DeployStaging => Ok(Self::DeployStaging(deploy_payload(
                kind,
                payload,
                fallback_sha,
            )?)),
            EventKind::DeployProduction => Ok(Self::DeployProduction(deploy_payload(
                kind,
                payload,
                fallback_sha,
            )?)),
        }
    }
}

fn pull_request_payload(
    kind: EventKind,
    payload: &Value,
) -> Result<PullRequestPayload, EventPayloadError> {
    let number = payload
        .get("number")
        .and_then(Value::as_u64)
        .or_else(|| payload.pointer("/pull_request/number").and_then(Value::as_u64))
        .ok_or(EventPayloadError::MissingField {
            kind,
            field: "number",
        })?;
    Ok(PullRequestPayload { number })
}

fn review_payload(kind: EventKind, payload: &Value) -> Result<ReviewPayload, EventPayloadError> {
    let pull_request_number = payload
        .pointer("/pull_request/number")
        .and_then(Value::as_u64)
        .ok_or(EventPayloadError::MissingField {
            kind,
            field: "pull_request.number",
        })?;
    let state = payload
        .pointer("/review/state")
        .and_then(Value::as_str)
        .ok_or(EventPayloadError::MissingField {
            kind,
            field: "review.state",
        })?;
    let reviewer_login = payload
        .pointer("/review/user/login")
        .and_then(Value::as_str)
        .ok_or(EventPayloadError::MissingField {
            kind,
            field: "review.user.login",
        })?;
    let body = payload
        .pointer("/review/body")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    Ok(ReviewPayload {
        pull_request_number,
        review: ReviewEvent {
            state: ReviewState::parse(state),
            reviewer_login: reviewer_login.to_string(),
            body,
        },
    })
}

fn deploy_payload(
    kind: EventKind,
    payload: &Value,
    fallback_sha: Option<&str>,
) -> Result<DeployPayload, EventPayloadError> {
    let git_ref = payload
        .get("after")
        .and_then(Value::as_str)
        .or(fallback_sha)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(EventPayloadError::MissingField { kind, field: "after" })?;
    Ok(DeployPayload {
        git_ref: git_ref.to_string(),
    })
}
