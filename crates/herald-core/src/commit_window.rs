//! Deploy digest window extraction from an ordered commit history.
//!
//! The newest commit on a deploy ref is the version bump that triggered the
//! deploy and is never reported. Everything after it up to the previous
//! `PUSH ... <environment>` marker is what shipped.

use std::fmt;

use crate::event_model::CommitRecord;

pub const DEFAULT_COMMIT_PAGE_SIZE: usize = 100;
pub const DEPLOY_MARKER_TOKEN: &str = "PUSH";
pub const ACTION_MARKER_TOKEN: &str = "ACTION";
pub const DEFAULT_STAGING_CHANNEL: &str = "deploy-staging";
pub const DEFAULT_PRODUCTION_CHANNEL: &str = "deploy-production";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployEnvironment {
    Staging,
    Production,
}

impl DeployEnvironment {
    pub const ALL: [DeployEnvironment; 2] =
        [DeployEnvironment::Staging, DeployEnvironment::Production];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for DeployEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBoundary {
    /// Marker found at this index of the fetched history.
    Marker { position: usize },
    /// No marker among the `scanned` commits after the bump, and the fetched
    /// page was full, so older history may still hold it.
    Open { scanned: usize },
    /// No marker, but the fetched page was short: the whole history was seen
    /// and this is the first deploy to the environment.
    HistoryStart { scanned: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitWindow {
    pub environment: DeployEnvironment,
    pub messages: Vec<String>,
    pub boundary: WindowBoundary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployDigest {
    pub feature_messages: Vec<String>,
    pub action_messages: Vec<String>,
}

impl CommitWindow {
    pub fn is_open(&self) -> bool {
        matches!(self.boundary, WindowBoundary::Open { .. })
    }

    /// Action messages are also kept in the feature list.
    pub fn digest(&self) -> DeployDigest {
        DeployDigest {
            feature_messages: self.messages.clone(),
            action_messages: self
                .messages
                .iter()
                .filter(|message| is_action_message(message))
                .cloned()
                .collect(),
        }
    }
}

fn headline(message: &str) -> &str {
    message.lines().next().unwrap_or_default().trim()
}

/// Marker tokens only count as whole words; `ACTION:` is accepted.
fn first_token(headline: &str) -> Option<&str> {
    headline
        .split_whitespace()
        .next()
        .map(|token| token.trim_end_matches(':'))
}

pub fn is_action_message(message: &str) -> bool {
    first_token(headline(message)) == Some(ACTION_MARKER_TOKEN)
}

pub fn is_deploy_marker(message: &str, environment: DeployEnvironment) -> bool {
    let headline = headline(message);
    let starts_with_token = first_token(headline)
        .is_some_and(|token| token.eq_ignore_ascii_case(DEPLOY_MARKER_TOKEN));
    let ends_with_label = headline
        .split_whitespace()
        .last()
        .is_some_and(|token| token.eq_ignore_ascii_case(environment.label()));
    starts_with_token && ends_with_label
}

fn is_foreign_marker(message: &str, environment: DeployEnvironment) -> bool {
    DeployEnvironment::ALL
        .iter()
        .filter(|other| **other != environment)
        .any(|other| is_deploy_marker(message, *other))
}

pub fn extract_commit_window(
    commits: &[CommitRecord],
    environment: DeployEnvironment,
) -> CommitWindow {
    let mut messages = Vec::new();
    let mut scanned = 0_usize;
    for (position, commit) in commits.iter().enumerate().skip(1) {
        if is_deploy_marker(&commit.message, environment) {
            return CommitWindow {
                environment,
                messages,
                boundary: WindowBoundary::Marker { position },
            };
        }
        scanned += 1;
        if is_foreign_marker(&commit.message, environment) {
            continue;
        }
        messages.push(commit.message.clone());
    }
    CommitWindow {
        environment,
        messages,
        boundary: WindowBoundary::Open { scanned },
    }
}

/// Like [`extract_commit_window`] for a history fetched with `page_size`.
///
/// A page shorter than requested is the whole history, so a missing marker
/// there means a first deploy rather than a truncated window.
pub fn extract_commit_window_from_page(
    commits: &[CommitRecord],
    environment: DeployEnvironment,
    page_size: usize,
) -> CommitWindow {
    let mut window = extract_commit_window(commits, environment);
    if let WindowBoundary::Open { scanned } = window.boundary {
        if commits.len() < page_size {
            window.boundary = WindowBoundary::HistoryStart { scanned };
        }
    }
    window
}
