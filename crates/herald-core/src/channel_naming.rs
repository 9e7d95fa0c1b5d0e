//! Deterministic channel naming for pull-request and deploy channels.
//!
//! A pull-request channel must be re-derivable from the PR alone: the close and
//! review events rebuild the name independently of the open event that created
//! the channel, so every step here is a pure function of its inputs.

use std::fmt;

use crate::event_model::PullRequestRef;

pub const DEFAULT_CHANNEL_PREFIX: &str = "pr";
/// Slack rejects channel names longer than this.
pub const CHANNEL_NAME_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Normalized chat channel name used as the directory lookup key.
pub struct ChannelName(String);

impl ChannelName {
    /// Wraps an externally configured channel name (deploy channels).
    pub fn fixed(raw: &str) -> Self {
        let trimmed = raw.trim();
        let without_hash = trimmed.strip_prefix('#').unwrap_or(trimmed);
        Self(without_hash.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strips everything outside `[0-9A-Za-z -]`, turns each run of spaces into a
/// single hyphen and lowercases the rest.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut in_space_run = false;
    for ch in text.chars() {
        if ch == ' ' {
            if !in_space_run {
                slug.push('-');
                in_space_run = true;
            }
            continue;
        }
        if ch.is_ascii_alphanumeric() || ch == '-' {
            slug.push(ch.to_ascii_lowercase());
            in_space_run = false;
        }
    }
    slug
}

pub fn name_for(
    prefix: &str,
    number: u64,
    head_ref_slug: &str,
    base_ref_slug: &str,
) -> ChannelName {
    ChannelName(format!("{prefix}_{number}_{head_ref_slug}_{base_ref_slug}"))
}

/// Builds the channel name for a pull request, slugifying the prefix and both
/// branch names the same way on every call.
pub fn name_for_pull_request(prefix: &str, pull_request: &PullRequestRef) -> ChannelName {
    let prefix_slug = slugify(prefix);
    let prefix = if prefix_slug.is_empty() {
        DEFAULT_CHANNEL_PREFIX
    } else {
        prefix_slug.as_str()
    };
    let name = name_for(
        prefix,
        pull_request.number,
        &slugify(&pull_request.head_ref),
        &slugify(&pull_request.base_ref),
    );
    truncate_channel_name(name)
}

fn truncate_channel_name(name: ChannelName) -> ChannelName {
    if name.0.chars().count() <= CHANNEL_NAME_MAX_CHARS {
        return name;
    }
    ChannelName(name.0.chars().take(CHANNEL_NAME_MAX_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        name_for, name_for_pull_request, slugify, ChannelName, CHANNEL_NAME_MAX_CHARS,
    };
    use crate::event_model::PullRequestRef;

    fn pull_request(number: u64, head_ref: &str, base_ref: &str) -> PullRequestRef {
        PullRequestRef {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            number,
            head_ref: head_ref.to_string(),
            base_ref: base_ref.to_string(),
        }
    }

    #[test]
    fn unit_slugify_strips_punctuation_and_collapses_spaces() {
        assert_eq!(slugify("Feature/Add  Login!"), "featureadd-login");
        assert_eq!(slugify("fix: handle  \t tabs"), "fix-handle-tabs");
        assert_eq!(slugify("already-slugged"), "already-slugged");
    }

    #[test]
    fn unit_slugify_empty_input_yields_empty_output() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("///"), "");
    }

    #[test]
    fn regression_slugify_drops_non_ascii_letters() {
        assert_eq!(slugify("café crème"), "caf-crme");
    }

    #[test]
    fn unit_name_for_formats_prefix_number_and_slugs() {
        assert_eq!(
            name_for("pr", 42, "feat-x", "main").as_str(),
            "pr_42_feat-x_main"
        );
    }

    #[test]
    fn functional_name_for_pull_request_is_stable_across_calls() {
        let pr = pull_request(7, "feature/Big Change", "main");
        let first = name_for_pull_request("pr", &pr);
        let second = name_for_pull_request("pr", &pr);
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "pr_7_featurebig-change_main");
    }

    #[test]
    fn regression_name_for_pull_request_falls_back_to_default_prefix() {
        let pr = pull_request(3, "a", "b");
        assert_eq!(name_for_pull_request("!!", &pr).as_str(), "pr_3_a_b");
        assert_eq!(name_for_pull_request("Team Chat", &pr).as_str(), "team-chat_3_a_b");
    }

    #[test]
    fn regression_name_for_pull_request_truncates_to_slack_limit() {
        let long_branch = "x".repeat(120);
        let pr = pull_request(1, &long_branch, "main");
        let name = name_for_pull_request("pr", &pr);
        assert_eq!(name.as_str().chars().count(), CHANNEL_NAME_MAX_CHARS);
        assert!(name.as_str().starts_with("pr_1_xxx"));
    }

    #[test]
    fn unit_fixed_channel_name_strips_hash_and_whitespace() {
        assert_eq!(ChannelName::fixed(" #deploy-staging ").as_str(), "deploy-staging");
        assert_eq!(ChannelName::fixed("ops").to_string(), "ops");
    }

    proptest! {
        #[test]
        fn slugify_output_only_contains_allowed_characters(input in ".*") {
            let slug = slugify(&input);
            prop_assert!(slug
                .chars()
                .all(|ch| ch.is_ascii_digit() || ch.is_ascii_lowercase() || ch == '-'));
        }

        #[test]
        fn slugify_is_idempotent(input in ".*") {
            let once = slugify(&input);
            prop_assert_eq!(slugify(&once), once);
        }
    }
}
