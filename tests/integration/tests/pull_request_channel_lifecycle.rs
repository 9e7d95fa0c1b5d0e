use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use herald_core::{
    Channel, ChannelName, ChannelPage, ChatService, ChatServiceError, CommitRecord, IssueTracker,
    Message, PostedMessage, PullRequestRef, RepoRef, WindowBoundary, ACTION_REQUIRED_HEADER,
};
use herald_runtime::{DispatchError, DispatcherConfig, EventContext, EventDispatcher};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatCall {
    List { cursor: Option<String> },
    Create(String),
    Invite(String),
    Archive(String),
    Unarchive(String),
    Post(String),
}

/// In-memory tracker holding pull request branch pairs and a commit history.
struct ScriptedTracker {
    pull_requests: HashMap<u64, (String, String)>,
    commits: AsyncMutex<Vec<String>>,
    labels: AsyncMutex<Vec<(u64, Vec<String>)>>,
}

impl ScriptedTracker {
    fn new(pull_requests: &[(u64, &str, &str)]) -> Self {
        Self {
            pull_requests: pull_requests
                .iter()
                .map(|(number, head, base)| (*number, (head.to_string(), base.to_string())))
                .collect(),
            commits: AsyncMutex::new(Vec::new()),
            labels: AsyncMutex::new(Vec::new()),
        }
    }

    async fn set_history(&self, newest_first: &[&str]) {
        *self.commits.lock().await = newest_first.iter().map(|m| m.to_string()).collect();
    }
}

#[async_trait]
impl IssueTracker for ScriptedTracker {
    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> Result<PullRequestRef> {
        let (head_ref, base_ref) = self
            .pull_requests
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow!("pull request #{number} not found"))?;
        Ok(PullRequestRef {
            owner: repo.owner.clone(),
            repo: repo.name.clone(),
            number,
            head_ref,
            base_ref,
        })
    }

    async fn add_labels(
        &self,
        _repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> Result<()> {
        self.labels.lock().await.push((issue_number, labels.to_vec()));
        Ok(())
    }

    async fn list_commits(
        &self,
        _repo: &RepoRef,
        _git_ref: &str,
        per_page: usize,
    ) -> Result<Vec<CommitRecord>> {
        Ok(self
            .commits
            .lock()
            .await
            .iter()
            .take(per_page)
            .map(|message| CommitRecord::new(message.clone()))
            .collect())
    }
}

/// In-memory workspace with numeric cursors and Slack-style error codes.
struct ScriptedWorkspace {
    channels: AsyncMutex<Vec<Channel>>,
    calls: AsyncMutex<Vec<ChatCall>>,
    posts: AsyncMutex<Vec<(String, Message)>>,
}

impl ScriptedWorkspace {
    fn new(existing: &[&str]) -> Self {
        Self {
            channels: AsyncMutex::new(
                existing
                    .iter()
                    .enumerate()
                    .map(|(index, name)| Channel {
                        id: format!("C{index:03}"),
                        name: name.to_string(),
                        is_archived: Some(false),
                    })
                    .collect(),
            ),
            calls: AsyncMutex::new(Vec::new()),
            posts: AsyncMutex::new(Vec::new()),
        }
    }

    async fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().await.clone()
    }

    async fn count(&self, predicate: impl Fn(&ChatCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|call| predicate(*call)).count()
    }

    async fn channel(&self, name: &str) -> Option<Channel> {
        self.channels
            .lock()
            .await
            .iter()
            .find(|channel| channel.name == name)
            .cloned()
    }

    async fn posts(&self) -> Vec<(String, Message)> {
        self.posts.lock().await.clone()
    }

    async fn set_archived(
        &self,
        method: &str,
        channel_id: &str,
        archived: bool,
        already_code: &str,
    ) -> Result<(), ChatServiceError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .iter_mut()
            .find(|channel| channel.id == channel_id)
            .ok_or_else(|| ChatServiceError::api(method, "channel_not_found"))?;
        if channel.is_archived == Some(archived) {
            return Err(ChatServiceError::api(method, already_code));
        }
        channel.is_archived = Some(archived);
        Ok(())
    }
}

#[async_trait]
impl ChatService for ScriptedWorkspace {
    async fn list_channels(
        &self,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<ChannelPage, ChatServiceError> {
        self.calls.lock().await.push(ChatCall::List {
            cursor: cursor.map(str::to_string),
        });
        let start = cursor
            .map(|value| value.parse::<usize>())
            .transpose()
            .map_err(|_| ChatServiceError::api("conversations.list", "invalid_cursor"))?
            .unwrap_or(0);
        let channels = self.channels.lock().await;
        let end = (start + limit).min(channels.len());
        Ok(ChannelPage {
            channels: channels[start.min(end)..end].to_vec(),
            next_cursor: (end < channels.len()).then(|| end.to_string()),
        })
    }

    async fn create_channel(
        &self,
        name: &ChannelName,
        is_private: bool,
    ) -> Result<Channel, ChatServiceError> {
        self.calls.lock().await.push(ChatCall::Create(name.to_string()));
        let mut channels = self.channels.lock().await;
        if channels.iter().any(|channel| channel.name == name.as_str()) {
            return Err(ChatServiceError::NameTaken {
                name: name.to_string(),
            });
        }
        let channel = Channel {
            id: format!("{}{:03}", if is_private { "G" } else { "C" }, channels.len()),
            name: name.to_string(),
            is_archived: Some(false),
        };
        channels.push(channel.clone());
        Ok(channel)
    }

    async fn invite_members(
        &self,
        _channel_id: &str,
        user_ids: &[String],
    ) -> Result<(), ChatServiceError> {
        self.calls.lock().await.push(ChatCall::Invite(user_ids.join(",")));
        if user_ids.iter().any(|user| user == "UBOT") {
            return Err(ChatServiceError::api("conversations.invite", "cant_invite_self"));
        }
        Ok(())
    }

    async fn archive_channel(&self, channel_id: &str) -> Result<(), ChatServiceError> {
        self.calls
            .lock()
            .await
            .push(ChatCall::Archive(channel_id.to_string()));
        self.set_archived("conversations.archive", channel_id, true, "already_archived")
            .await
    }

    async fn unarchive_channel(&self, channel_id: &str) -> Result<(), ChatServiceError> {
        self.calls
            .lock()
            .await
            .push(ChatCall::Unarchive(channel_id.to_string()));
        self.set_archived("conversations.unarchive", channel_id, false, "not_archived")
            .await
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &Message,
    ) -> Result<PostedMessage, ChatServiceError> {
        self.calls.lock().await.push(ChatCall::Post(channel_id.to_string()));
        let mut posts = self.posts.lock().await;
        posts.push((channel_id.to_string(), message.clone()));
        Ok(PostedMessage {
            channel_id: channel_id.to_string(),
            ts: format!("1700000000.{:06}", posts.len()),
        })
    }
}

fn context(payload: Value) -> EventContext {
    EventContext::new(
        RepoRef::parse("acme/widgets").expect("repository"),
        Some("0123abc".to_string()),
        payload,
    )
}

async fn dispatch(
    tracker: &ScriptedTracker,
    workspace: &ScriptedWorkspace,
    config: &DispatcherConfig,
    kind: &str,
    payload: Value,
) -> Result<herald_runtime::DispatchOutcome, DispatchError> {
    EventDispatcher::new(config.clone(), context(payload), tracker, workspace)
        .dispatch(kind)
        .await
}

#[tokio::test]
async fn integration_open_then_close_archives_derived_channel_exactly_once() {
    let tracker = ScriptedTracker::new(&[(7, "headx", "main")]);
    let workspace = ScriptedWorkspace::new(&["general", "random"]);
    let config = DispatcherConfig {
        invite_user_ids: vec!["U1".to_string(), "UBOT".to_string()],
        ..DispatcherConfig::default()
    };

    let opened = dispatch(&tracker, &workspace, &config, "PR_OPEN", json!({"number": 7}))
        .await
        .expect("open");
    assert_eq!(opened.channel_name.as_str(), "pr_7_headx_main");
    let invites = opened.invites.expect("invite report");
    assert_eq!(invites.invited, vec!["U1".to_string()]);
    assert_eq!(invites.failed.len(), 1);
    assert_eq!(
        tracker.labels.lock().await.clone(),
        vec![(7, vec!["7".to_string()])]
    );

    let closed = dispatch(&tracker, &workspace, &config, "PR_CLOSED", json!({"number": 7}))
        .await
        .expect("close");
    assert_eq!(closed.channel_id, opened.channel_id);

    let channel = workspace.channel("pr_7_headx_main").await.expect("channel");
    assert_eq!(channel.is_archived, Some(true));
    assert_eq!(
        workspace
            .count(|call| matches!(call, ChatCall::Archive(_)))
            .await,
        1
    );
    let posts = workspace.posts().await;
    assert_eq!(posts.len(), 1);
    assert!(posts[0]
        .1
        .text
        .contains("https://github.com/acme/widgets/pull/7"));
}

#[tokio::test]
async fn integration_reopen_after_close_recovers_same_channel_unarchived() {
    let tracker = ScriptedTracker::new(&[(7, "headx", "main")]);
    let workspace = ScriptedWorkspace::new(&[]);
    let config = DispatcherConfig::default();

    let first = dispatch(&tracker, &workspace, &config, "PR_OPEN", json!({"number": 7}))
        .await
        .expect("first open");
    dispatch(&tracker, &workspace, &config, "PR_CLOSED", json!({"number": 7}))
        .await
        .expect("close");
    let second = dispatch(&tracker, &workspace, &config, "PR_OPEN", json!({"number": 7}))
        .await
        .expect("second open");

    assert_eq!(first.channel_id, second.channel_id);
    let channel = workspace.channel("pr_7_headx_main").await.expect("channel");
    assert_eq!(channel.is_archived, Some(false));
    assert_eq!(
        workspace
            .count(|call| matches!(call, ChatCall::Unarchive(_)))
            .await,
        1
    );
}

#[tokio::test]
async fn integration_close_is_idempotent_for_already_archived_channel() {
    let tracker = ScriptedTracker::new(&[(7, "headx", "main")]);
    let workspace = ScriptedWorkspace::new(&["pr_7_headx_main"]);
    let config = DispatcherConfig::default();

    for _ in 0..2 {
        dispatch(&tracker, &workspace, &config, "PR_CLOSE", json!({"number": 7}))
            .await
            .expect("close");
    }
    assert_eq!(
        workspace
            .count(|call| matches!(call, ChatCall::Archive(_)))
            .await,
        2
    );
}

#[tokio::test]
async fn integration_paginated_lookup_stops_on_matching_page() {
    let tracker = ScriptedTracker::new(&[(9, "fix/login", "main")]);
    let workspace = ScriptedWorkspace::new(&[
        "alpha",
        "beta",
        "gamma",
        "delta",
        "pr_9_fixlogin_main",
        "epsilon",
        "zeta",
    ]);
    let config = DispatcherConfig {
        channel_page_size: 2,
        ..DispatcherConfig::default()
    };
    let payload = json!({
        "pull_request": {"number": 9},
        "review": {"state": "changes_requested", "user": {"login": "bob"}, "body": "needs tests"}
    });

    let outcome = dispatch(&tracker, &workspace, &config, "PR_REVIEWED", payload)
        .await
        .expect("review");
    assert_eq!(outcome.channel_id.as_deref(), Some("C004"));
    assert_eq!(
        workspace.calls().await,
        vec![
            ChatCall::List { cursor: None },
            ChatCall::List {
                cursor: Some("2".to_string())
            },
            ChatCall::List {
                cursor: Some("4".to_string())
            },
            ChatCall::Post("C004".to_string()),
        ]
    );
    let posts = workspace.posts().await;
    assert_eq!(posts[0].1.text, "❌ Changes requested by bob: needs tests");
}

#[tokio::test]
async fn integration_review_for_unknown_channel_fails_without_posting() {
    let tracker = ScriptedTracker::new(&[(9, "fix/login", "main")]);
    let workspace = ScriptedWorkspace::new(&["general"]);
    let payload = json!({
        "pull_request": {"number": 9},
        "review": {"state": "dismissed", "user": {"login": "bob"}}
    });

    let error = dispatch(
        &tracker,
        &workspace,
        &DispatcherConfig::default(),
        "PR_REVIEWED",
        payload,
    )
    .await
    .expect_err("channel missing");
    assert!(matches!(error, DispatchError::ChannelNotFound { .. }));
    assert!(workspace.posts().await.is_empty());
}

#[tokio::test]
async fn integration_deploy_digests_follow_each_environment_marker() {
    let tracker = ScriptedTracker::new(&[]);
    let workspace = ScriptedWorkspace::new(&["deploy-staging", "deploy-production"]);
    let config = DispatcherConfig::default();
    tracker
        .set_history(&[
            "bump v3",
            "ACTION run migration 42",
            "feat B",
            "PUSH release to staging",
            "feat A",
            "PUSH release to production",
            "feat 0",
        ])
        .await;

    let staging = dispatch(
        &tracker,
        &workspace,
        &config,
        "DEPLOY_STAGING",
        json!({"after": "0123abc"}),
    )
    .await
    .expect("staging");
    assert_eq!(
        staging.window_boundary,
        Some(WindowBoundary::Marker { position: 3 })
    );

    let production = dispatch(&tracker, &workspace, &config, "DEPLOY_PRODUCTION", json!({}))
        .await
        .expect("production");
    assert_eq!(
        production.window_boundary,
        Some(WindowBoundary::Marker { position: 5 })
    );

    let posts = workspace.posts().await;
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].0, "C000");
    assert_eq!(posts[1].0, "C001");
    assert_eq!(
        posts[1].1.section_texts(),
        vec![
            "• ACTION run migration 42",
            "• feat B",
            "• feat A",
            "❗ *ACTION run migration 42*",
        ]
    );
    assert!(posts[1].1.blocks_json().to_string().contains(ACTION_REQUIRED_HEADER));
}

#[tokio::test]
async fn integration_missing_marker_policy_is_configurable() {
    let tracker = ScriptedTracker::new(&[]);
    let workspace = ScriptedWorkspace::new(&["deploy-staging"]);
    tracker
        .set_history(&["bump", "feat A", "feat B", "feat C", "feat D"])
        .await;
    let lenient = DispatcherConfig {
        commit_page_size: 3,
        ..DispatcherConfig::default()
    };

    let outcome = dispatch(&tracker, &workspace, &lenient, "DEPLOY_STAGING", json!({}))
        .await
        .expect("lenient digest");
    assert_eq!(
        outcome.window_boundary,
        Some(WindowBoundary::Open { scanned: 2 })
    );

    let strict = DispatcherConfig {
        require_deploy_marker: true,
        ..lenient.clone()
    };
    let error = dispatch(&tracker, &workspace, &strict, "DEPLOY_STAGING", json!({}))
        .await
        .expect_err("strict mode");
    assert!(matches!(error, DispatchError::DeployMarkerNotFound { .. }));
    assert_eq!(workspace.posts().await.len(), 1);
}

#[tokio::test]
async fn integration_first_deploy_reports_whole_history_in_strict_mode() {
    let tracker = ScriptedTracker::new(&[]);
    let workspace = ScriptedWorkspace::new(&["deploy-production"]);
    tracker
        .set_history(&["bump", "Pushover alerts for production", "initial commit"])
        .await;
    let strict = DispatcherConfig {
        require_deploy_marker: true,
        ..DispatcherConfig::default()
    };

    let outcome = dispatch(&tracker, &workspace, &strict, "DEPLOY_PRODUCTION", json!({}))
        .await
        .expect("first deploy");
    assert_eq!(
        outcome.window_boundary,
        Some(WindowBoundary::HistoryStart { scanned: 2 })
    );
    let posts = workspace.posts().await;
    assert_eq!(
        posts[0].1.section_texts(),
        vec!["• Pushover alerts for production", "• initial commit"]
    );
}
