use std::path::Path;

use anyhow::{Context, Result};
use herald_core::RepoRef;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
/// Workflow facts sourced once by the host layer and handed to the dispatcher.
pub struct EventContext {
    pub repo: RepoRef,
    pub sha: Option<String>,
    pub payload: Value,
}

impl EventContext {
    pub fn new(repo: RepoRef, sha: Option<String>, payload: Value) -> Self {
        Self {
            repo,
            sha: sha
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            payload,
        }
    }

    pub fn load(repository: &str, sha: Option<String>, event_path: &Path) -> Result<Self> {
        let repo = RepoRef::parse(repository)?;
        let raw = std::fs::read_to_string(event_path)
            .with_context(|| format!("failed to read event payload {}", event_path.display()))?;
        let payload = serde_json::from_str::<Value>(&raw)
            .with_context(|| format!("failed to parse event payload {}", event_path.display()))?;
        Ok(Self::new(repo, sha, payload))
    }
}
