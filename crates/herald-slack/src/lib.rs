//! Slack Web API collaborator for Herald.
//!
//! Implements the `ChatService` contract on top of the `conversations.*` and
//! `chat.postMessage` methods.

pub mod slack_api_client;
pub mod slack_transport_helpers;

pub use slack_api_client::{SlackApiClient, DEFAULT_SLACK_API_BASE};
