//! GitHub REST collaborator for Herald.
//!
//! Implements the `IssueTracker` contract (pull request lookup, labelling and
//! commit listing) with retrying transport helpers.

pub mod github_api_client;
pub mod github_transport_helpers;

pub use github_api_client::{GithubApiClient, DEFAULT_GITHUB_API_BASE};
