//! CLI argument models and validation for the Herald action binary.
//!
//! Every flag also reads the environment variable the action runner sets, so
//! the binary runs unchanged inside a workflow step.

pub mod cli_args;

pub use cli_args::{parse_slack_user_ids, Cli};
