//! Workflow-runner integration: step outputs and failure annotations.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use herald_runtime::DispatchOutcome;
use tracing::error;

pub(crate) fn outcome_outputs(outcome: &DispatchOutcome) -> Vec<(&'static str, String)> {
    let mut outputs = vec![
        ("result", "success".to_string()),
        ("channel-name", outcome.channel_name.to_string()),
    ];
    if let Some(channel_id) = &outcome.channel_id {
        outputs.push(("channel-id", channel_id.clone()));
    }
    outputs
}

/// Appends outputs to the step output file, or prints legacy `::set-output`
/// commands when the runner did not provide one.
pub(crate) fn write_outputs(
    output_path: Option<&Path>,
    outcome: &DispatchOutcome,
    stdout: &mut impl Write,
) -> Result<()> {
    let outputs = outcome_outputs(outcome);
    match output_path {
        Some(path) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open step output file {}", path.display()))?;
            for (name, value) in &outputs {
                writeln!(file, "{name}={value}").with_context(|| {
                    format!("failed to write step output file {}", path.display())
                })?;
            }
        }
        None => {
            for (name, value) in &outputs {
                writeln!(
                    stdout,
                    "::set-output name={name}::{}",
                    escape_workflow_command(value)
                )
                .context("failed to write step outputs")?;
            }
        }
    }
    Ok(())
}

pub(crate) fn escape_workflow_command(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

pub(crate) fn report_failure(failure: &anyhow::Error, stdout: &mut impl Write) {
    let rendered = format!("{failure:#}");
    error!(error = %rendered, "herald run failed");
    // Nothing left to report to if stdout is gone.
    let _ = writeln!(stdout, "::error::{}", escape_workflow_command(&rendered));
}
