use std::time::Duration;

pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Slack returns `ok: false` with a machine-readable `error` code.
pub fn slack_error_code(error: Option<String>) -> String {
    error
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown_error".to_string())
}

/// Empty cursors mean the listing is exhausted.
pub fn normalize_next_cursor(cursor: Option<String>) -> Option<String> {
    cursor
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
