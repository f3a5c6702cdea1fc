//! Error types for the Sieve domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Only provider failures and configuration problems are hard errors; tool
//! failures are folded back into the conversation as text by the dispatcher.

use thiserror::Error;

/// The top-level error type for all Sieve operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Provider script exhausted after {calls} calls")]
    Exhausted { calls: usize },
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool panicked: {tool_name}: {reason}")]
    Panicked { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Non-fatal conditions observed while scanning a stream.
///
/// These never interrupt generation: the affected span is emitted as plain
/// text and the issue is recorded for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanIssue {
    #[error("directive opened at byte {offset} was never closed")]
    UnterminatedDirective { offset: usize },

    #[error("directive marker at byte {offset} has no tool name terminator")]
    MissingToolName { offset: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::ExecutionFailed {
            tool_name: "search".into(),
            reason: "backend offline".into(),
        });
        assert!(err.to_string().contains("search"));
        assert!(err.to_string().contains("backend offline"));
    }

    #[test]
    fn scan_issue_reports_offset() {
        let issue = ScanIssue::UnterminatedDirective { offset: 12 };
        assert!(issue.to_string().contains("12"));
    }
}
