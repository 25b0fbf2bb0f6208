//! Pipeline error types and error categorization
//!
//! Errors are categorized to route postpone/dead-letter policy:
//! - **Configuration**: Wiring problems (missing capability), fatal to the current message only
//! - **Validation**: Malformed payload, handled by guard middleware
//! - **Transport**: Queue/network failures, including invalidated handles
//! - **Business**: Terminal handler failures
//! - **Cancelled**: Cooperative early exit, not a failure

use thiserror::Error;

/// Category of error for routing retry and dead-letter decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing capability or mismatched wiring - fails the current message only
    Configuration,
    /// Payload rejected before reaching the handler
    Validation,
    /// Queue or network failure - retrying can plausibly succeed
    Transport,
    /// Handler-level failure - retry policy belongs to the caller
    Business,
    /// Deliberate early exit via the cancellation signal
    Cancelled,
}

impl ErrorCategory {
    /// Whether a retry can plausibly change the outcome
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transport)
    }

    /// Stable label for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Transport => "transport",
            ErrorCategory::Business => "business",
            ErrorCategory::Cancelled => "cancelled",
        }
    }
}

/// Message processing errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A capability was requested that the source never registered
    #[error("Capability not configured: {0}")]
    CapabilityNotConfigured(&'static str),

    /// The message handle was superseded or has expired
    #[error("Handle no longer valid: {0}")]
    HandleInvalid(String),

    /// Queue or network failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or rejected payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Terminal handler failure
    #[error("Handler error: {0}")]
    Handler(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Processing abandoned via the cancellation signal
    #[error("Processing cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        PipelineError::Transport(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation(message.into())
    }

    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        PipelineError::Handler(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        PipelineError::Config(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PipelineError::Internal(message.into())
    }

    /// Create a handle-invalid error
    pub fn handle_invalid(message: impl Into<String>) -> Self {
        PipelineError::HandleInvalid(message.into())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::CapabilityNotConfigured(_) => ErrorCategory::Configuration,
            PipelineError::HandleInvalid(_) => ErrorCategory::Transport,
            PipelineError::Transport(_) => ErrorCategory::Transport,
            PipelineError::Validation(_) => ErrorCategory::Validation,
            PipelineError::Handler(_) => ErrorCategory::Business,
            PipelineError::Serialization(_) => ErrorCategory::Validation,
            PipelineError::Config(_) => ErrorCategory::Configuration,
            PipelineError::Cancelled => ErrorCategory::Cancelled,
            PipelineError::Internal(_) => ErrorCategory::Business,
        }
    }

    /// Check whether this is the cancellation signal surfacing, not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Check whether the message handle was lost to another consumer
    pub fn is_handle_invalid(&self) -> bool {
        matches!(self, PipelineError::HandleInvalid(_))
    }

    /// Check whether a required capability was missing from the context
    pub fn is_capability_missing(&self) -> bool {
        matches!(self, PipelineError::CapabilityNotConfigured(_))
    }

    /// Check whether retrying can plausibly succeed.
    ///
    /// An invalidated handle is a transport condition but never retryable:
    /// the claim on the message is gone for good.
    pub fn is_retryable(&self) -> bool {
        !self.is_handle_invalid() && self.category().is_retryable()
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}
