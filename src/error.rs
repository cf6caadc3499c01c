//! Error handling for the devlink runtime
//!
//! This module defines the crate-level error type and a Result alias for use
//! throughout the session, queue and transport layers. Graph construction has
//! its own [`PipelineError`] which converts into [`DevLinkError`].

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for devlink operations
#[derive(Error, Debug)]
pub enum DevLinkError {
    /// Graph construction or validation failed
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// The coprocessor refused the submitted graph
    #[error("Graph rejected by device: {0}")]
    GraphRejected(String),

    /// `start` was called on a session that is already running
    #[error("Pipeline is already running")]
    AlreadyRunning,

    /// Operation not allowed in the current session state
    #[error("Invalid session state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    /// Requested a queue for a stream the submitted graph does not declare
    #[error("Unknown stream '{0}'")]
    UnknownStream(String),

    /// A payload or packet could not be decoded
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The stream's worker hit a transport failure or the session was closed
    #[error("Stream '{stream}' is broken: {reason}")]
    StreamBroken { stream: String, reason: String },

    /// Errors raised by the transport layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Errors on the control channel
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DevLinkError>,
    },
}

impl DevLinkError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DevLinkError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a broken-stream error
    pub fn stream_broken(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        DevLinkError::StreamBroken {
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error (or the error it wraps) is a broken stream
    pub fn is_stream_broken(&self) -> bool {
        match self {
            DevLinkError::StreamBroken { .. } => true,
            DevLinkError::WithContext { source, .. } => source.is_stream_broken(),
            _ => false,
        }
    }
}

impl From<rmp_serde::encode::Error> for DevLinkError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        DevLinkError::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for DevLinkError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        DevLinkError::Serialization(err.to_string())
    }
}

/// Result type alias for devlink operations
pub type Result<T> = std::result::Result<T, DevLinkError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DevLinkError::UnknownStream("missing".to_string());
        assert_eq!(err.to_string(), "Unknown stream 'missing'");
    }

    #[test]
    fn test_error_with_context() {
        let err = DevLinkError::Transport("link down".to_string());
        let with_ctx = err.with_context("Failed to open stream");
        assert!(with_ctx.to_string().contains("Failed to open stream"));
        assert!(with_ctx.to_string().contains("link down"));
    }

    #[test]
    fn test_stream_broken_through_context() {
        let err = DevLinkError::stream_broken("out", "read failed").with_context("get");
        assert!(err.is_stream_broken());
        assert!(!DevLinkError::AlreadyRunning.is_stream_broken());
    }

    #[test]
    fn test_result_ext() {
        let res: Result<()> = Err(DevLinkError::Rpc("timeout".into()));
        let err = res.context("ping").unwrap_err();
        assert_eq!(err.to_string(), "ping: RPC error: timeout");
    }
}
