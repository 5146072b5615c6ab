//! Error types for the watchdog.
//!
//! Only transport and protocol problems are errors. Semantic mismatches
//! found by the checker (wrong commit, missing artifact, failed deploy) are
//! recorded on the stage outcome instead.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = WatchdogError> = std::result::Result<T, E>;

/// The main error type for watchdog operations.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with a non-2xx status.
    #[error("[Status Code {status}]: {body}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// A URL could not be built from the base URL and path.
    #[error("invalid url: {0}")]
    Url(String),

    /// Configuration is missing or invalid.
    #[error("config error: {0}")]
    Config(String),

    /// The chat webhook rejected the message.
    #[error("notify error: {0}")]
    Notify(String),

    /// A workflow task failed.
    #[error("task {task} failed: {message}")]
    Task {
        /// Task name.
        task: String,
        /// Failure description.
        message: String,
    },

    /// A generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WatchdogError {
    /// Creates a client error from a status code and body.
    #[must_use]
    pub fn client(status: u16, body: impl Into<String>) -> Self {
        Self::Client {
            status,
            body: body.into(),
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates a config error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a task error.
    #[must_use]
    pub fn task(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Task {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Returns true if the connection could not be established.
    ///
    /// Only these are retried at the client layer: the request never reached
    /// the server, so resending cannot duplicate a commit or a message. A
    /// timed-out request may already have been processed and is not retried.
    #[must_use]
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_connect())
    }
}

impl From<serde_json::Error> for WatchdogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_message() {
        let err = WatchdogError::client(404, "not found");
        assert_eq!(err.to_string(), "[Status Code 404]: not found");
        assert!(!err.is_connect_failure());
    }

    #[test]
    fn test_task_error_message() {
        let err = WatchdogError::task("deploy-check", "boom");
        assert_eq!(err.to_string(), "task deploy-check failed: boom");
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: WatchdogError = parse_err.into();
        assert!(matches!(err, WatchdogError::Decode(_)));
    }
}
