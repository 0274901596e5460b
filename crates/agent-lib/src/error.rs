//! Error types for collaborator calls made by the control loop

use serde::Serialize;
use std::fmt;

/// How a collaborator failure should be treated
///
/// Both kinds are logged and retried on a later cycle; the split exists so
/// metrics and alerting can tell an unreachable backend from one returning
/// garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Backend unreachable, timed out, or returned a failure status
    Transient,
    /// Backend answered but the payload was missing fields or malformed
    DataShape,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::DataShape => "data_shape",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure from a metrics provider, executor, power meter or record file
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// Connection, timeout or protocol failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response did not have the expected shape
    #[error("Malformed response: {0}")]
    DataShape(String),

    /// External command ran and exited unsuccessfully
    #[error("Command `{program}` exited with {code:?}: {stderr}")]
    Command {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// External command is not installed
    #[error("Required tool not found: {0}")]
    MissingTool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl CollaboratorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CollaboratorError::DataShape(_) => FailureKind::DataShape,
            _ => FailureKind::Transient,
        }
    }

    pub fn data_shape(message: impl Into<String>) -> Self {
        CollaboratorError::DataShape(message.into())
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CollaboratorError::DataShape(err.to_string())
        } else if let Some(status) = err.status() {
            CollaboratorError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            CollaboratorError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::DataShape(err.to_string())
    }
}

/// Result type for collaborator calls
pub type Result<T> = std::result::Result<T, CollaboratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            CollaboratorError::data_shape("no data field").kind(),
            FailureKind::DataShape
        );
        assert_eq!(
            CollaboratorError::Transport("connection refused".into()).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            CollaboratorError::MissingTool("ipmitool".into()).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            CollaboratorError::Status {
                status: 503,
                body: String::new()
            }
            .kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CollaboratorError = json_err.into();
        assert_eq!(err.kind(), FailureKind::DataShape);
    }

    #[test]
    fn test_error_display() {
        let err = CollaboratorError::Command {
            program: "ipmitool".into(),
            code: Some(1),
            stderr: "Unable to establish session".into(),
        };
        let message = err.to_string();
        assert!(message.contains("ipmitool"));
        assert!(message.contains("Unable to establish session"));
        assert_eq!(FailureKind::DataShape.to_string(), "data_shape");
    }
}
