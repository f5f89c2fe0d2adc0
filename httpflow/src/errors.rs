//! Error types for the httpflow pipeline.
//!
//! Faults fall into four families: a referenced policy is missing, a policy
//! name collides, a mutation or `Next` call breaks the chain's temporal
//! rules, or the transport failed. Only the last one is ever retried.

use std::collections::HashMap;
use thiserror::Error;

/// The main error type for httpflow operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A base policy referenced by a mutation does not exist.
    #[error("{0}")]
    NotFound(#[from] PolicyNotFoundError),

    /// A policy name collides with an existing one.
    #[error("{0}")]
    NameConflict(#[from] NameConflictError),

    /// A mutation would rewrite executed history, or `Next` was misused.
    #[error("{0}")]
    IllegalState(#[from] IllegalStateError),

    /// The transport failed to produce a response.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// The call was cancelled before it completed.
    #[error("Call cancelled: {0}")]
    Cancelled(String),

    /// A bulk patch kept asking for another pass.
    #[error("Patch did not converge after {passes} passes")]
    PatchDiverged {
        /// Number of passes run before giving up.
        passes: usize,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Returns a stable code for the error category.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "POLICY-NOT-FOUND",
            Self::NameConflict(_) => "POLICY-NAME-CONFLICT",
            Self::IllegalState(_) => "ILLEGAL-STATE",
            Self::Transport(_) => "TRANSPORT",
            Self::Cancelled(_) => "CANCELLED",
            Self::PatchDiverged { .. } => "PATCH-DIVERGED",
            Self::Config(_) => "CONFIG",
            Self::Io(_) => "IO",
        }
    }

    /// Returns true for transport faults, the only retryable category.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if the call was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::NotFound(err) => {
                map.insert("policy".to_string(), serde_json::json!(err.name));
            }
            Self::NameConflict(err) => {
                map.insert("policy".to_string(), serde_json::json!(err.name));
            }
            Self::Transport(err) => {
                map.insert("kind".to_string(), serde_json::json!(err.kind.as_str()));
            }
            Self::PatchDiverged { passes } => {
                map.insert("passes".to_string(), serde_json::json!(passes));
            }
            _ => {}
        }

        map
    }
}

/// Error raised when a mutation names a base policy that is not in the chain.
#[derive(Debug, Clone, Error)]
#[error("There is no policy with the name '{name}'")]
pub struct PolicyNotFoundError {
    /// The missing base policy name.
    pub name: String,
}

impl PolicyNotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Error raised when a policy name is already taken (case-insensitive).
#[derive(Debug, Clone, Error)]
#[error("A policy with the name '{name}' already exists")]
pub struct NameConflictError {
    /// The conflicting name.
    pub name: String,
}

impl NameConflictError {
    /// Creates a new name conflict error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Error raised on a temporal-safety violation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct IllegalStateError {
    /// The error message.
    pub message: String,
}

impl IllegalStateError {
    /// Creates a new illegal state error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn already_started(name: &str) -> Self {
        Self::new(format!(
            "Cannot add policy '{name}' in the beginning, the request already went through the first policy"
        ))
    }

    pub(crate) fn after_executed(base: &str, name: &str) -> Self {
        Self::new(format!(
            "Cannot add the policy '{name}' after '{base}', the request already went through '{base}' and its next policy"
        ))
    }

    pub(crate) fn before_executed(base: &str, name: &str) -> Self {
        Self::new(format!(
            "Cannot add the policy '{name}' before '{base}', the request already went through '{base}'"
        ))
    }

    pub(crate) fn replace_executed(base: &str) -> Self {
        Self::new(format!(
            "Cannot replace the policy '{base}', the request already went through '{base}'"
        ))
    }

    pub(crate) fn next_reinvoked(owner: &str) -> Self {
        Self::new(format!(
            "Policy '{owner}' called next.process() more than once"
        ))
    }
}

/// Category of a transport fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not establish a connection.
    Connect,
    /// The request or response timed out.
    Timeout,
    /// Reading or writing a body failed.
    Body,
    /// Any other transport failure.
    Other,
}

impl TransportErrorKind {
    /// Returns the kind as a lowercase string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Body => "body",
            Self::Other => "other",
        }
    }
}

/// A network or transport-level failure from the terminal step.
#[derive(Debug, Clone, Error)]
#[error("Transport error ({}): {message}", kind.as_str())]
pub struct TransportError {
    /// The failure category.
    pub kind: TransportErrorKind,
    /// The error message.
    pub message: String,
}

impl TransportError {
    /// Creates a new transport error.
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a connect error.
    #[must_use]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Creates a body error.
    #[must_use]
    pub fn body(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Body, message)
    }

    /// Creates an uncategorized error.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::body(err.to_string())
    }
}
