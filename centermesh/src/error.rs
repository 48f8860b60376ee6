use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for centermesh framework operations
pub type Result<T> = std::result::Result<T, MeshError>;

/// Framework-level failures: connecting, declaring, decoding, configuring
#[derive(Error, Debug)]
pub enum MeshError {
    /// AMQP connection errors
    #[error("AMQP connection error: {0}")]
    Connection(#[from] lapin::Error),

    /// Message serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker cannot be reached or refused the operation
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Service has no channel in the registry
    #[error("Service '{service_name}' has no configured channel")]
    ServiceNotFound { service_name: String },

    /// Pattern registry is missing handlers for declared patterns
    #[error("Missing handlers for patterns: {}", patterns.join(", "))]
    MissingHandlers { patterns: Vec<String> },

    /// Two pattern variants share one wire key
    #[error("Pattern key '{pattern}' is declared more than once")]
    DuplicatePattern { pattern: String },

    /// Invalid message format
    #[error("Invalid message format: {reason}")]
    InvalidMessage { reason: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal framework errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Network I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tokio join errors
    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl MeshError {
    /// Create a new config error
    pub fn config_error<T: ToString>(message: T) -> Self {
        Self::Config(message.to_string())
    }

    /// Create a new internal error
    pub fn internal_error<T: ToString>(message: T) -> Self {
        Self::Internal(message.to_string())
    }

    /// Check if error is recoverable (should be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::BrokerUnavailable(_) | Self::Io(_)
        )
    }
}

impl From<config::ConfigError> for MeshError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// A business-rule failure reported by a worker handler.
///
/// Carried as reply data and handed to the caller with its `kind` untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct DomainError {
    pub kind: String,
    pub message: String,
}

impl DomainError {
    pub const NOT_FOUND: &'static str = "NotFound";
    pub const CONFLICT: &'static str = "Conflict";
    pub const INVALID: &'static str = "Invalid";
    pub const UNAVAILABLE: &'static str = "Unavailable";

    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Self::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Self::CONFLICT, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Self::UNAVAILABLE, message)
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

/// Outcome of a correlated call that did not produce a payload.
///
/// Transport variants are produced by the gateway/dispatcher core; `Domain`
/// is whatever the worker reported, passed through unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// No route table entry or channel for the target
    #[error("No route for '{target}'")]
    Unroutable { target: String },

    /// Broker or channel unreachable at publish time
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// No reply within the deadline
    #[error("RPC call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The worker does not register the pattern
    #[error("Pattern '{pattern}' is not registered by the worker")]
    UnknownPattern { pattern: String },

    /// The pending call was removed before it resolved
    #[error("RPC call cancelled")]
    Cancelled,

    /// Business failure reported by the worker
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RpcError {
    /// Wire-level kind name, as used in reply error descriptors and HTTP bodies
    pub fn kind(&self) -> &str {
        match self {
            Self::Unroutable { .. } => "Unroutable",
            Self::TransportUnavailable(_) => "TransportUnavailable",
            Self::Timeout { .. } => "Timeout",
            Self::UnknownPattern { .. } => UNKNOWN_PATTERN,
            Self::Cancelled => "Cancelled",
            Self::Domain(err) => &err.kind,
        }
    }

    /// True for faults of the messaging layer, false for business rejections
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Domain(_))
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            _ => None,
        }
    }
}

/// Error kind a dispatcher replies with when a pattern has no handler
pub const UNKNOWN_PATTERN: &str = "UnknownPattern";

/// Error kind a dispatcher replies with when an envelope cannot be decoded
pub const INVALID_ENVELOPE: &str = "InvalidEnvelope";
