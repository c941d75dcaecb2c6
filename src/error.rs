/*!
 * Error types for Faultline
 */

use faultline_core_rules::RuleError;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FaultError>;

/// Failure reported by a resolution collaborator (caches, resolvers, endpoint directory)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The named resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The service asked the caller to back off
    #[error("Throttled, retry after {retry_after:?}")]
    Throttled { retry_after: Duration },

    /// Network-level failure that may succeed on retry
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Failure that will not go away on retry
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl CollaboratorError {
    /// Whether a generic network retry may help
    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Transient(_))
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, CollaboratorError::Throttled { .. })
    }
}

#[derive(Debug, Error)]
pub enum FaultError {
    /// Invalid engine or rule configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Container, region, partitions, or addresses could not be resolved
    #[error("Resolution error: {what}: {source}")]
    Resolution {
        what: String,
        #[source]
        source: CollaboratorError,
    },

    /// Rule shape the active client cannot honour
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Rule validation failed
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Rule, topology, or engine file could not be parsed
    #[error("Failed to parse {what}: {message}")]
    ConfigParse { what: String, message: String },
}

impl FaultError {
    /// Check if this error is fatal (retrying the same registration cannot help)
    pub fn is_fatal(&self) -> bool {
        match self {
            FaultError::Configuration(_)
            | FaultError::UnsupportedConfiguration(_)
            | FaultError::Rule(_)
            | FaultError::ConfigParse { .. } => true,
            FaultError::Resolution { source, .. } => {
                !(source.is_transient() || source.is_throttled())
            }
            FaultError::Io(_) => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            FaultError::Configuration(_) | FaultError::ConfigParse { .. } => {
                ErrorCategory::Configuration
            }
            FaultError::Rule(RuleError::UnsupportedErrorKind(_)) => ErrorCategory::Unsupported,
            FaultError::Rule(_) => ErrorCategory::Validation,
            FaultError::Resolution { .. } => ErrorCategory::Resolution,
            FaultError::UnsupportedConfiguration(_) => ErrorCategory::Unsupported,
            FaultError::Io(_) => ErrorCategory::IoError,
        }
    }

    /// Resolution of `what` failed with `source`
    pub fn resolution(what: impl Into<String>, source: CollaboratorError) -> Self {
        FaultError::Resolution {
            what: what.into(),
            source,
        }
    }

    /// Collaborator failure behind a resolution error
    pub fn collaborator_error(&self) -> Option<&CollaboratorError> {
        match self {
            FaultError::Resolution { source, .. } => Some(source),
            _ => None,
        }
    }

    pub(crate) fn parse(what: impl Into<String>, err: impl fmt::Display) -> Self {
        FaultError::ConfigParse {
            what: what.into(),
            message: err.to_string(),
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Engine or file configuration errors
    Configuration,
    /// Rule validation errors
    Validation,
    /// Container/region/partition/address resolution errors
    Resolution,
    /// Rule shapes or error kinds that cannot be honoured
    Unsupported,
    /// I/O operation errors
    IoError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Resolution => write!(f, "resolution"),
            ErrorCategory::Unsupported => write!(f, "unsupported"),
            ErrorCategory::IoError => write!(f, "io"),
        }
    }
}
