//! Error types for rule construction and synthetic error injection

use crate::result::ServerErrorKind;
use thiserror::Error;

/// Errors raised while building rules or synthesizing injected failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The rule, condition, or result was declared with missing or invalid fields
    #[error("Invalid rule configuration: {0}")]
    Configuration(String),

    /// The injector has no synthetic error shape for this kind
    #[error("Unsupported error kind for synthetic error: {0}")]
    UnsupportedErrorKind(ServerErrorKind),
}

impl RuleError {
    /// Shorthand used by the builders
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        RuleError::Configuration(msg.into())
    }

    /// Check if this error was caused by how the rule was declared
    pub fn is_configuration(&self) -> bool {
        matches!(self, RuleError::Configuration(_))
    }
}
