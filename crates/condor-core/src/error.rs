//! Error types shared across the condor pipeline.

use std::borrow::Cow;

use crate::module::ModuleRole;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for pipeline operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Enqueue suppressed by the dedup cache. The expected deduplication
    /// outcome, not a failure.
    #[error("document already exists")]
    AlreadyExists,

    /// No module is registered under the requested name.
    #[error("module '{name}' is not registered")]
    ModuleNotFound { name: String },

    /// A module is registered under a different role than required.
    #[error("module '{name}' has the wrong role, expected {expected}")]
    WrongRole { name: String, expected: ModuleRole },

    /// Module configuration was rejected.
    #[error("invalid module configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Queue backend operation failed.
    #[error("queue operation failed: {operation} - {details}")]
    Queue { operation: String, details: String },

    /// Document wire-form (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Module-internal failure surfaced to a pipeline stage.
    #[error("{message}")]
    Module {
        message: Cow<'static, str>,
        #[source]
        source: Option<BoxedError>,
    },
}

impl Error {
    /// Whether this is the soft dedup outcome of an enqueue.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }

    /// Creates a queue backend error with operation context.
    pub fn queue(operation: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Queue {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// Creates a configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Creates a module failure with a message.
    pub fn module(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Module {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a module failure with a message and source.
    pub fn module_with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Module {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_predicate() {
        assert!(Error::AlreadyExists.is_already_exists());
        assert!(!Error::queue("lpush", "connection refused").is_already_exists());
    }

    #[test]
    fn wrong_role_names_the_expected_role() {
        let err = Error::WrongRole {
            name: "redis".into(),
            expected: ModuleRole::Input,
        };
        assert_eq!(
            err.to_string(),
            "module 'redis' has the wrong role, expected input"
        );
    }
}
