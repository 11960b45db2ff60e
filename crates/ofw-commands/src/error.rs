//! Error types for command execution
//!
//! Failures keep their identity on the way out of the executor:
//! - scope errors are carried as-is in [`CommandError::Scope`]
//! - domain errors raised by commands or middleware travel in
//!   [`CommandError::Domain`] and can be downcast back to their own type
//! - cancellation is a distinct variant, never folded into a fault

use ofw_scope::ScopeError;
use std::error::Error as StdError;

/// Main command execution error type
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Malformed invocation, rejected before any scope exists
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal invariant breach
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Scope creation, binding or resolution failure
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Shared data key absent
    #[error("shared data key not found: {key}")]
    NotFound {
        /// Missing key
        key: String,
    },

    /// Shared data value stored under a different type
    #[error("shared data key {key} does not hold a {expected}")]
    TypeMismatch {
        /// Key that was read
        key: String,
        /// Requested type
        expected: &'static str,
    },

    /// Chain finished without producing the command's result
    #[error("command {command} completed without a result")]
    MissingResult {
        /// Command name
        command: &'static str,
    },

    /// Cooperative cancellation observed
    #[error("operation canceled")]
    Canceled,

    /// Invocation exceeded the configured timeout
    #[error("command {command} timed out after {duration_ms}ms")]
    Timeout {
        /// Command name
        command: &'static str,
        /// Configured limit
        duration_ms: u64,
    },

    /// Error raised by command or middleware logic
    #[error(transparent)]
    Domain(#[from] anyhow::Error),
}

/// Coarse classification of a [`CommandError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected call
    InvalidArgument,
    /// Programming defect or misuse of the accessor
    IllegalState,
    /// Requested dependency is not registered
    UnresolvedDependency,
    /// Collaborator failed to provide a scope
    ScopeCreation,
    /// Shared data lookup failed
    NotFound,
    /// Cooperative cancellation
    Canceled,
    /// Configured time limit elapsed
    Timeout,
    /// Application error
    Domain,
}

impl CommandError {
    /// Wrap an application error
    #[inline]
    pub fn domain<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Domain(anyhow::Error::new(error))
    }

    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::IllegalState(_) | Self::MissingResult { .. } => ErrorKind::IllegalState,
            Self::Scope(scope) => match scope {
                ScopeError::Unresolved { .. } | ScopeError::Cycle { .. } | ScopeError::Factory { .. } => {
                    ErrorKind::UnresolvedDependency
                }
                ScopeError::Creation(_) => ErrorKind::ScopeCreation,
                ScopeError::TypeMismatch { .. }
                | ScopeError::AlreadyBound { .. }
                | ScopeError::NotBound
                | ScopeError::Disposed(_) => ErrorKind::IllegalState,
            },
            Self::NotFound { .. } | Self::TypeMismatch { .. } => ErrorKind::NotFound,
            Self::Canceled => ErrorKind::Canceled,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Domain(_) => ErrorKind::Domain,
        }
    }

    /// Check if the invocation was abandoned by cancellation
    #[inline]
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Borrow the original application error as `E`
    #[must_use]
    pub fn downcast_domain_ref<E>(&self) -> Option<&E>
    where
        E: StdError + Send + Sync + 'static,
    {
        match self {
            Self::Domain(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ofw_scope::ScopeId;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("insufficient funds: {0}")]
    struct InsufficientFunds(u32);

    #[test]
    fn domain_errors_keep_their_type() {
        let err = CommandError::domain(InsufficientFunds(10));
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert_eq!(err.to_string(), "insufficient funds: 10");
        assert_eq!(err.downcast_domain_ref::<InsufficientFunds>(), Some(&InsufficientFunds(10)));
        assert!(err.downcast_domain_ref::<std::fmt::Error>().is_none());
    }

    #[test]
    fn scope_errors_are_classified() {
        let unresolved = CommandError::from(ScopeError::Unresolved { type_name: "Mailer" });
        assert_eq!(unresolved.kind(), ErrorKind::UnresolvedDependency);
        assert_eq!(unresolved.to_string(), "unresolved dependency: Mailer");

        let rebound = CommandError::from(ScopeError::AlreadyBound { existing: ScopeId::new() });
        assert_eq!(rebound.kind(), ErrorKind::IllegalState);

        let creation = CommandError::from(ScopeError::Creation("pool closed".into()));
        assert_eq!(creation.kind(), ErrorKind::ScopeCreation);

        let cycle = CommandError::from(ScopeError::Cycle { type_name: "Mailer" });
        assert_eq!(cycle.kind(), ErrorKind::UnresolvedDependency);
    }

    #[test]
    fn cancellation_is_distinct() {
        assert!(CommandError::Canceled.is_canceled());
        assert_eq!(CommandError::Canceled.kind(), ErrorKind::Canceled);
        assert!(!CommandError::InvalidArgument("x".into()).is_canceled());
    }

    #[test]
    fn anyhow_converts_to_domain() {
        let err: CommandError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert_eq!(err.to_string(), "boom");
    }
}
