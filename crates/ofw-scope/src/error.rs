//! Error types for scope management
//!
//! Covers:
//! - Scope creation failures reported by the collaborator
//! - Unregistered or mistyped service requests
//! - Binding violations (re-entrant bind, resolve outside an invocation)
//! - Use of a scope after disposal

use crate::handle::ScopeId;

/// Errors raised by scope creation, binding and resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The collaborator could not create a scope
    #[error("scope creation failed: {0}")]
    Creation(String),

    /// Requested service type is not registered
    #[error("unresolved dependency: {type_name}")]
    Unresolved {
        /// Name of the requested type
        type_name: &'static str,
    },

    /// Registered instance does not have the requested type
    #[error("service type mismatch: expected {expected}")]
    TypeMismatch {
        /// Name of the requested type
        expected: &'static str,
    },

    /// A scope is already bound on this logical path
    #[error("scope {existing} is already bound to the current invocation")]
    AlreadyBound {
        /// The scope currently bound
        existing: ScopeId,
    },

    /// No scope is bound on this logical path
    #[error("no scope is bound to the current invocation")]
    NotBound,

    /// The scope was disposed before the request
    #[error("scope {0} has been disposed")]
    Disposed(ScopeId),

    /// A factory re-entered resolution of its own type
    #[error("circular dependency while resolving {type_name}")]
    Cycle {
        /// Name of the type that was requested again
        type_name: &'static str,
    },

    /// A service factory reported failure
    #[error("factory for {type_name} failed: {message}")]
    Factory {
        /// Name of the type being constructed
        type_name: &'static str,
        /// Factory-provided reason
        message: String,
    },
}

impl ScopeError {
    /// Check if the error signals a binding invariant breach
    #[inline]
    #[must_use]
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::AlreadyBound { .. } | Self::NotBound | Self::Disposed(_))
    }

    /// Check if the error is an unregistered dependency
    #[inline]
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved { .. } | Self::Cycle { .. })
    }

    /// Create a factory failure for `T`
    #[inline]
    pub fn factory<T: ?Sized>(message: impl Into<String>) -> Self {
        Self::Factory {
            type_name: std::any::type_name::<T>(),
            message: message.into(),
        }
    }
}
