//! Scope handles and the collaborator boundary
//!
//! A [`ScopeHandle`] is a cheap, cloneable reference to one isolated
//! resolution context. Anything able to create and dispose such contexts
//! implements [`ScopeFactory`]; the executor never needs more than that.

use crate::error::ScopeError;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique scope identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub Uuid);

impl ScopeId {
    /// Generate new scope ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type key used to look up a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceKey {
    /// Key for service type `T`
    #[inline]
    #[must_use]
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Runtime type identifier
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Human-readable type name
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Type-erased service instance
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// One isolated resolution context, as seen by the core
pub trait ServiceScope: Send + Sync {
    /// Identifier of this scope
    fn id(&self) -> ScopeId;

    /// Resolve a service by key
    ///
    /// # Errors
    /// - `ScopeError::Unresolved` if the key is not registered
    /// - `ScopeError::Disposed` if the scope was already disposed
    fn resolve_erased(&self, key: ServiceKey) -> Result<ServiceInstance, ScopeError>;
}

/// Typed resolution view over a [`ServiceScope`]
///
/// Handed to service factories so they can pull their own dependencies
/// from the scope being resolved.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    scope: &'a dyn ServiceScope,
}

impl<'a> Resolver<'a> {
    /// Wrap a scope
    #[inline]
    #[must_use]
    pub fn new(scope: &'a dyn ServiceScope) -> Self {
        Self { scope }
    }

    /// Scope the resolver reads from
    #[inline]
    #[must_use]
    pub fn scope_id(&self) -> ScopeId {
        self.scope.id()
    }

    /// Resolve service `T`
    ///
    /// # Errors
    /// Propagates the scope's error; `ScopeError::TypeMismatch` if the
    /// registered instance is not a `T`.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ScopeError> {
        let key = ServiceKey::of::<T>();
        self.scope
            .resolve_erased(key)?
            .downcast::<T>()
            .map_err(|_| ScopeError::TypeMismatch {
                expected: key.type_name(),
            })
    }
}

/// Cloneable reference to a live scope
#[derive(Clone)]
pub struct ScopeHandle {
    inner: Arc<dyn ServiceScope>,
}

impl ScopeHandle {
    /// Wrap a scope implementation
    #[inline]
    #[must_use]
    pub fn new(scope: Arc<dyn ServiceScope>) -> Self {
        Self { inner: scope }
    }

    /// Identifier of the underlying scope
    #[inline]
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.inner.id()
    }

    /// Resolve service `T` from this scope
    ///
    /// # Errors
    /// See [`Resolver::resolve`].
    #[inline]
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ScopeError> {
        self.resolver().resolve::<T>()
    }

    /// Typed resolver borrowing this handle
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.inner.as_ref())
    }

    /// Check whether two handles point at the same scope
    #[inline]
    #[must_use]
    pub fn same_scope(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeHandle").field(&self.id()).finish()
    }
}

/// Creates and disposes scopes on behalf of the executor
///
/// Implementations must tolerate concurrent calls. The executor calls
/// [`dispose_scope`](Self::dispose_scope) exactly once for every handle
/// returned by [`create_scope`](Self::create_scope).
pub trait ScopeFactory: Send + Sync {
    /// Create an isolated scope
    ///
    /// # Errors
    /// `ScopeError::Creation` when no scope can be produced.
    fn create_scope(&self) -> Result<ScopeHandle, ScopeError>;

    /// Release everything the scope owns
    fn dispose_scope(&self, scope: ScopeHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        id: ScopeId,
        value: ServiceInstance,
    }

    impl ServiceScope for Fixed {
        fn id(&self) -> ScopeId {
            self.id
        }

        fn resolve_erased(&self, key: ServiceKey) -> Result<ServiceInstance, ScopeError> {
            if key.type_name().contains("u32") {
                Ok(self.value.clone())
            } else {
                Err(ScopeError::Unresolved {
                    type_name: key.type_name(),
                })
            }
        }
    }

    fn handle() -> ScopeHandle {
        ScopeHandle::new(Arc::new(Fixed {
            id: ScopeId::new(),
            value: Arc::new(7_u64),
        }))
    }

    #[test]
    fn scope_ids_are_unique() {
        assert_ne!(ScopeId::new(), ScopeId::new());
    }

    #[test]
    fn resolve_reports_type_mismatch() {
        // The fake answers u32 requests with a u64 instance.
        let err = handle().resolve::<u32>().unwrap_err();
        assert_eq!(err, ScopeError::TypeMismatch { expected: "u32" });
    }

    #[test]
    fn resolve_reports_unresolved() {
        let err = handle().resolve::<String>().unwrap_err();
        assert!(err.is_unresolved());
    }

    #[test]
    fn clones_share_the_scope() {
        let a = handle();
        let b = a.clone();
        assert!(a.same_scope(&b));
        assert!(!a.same_scope(&handle()));
        assert!(format!("{a:?}").starts_with("ScopeHandle("));
    }
}
