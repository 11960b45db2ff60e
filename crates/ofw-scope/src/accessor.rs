//! Ambient scope binding
//!
//! The current scope is stored in a tokio task-local. A binding belongs to
//! the future it wraps: every `.await` inside that future, however deep,
//! observes the same [`ScopeHandle`], while other tasks never do.
//!
//! # Binding rules
//!
//! - Binding is refused while a scope is already bound on the same path.
//! - The binding ends when the wrapped future completes *or is dropped*, so
//!   there is no explicit unbind to forget.
//! - `tokio::spawn`ed work starts unbound. Use [`ScopeAccessor::spawn`],
//!   [`ScopeAccessor::spawn_blocking`] or [`ScopeAccessor::propagate`] to
//!   carry the scope into fan-out work on purpose.

use crate::error::ScopeError;
use crate::handle::ScopeHandle;
use futures::future::Either;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::task::futures::TaskLocalFuture;
use tokio::task::JoinHandle;

tokio::task_local! {
    static CURRENT_SCOPE: ScopeHandle;
}

/// Future carrying a scope binding
pub type Bound<F> = TaskLocalFuture<ScopeHandle, F>;

/// Future that carries the caller's binding, if it had one
pub type Propagated<F> = Either<Bound<F>, F>;

/// Access to the scope bound to the running invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeAccessor;

impl ScopeAccessor {
    /// Scope bound to the current logical path, if any
    #[inline]
    #[must_use]
    pub fn current() -> Option<ScopeHandle> {
        CURRENT_SCOPE.try_with(ScopeHandle::clone).ok()
    }

    /// Check if a scope is bound on the current path
    #[inline]
    #[must_use]
    pub fn is_bound() -> bool {
        CURRENT_SCOPE.try_with(|_| ()).is_ok()
    }

    /// Resolve `T` from the current scope
    ///
    /// # Errors
    /// - `ScopeError::NotBound` outside an invocation
    /// - any resolution error from the scope itself
    pub fn resolve<T: Any + Send + Sync>() -> Result<Arc<T>, ScopeError> {
        Self::current().ok_or(ScopeError::NotBound)?.resolve::<T>()
    }

    /// Bind `scope` for the lifetime of `future`
    ///
    /// # Errors
    /// `ScopeError::AlreadyBound` if the caller already runs inside a scope.
    pub fn bind<F: Future>(scope: ScopeHandle, future: F) -> Result<Bound<F>, ScopeError> {
        Self::ensure_unbound()?;
        tracing::trace!(scope = %scope.id(), "scope bound");
        Ok(CURRENT_SCOPE.scope(scope, future))
    }

    /// Bind `scope` while running the synchronous closure `f`
    ///
    /// # Errors
    /// `ScopeError::AlreadyBound` if the caller already runs inside a scope.
    pub fn bind_sync<R>(scope: ScopeHandle, f: impl FnOnce() -> R) -> Result<R, ScopeError> {
        Self::ensure_unbound()?;
        Ok(CURRENT_SCOPE.sync_scope(scope, f))
    }

    /// Wrap `future` so it observes the caller's scope wherever it is polled
    pub fn propagate<F: Future>(future: F) -> Propagated<F> {
        match Self::current() {
            Some(scope) => Either::Left(CURRENT_SCOPE.scope(scope, future)),
            None => Either::Right(future),
        }
    }

    /// Spawn a task that inherits the caller's scope
    pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(Self::propagate(future))
    }

    /// Run blocking work on the blocking pool with the caller's scope bound
    pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let scope = Self::current();
        tokio::task::spawn_blocking(move || match scope {
            Some(scope) => CURRENT_SCOPE.sync_scope(scope, f),
            None => f(),
        })
    }

    fn ensure_unbound() -> Result<(), ScopeError> {
        match Self::current() {
            Some(existing) => Err(ScopeError::AlreadyBound {
                existing: existing.id(),
            }),
            None => Ok(()),
        }
    }
}
