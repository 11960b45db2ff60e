//! Per-invocation execution context
//!
//! Everything a middleware or command body may touch during one
//! invocation: the command itself, the shared data bag, the cancellation
//! token, the result slot and the invocation's scope.

use crate::error::CommandError;
use crate::shared_data::SharedDataBag;
use ofw_scope::{ScopeHandle, ScopeId};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique invocation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub Uuid);

impl InvocationId {
    /// Generate new invocation ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion state of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvocationState {
    /// Created, chain not started
    Pending,
    /// Chain is running
    Running,
    /// Chain finished with a result
    Completed,
    /// Chain finished with an error
    Faulted,
    /// Chain observed cancellation
    Canceled,
}

impl InvocationState {
    /// Check if the invocation has finished
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Faulted | Self::Canceled)
    }

    pub(crate) fn from_outcome<T>(outcome: &Result<T, CommandError>) -> Self {
        match outcome {
            Ok(_) => Self::Completed,
            Err(err) if err.is_canceled() => Self::Canceled,
            Err(_) => Self::Faulted,
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Faulted => "faulted",
            Self::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// State of one running invocation
///
/// Created by the executor when the invocation starts and dropped when it
/// ends. Middleware receive it by `&mut`, so within one invocation access
/// is never concurrent.
pub struct ExecutionContext<'a> {
    invocation_id: InvocationId,
    command: &'a (dyn Any + Send + Sync),
    command_name: &'static str,
    scope: ScopeHandle,
    shared_data: SharedDataBag,
    cancellation: CancellationToken,
    state: InvocationState,
    result: Option<Box<dyn Any + Send + Sync>>,
}

impl<'a> ExecutionContext<'a> {
    /// Create a context for `command` running in `scope`
    #[must_use]
    pub fn new(
        command: &'a (dyn Any + Send + Sync),
        command_name: &'static str,
        scope: ScopeHandle,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            invocation_id: InvocationId::new(),
            command,
            command_name,
            scope,
            shared_data: SharedDataBag::new(),
            cancellation,
            state: InvocationState::Pending,
            result: None,
        }
    }

    pub(crate) fn with_invocation_id(mut self, id: InvocationId) -> Self {
        self.invocation_id = id;
        self
    }

    /// Identifier of this invocation
    #[inline]
    #[must_use]
    pub fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }

    /// The command being executed, if it is a `C`
    #[inline]
    #[must_use]
    pub fn command<C: Any>(&self) -> Option<&'a C> {
        self.command.downcast_ref::<C>()
    }

    /// Name of the command being executed
    #[inline]
    #[must_use]
    pub fn command_name(&self) -> &'static str {
        self.command_name
    }

    /// Scope owned by this invocation
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &ScopeHandle {
        &self.scope
    }

    /// Identifier of this invocation's scope
    #[inline]
    #[must_use]
    pub fn scope_id(&self) -> ScopeId {
        self.scope.id()
    }

    /// Resolve `T` from this invocation's scope
    ///
    /// # Errors
    /// Any resolution error from the scope.
    #[inline]
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, CommandError> {
        Ok(self.scope.resolve::<T>()?)
    }

    /// Shared data bag
    #[inline]
    #[must_use]
    pub fn shared_data(&self) -> &SharedDataBag {
        &self.shared_data
    }

    /// Mutable shared data bag
    #[inline]
    pub fn shared_data_mut(&mut self) -> &mut SharedDataBag {
        &mut self.shared_data
    }

    /// Cancellation signal supplied by the caller
    #[inline]
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Check if cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fail with [`CommandError::Canceled`] if cancellation was requested
    ///
    /// # Errors
    /// `CommandError::Canceled`
    pub fn ensure_not_canceled(&self) -> Result<(), CommandError> {
        if self.is_canceled() {
            Err(CommandError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Run `future` unless cancellation fires first
    ///
    /// # Errors
    /// `CommandError::Canceled` if the token fires before `future` finishes.
    pub async fn until_canceled<F: Future>(&self, future: F) -> Result<F::Output, CommandError> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(CommandError::Canceled),
            out = future => Ok(out),
        }
    }

    /// Current completion state
    #[inline]
    #[must_use]
    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: InvocationState) {
        self.state = state;
    }

    /// Put `value` in the result slot
    ///
    /// The terminal step does this with the command's output. A middleware
    /// that short-circuits can set it to answer on the command's behalf.
    pub fn set_result<T: Any + Send + Sync>(&mut self, value: T) {
        self.result = Some(Box::new(value));
    }

    /// Borrow the result slot as `T`
    #[inline]
    #[must_use]
    pub fn result_ref<T: Any>(&self) -> Option<&T> {
        self.result.as_ref().and_then(|r| r.downcast_ref::<T>())
    }

    /// Check if the result slot is filled
    #[inline]
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Take the typed result out of the slot
    ///
    /// An empty slot yields `()` for unit-returning commands.
    pub(crate) fn take_output<T: Any>(&mut self) -> Result<T, CommandError> {
        let boxed: Box<dyn Any> = match self.result.take() {
            Some(value) => value,
            None => Box::new(()),
        };
        boxed
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| CommandError::MissingResult {
                command: self.command_name,
            })
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("invocation_id", &self.invocation_id)
            .field("command", &self.command_name)
            .field("scope", &self.scope)
            .field("state", &self.state)
            .field("shared_data", &self.shared_data)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}
