//! Command trait
//!
//! A command is immutable input plus one async method that does the work.
//! Dependencies are resolved from the invocation's scope on each run, never
//! cached on the command itself.

use crate::context::ExecutionContext;
use crate::error::CommandError;
use crate::executor::CommandExecutor;
use async_trait::async_trait;
use std::any::Any;
use tokio_util::sync::CancellationToken;

/// One unit of application logic
#[async_trait]
pub trait Command: Send + Sync + 'static {
    /// Value produced on success; `()` for commands with no result
    type Output: Any + Send + Sync;

    /// Name used in logs and errors
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Reject malformed input before any scope is created
    ///
    /// # Errors
    /// `CommandError::InvalidArgument` describing the problem.
    fn validate(&self) -> Result<(), CommandError> {
        Ok(())
    }

    /// Run the command
    ///
    /// # Errors
    /// Domain errors, resolution failures or `CommandError::Canceled`.
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<Self::Output, CommandError>;
}

/// Invocation sugar available on every [`Command`]
#[async_trait]
pub trait CommandExt: Command + Sized {
    /// Run this command through `executor`
    ///
    /// # Errors
    /// See [`CommandExecutor::invoke_async`].
    async fn invoke_on(&self, executor: &CommandExecutor) -> Result<Self::Output, CommandError> {
        executor.invoke_async(self, CancellationToken::new()).await
    }

    /// Run this command through `executor` with a caller-supplied token
    ///
    /// # Errors
    /// See [`CommandExecutor::invoke_async`].
    async fn invoke_on_with(
        &self,
        executor: &CommandExecutor,
        cancellation: CancellationToken,
    ) -> Result<Self::Output, CommandError> {
        executor.invoke_async(self, cancellation).await
    }
}

impl<C: Command> CommandExt for C {}
