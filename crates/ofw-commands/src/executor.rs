//! Command executor
//!
//! Runs one command per call through the configured middleware pipeline:
//! 1. validate the command
//! 2. create a scope and bind it to the invocation
//! 3. run the pipeline with a fresh [`ExecutionContext`]
//! 4. unbind and dispose the scope, then surface the outcome
//!
//! Step 4 happens exactly once on every exit path, including errors,
//! timeouts, panics and the caller dropping the returned future.

use crate::command::Command;
use crate::config::ExecutorConfig;
use crate::context::{ExecutionContext, InvocationId, InvocationState};
use crate::error::CommandError;
use crate::pipeline::{Middleware, MiddlewarePipeline, PipelineBuilder, Terminal};
use async_trait::async_trait;
use ofw_scope::{ScopeAccessor, ScopeFactory, ScopeHandle};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Executes commands inside isolated, ambient scopes
///
/// Holds only immutable state, so one instance can serve any number of
/// concurrent invocations behind an `Arc`.
#[derive(Clone)]
pub struct CommandExecutor {
    scopes: Arc<dyn ScopeFactory>,
    pipeline: MiddlewarePipeline,
    config: ExecutorConfig,
}

impl CommandExecutor {
    /// Executor with no middleware and default configuration
    #[must_use]
    pub fn new(scopes: Arc<dyn ScopeFactory>) -> Self {
        Self::builder(scopes).build()
    }

    /// Start configuring an executor
    #[inline]
    #[must_use]
    pub fn builder(scopes: Arc<dyn ScopeFactory>) -> CommandExecutorBuilder {
        CommandExecutorBuilder {
            scopes,
            pipeline: MiddlewarePipeline::builder(),
            config: ExecutorConfig::default(),
        }
    }

    /// Configured middleware chain
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &MiddlewarePipeline {
        &self.pipeline
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `command` with a token nobody cancels
    ///
    /// # Errors
    /// See [`invoke_async`](Self::invoke_async).
    pub async fn invoke<C: Command>(&self, command: &C) -> Result<C::Output, CommandError> {
        self.invoke_async(command, CancellationToken::new()).await
    }

    /// Run `command` through the pipeline in a new scope
    ///
    /// Cancellation is cooperative. The token reaches the command and the
    /// middleware through the context, and only code that checks it fails
    /// with `CommandError::Canceled`. A command that never looks at a
    /// canceled token still completes and its result is returned.
    ///
    /// # Errors
    /// - `CommandError::InvalidArgument` from validation, before any scope
    ///   exists
    /// - `CommandError::IllegalState` when called inline from a running
    ///   invocation
    /// - `CommandError::Scope` if the scope cannot be created or a
    ///   dependency cannot be resolved
    /// - `CommandError::Timeout` if the configured limit elapses
    /// - anything the middleware or command raise, unchanged
    pub async fn invoke_async<C: Command>(
        &self,
        command: &C,
        cancellation: CancellationToken,
    ) -> Result<C::Output, CommandError> {
        command.validate()?;

        if let Some(existing) = ScopeAccessor::current() {
            return Err(CommandError::IllegalState(format!(
                "{} invoked inline while scope {} is bound; spawn it instead",
                command.name(),
                existing.id()
            )));
        }

        let scope = self.scopes.create_scope()?;
        let lease = ScopeLease {
            scopes: self.scopes.as_ref(),
            scope: Some(scope.clone()),
        };

        let invocation = InvocationId::new();
        let span = tracing::debug_span!(
            "command",
            command = command.name(),
            invocation = %invocation,
            scope = %scope.id(),
        );

        let bound = ScopeAccessor::bind(
            scope.clone(),
            self.run_chain(command, scope, invocation, cancellation),
        )?;
        let outcome = async {
            match self.config.timeout_ms {
                Some(limit_ms) => tokio::time::timeout(Duration::from_millis(limit_ms), bound)
                    .await
                    .unwrap_or_else(|_| {
                        tracing::warn!(limit_ms, "invocation timed out");
                        Err(CommandError::Timeout {
                            command: command.name(),
                            duration_ms: limit_ms,
                        })
                    }),
                None => bound.await,
            }
        }
        .instrument(span)
        .await;

        lease.release();
        outcome
    }

    async fn run_chain<C: Command>(
        &self,
        command: &C,
        scope: ScopeHandle,
        invocation: InvocationId,
        cancellation: CancellationToken,
    ) -> Result<C::Output, CommandError> {
        let mut ctx = ExecutionContext::new(command, command.name(), scope, cancellation)
            .with_invocation_id(invocation);
        ctx.set_state(InvocationState::Running);
        tracing::debug!("invocation started");

        let terminal = CommandTerminal { command };
        let outcome = match self.pipeline.run(&mut ctx, &terminal).await {
            Ok(()) => ctx.take_output::<C::Output>(),
            Err(err) => Err(err),
        };

        let state = InvocationState::from_outcome(&outcome);
        ctx.set_state(state);
        match (&outcome, self.config.trace_outcomes) {
            (Ok(_), true) => tracing::info!(%state, "invocation finished"),
            (Ok(_), false) => tracing::debug!(%state, "invocation finished"),
            (Err(err), true) => tracing::info!(%state, error = %err, "invocation finished"),
            (Err(err), false) => tracing::debug!(%state, error = %err, "invocation finished"),
        }
        outcome
    }
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CommandExecutor`]
pub struct CommandExecutorBuilder {
    scopes: Arc<dyn ScopeFactory>,
    pipeline: PipelineBuilder,
    config: ExecutorConfig,
}

impl CommandExecutorBuilder {
    /// Append a middleware shared by all invocations
    #[must_use]
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.pipeline = self.pipeline.middleware(middleware);
        self
    }

    /// Append an already shared middleware
    #[must_use]
    pub fn shared_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.pipeline = self.pipeline.shared(middleware);
        self
    }

    /// Append a middleware built for every invocation from its scope
    #[must_use]
    pub fn middleware_factory<F>(mut self, name: &'static str, factory: F) -> Self
    where
        F: Fn(&ScopeHandle) -> Result<Arc<dyn Middleware>, CommandError> + Send + Sync + 'static,
    {
        self.pipeline = self.pipeline.factory(name, factory);
        self
    }

    /// Append a middleware resolved from each invocation's scope
    #[must_use]
    pub fn scoped_middleware<M: Middleware>(mut self) -> Self {
        self.pipeline = self.pipeline.scoped::<M>();
        self
    }

    /// Replace the configuration
    #[must_use]
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Freeze the executor
    #[must_use]
    pub fn build(self) -> CommandExecutor {
        let pipeline = self.pipeline.build();
        tracing::debug!(middleware = ?pipeline.names(), "command executor built");
        CommandExecutor {
            scopes: self.scopes,
            pipeline,
            config: self.config,
        }
    }
}

impl fmt::Debug for CommandExecutorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutorBuilder")
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Disposes the invocation's scope once, when released or dropped
struct ScopeLease<'a> {
    scopes: &'a dyn ScopeFactory,
    scope: Option<ScopeHandle>,
}

impl ScopeLease<'_> {
    fn release(mut self) {
        self.dispose();
    }

    fn dispose(&mut self) {
        if let Some(scope) = self.scope.take() {
            tracing::trace!(scope = %scope.id(), "releasing invocation scope");
            self.scopes.dispose_scope(scope);
        }
    }
}

impl Drop for ScopeLease<'_> {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct CommandTerminal<'c, C> {
    command: &'c C,
}

#[async_trait]
impl<'c, C: Command> Terminal for CommandTerminal<'c, C> {
    async fn call(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        let output = self.command.execute(ctx).await?;
        ctx.set_result(output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::Next;
    use ofw_scope::{Resolver, ScopeId, ServiceCollection, ServiceContainer};

    #[derive(Debug, Default)]
    struct Tally(std::sync::atomic::AtomicU32);

    struct Add(i32, i32);

    #[async_trait]
    impl Command for Add {
        type Output = i32;

        async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<i32, CommandError> {
            Ok(self.0 + self.1)
        }
    }

    struct WhoAmI;

    #[async_trait]
    impl Command for WhoAmI {
        type Output = (ScopeId, ScopeId);

        async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(ScopeId, ScopeId), CommandError> {
            tokio::task::yield_now().await;
            let ambient = ScopeAccessor::resolve::<ScopeId>()?;
            Ok((ctx.scope_id(), *ambient))
        }
    }

    struct Sleepy(Duration);

    #[async_trait]
    impl Command for Sleepy {
        type Output = ();

        async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    struct Nested;

    #[async_trait]
    impl Command for Nested {
        type Output = ();

        async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
            let executor = ctx.resolve::<CommandExecutor>()?;
            executor.invoke(&Add(1, 1)).await.map(|_| ())
        }
    }

    struct ReadTally;

    #[async_trait]
    impl Command for ReadTally {
        type Output = u32;

        async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<u32, CommandError> {
            Ok(ctx.resolve::<Tally>()?.0.load(std::sync::atomic::Ordering::SeqCst))
        }
    }

    struct Tick;

    #[async_trait]
    impl Middleware for Tick {
        async fn handle(&self, ctx: &mut ExecutionContext<'_>, next: Next<'_>) -> Result<(), CommandError> {
            ctx.resolve::<Tally>()?.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            next.run(ctx).await
        }
    }

    fn container() -> ServiceContainer {
        let mut services = ServiceCollection::new();
        services
            .add_scoped_default::<Tally>()
            .add_transient(|r: &Resolver<'_>| Ok(r.scope_id()));
        services.build()
    }

    #[tokio::test]
    async fn returns_command_output_and_disposes() {
        let container = container();
        let executor = CommandExecutor::new(Arc::new(container.clone()));

        assert_eq!(executor.invoke(&Add(3, 5)).await.unwrap(), 8);
        assert_eq!(container.live_scopes(), 0);
        assert!(ScopeAccessor::current().is_none());
    }

    #[tokio::test]
    async fn context_scope_is_the_ambient_scope() {
        let executor = CommandExecutor::new(Arc::new(container()));
        let (own, ambient) = executor.invoke(&WhoAmI).await.unwrap();
        assert_eq!(own, ambient);
    }

    #[tokio::test]
    async fn timeout_disposes_and_reports() {
        let container = container();
        let executor = CommandExecutor::builder(Arc::new(container.clone()))
            .config(ExecutorConfig::new().with_timeout(Duration::from_millis(10)))
            .build();

        let err = executor.invoke(&Sleepy(Duration::from_secs(5))).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(container.live_scopes(), 0);
    }

    #[tokio::test]
    async fn inline_nested_invocation_is_illegal() {
        let mut services = ServiceCollection::new();
        services.add_scoped_default::<Tally>();
        let container = services.build();
        let executor = CommandExecutor::new(Arc::new(container.clone()));

        let mut with_executor = ServiceCollection::new();
        with_executor.add_instance(executor);
        let outer = CommandExecutor::new(Arc::new(with_executor.build()));

        let err = outer.invoke(&Nested).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IllegalState);
        assert_eq!(container.live_scopes(), 0);
    }

    #[tokio::test]
    async fn scoped_middleware_counts_per_invocation() {
        let container = container();
        let executor = CommandExecutor::builder(Arc::new(container.clone()))
            .middleware(Tick)
            .middleware(Tick)
            .build();

        assert_eq!(executor.invoke(&ReadTally).await.unwrap(), 2);
        assert_eq!(executor.invoke(&ReadTally).await.unwrap(), 2);
        assert_eq!(executor.pipeline().len(), 2);
    }

    struct Broken;

    impl ScopeFactory for Broken {
        fn create_scope(&self) -> Result<ScopeHandle, ofw_scope::ScopeError> {
            Err(ofw_scope::ScopeError::Creation("pool exhausted".into()))
        }

        fn dispose_scope(&self, _scope: ScopeHandle) {
            panic!("nothing to dispose");
        }
    }

    #[tokio::test]
    async fn creation_failure_surfaces_before_running() {
        let executor = CommandExecutor::new(Arc::new(Broken));
        let err = executor.invoke(&Add(1, 2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScopeCreation);
    }
}
