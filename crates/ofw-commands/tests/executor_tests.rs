//! CommandExecutor Tests
//!
//! Results, error propagation and scope cleanup on every exit path.
//!
use async_trait::async_trait;
use ofw_commands::{
    CancellationToken, Command, CommandError, CommandExecutor, CommandExt, ErrorKind, ExecutionContext,
    ExecutorConfig, Middleware, Next,
};
use ofw_scope::{ScopeAccessor, ScopeError, ScopeHandle, ScopeId};
use ofw_test_utils::*;
use std::sync::Arc;
use std::time::Duration;

struct Skip;

#[async_trait]
impl Middleware for Skip {
    async fn handle(&self, _ctx: &mut ExecutionContext<'_>, _next: Next<'_>) -> Result<(), CommandError> {
        Ok(())
    }
}

/// Invokes a probe inline, from a plain task, and from a scope-carrying task
struct Reentrant {
    executor: Arc<CommandExecutor>,
}

#[async_trait]
impl Command for Reentrant {
    type Output = (ScopeId, Result<ScopeId, ErrorKind>, Result<ScopeId, ErrorKind>, Result<ScopeId, ErrorKind>);

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<Self::Output, CommandError> {
        let inline = self.executor.invoke(&ScopeProbe).await;

        let executor = Arc::clone(&self.executor);
        let detached = tokio::spawn(async move {
            let probe = ScopeProbe;
            executor.invoke(&probe).await
        })
        .await
        .map_err(|e| CommandError::IllegalState(e.to_string()))?;

        let executor = Arc::clone(&self.executor);
        let propagated = ScopeAccessor::spawn(async move {
            let probe = ScopeProbe;
            executor.invoke(&probe).await
        })
        .await
        .map_err(|e| CommandError::IllegalState(e.to_string()))?;

        let id = |r: Result<ScopeHandle, CommandError>| r.map(|s| s.id()).map_err(|e| e.kind());
        Ok((ctx.scope_id(), id(inline), id(detached), id(propagated)))
    }
}

#[tokio::test]
async fn test_add_two_numbers() {
    let factory = counting_factory();
    let executor = executor(&factory);

    let result = executor.invoke(&AddTwoNumbers::new(3, 5)).await.unwrap();

    assert_eq!(result, 8);
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.disposed(), 1);
}

#[tokio::test]
async fn test_invoke_on_extension() {
    let factory = counting_factory();
    let executor = executor(&factory);

    assert_eq!(AddTwoNumbers::new(20, 6).invoke_on(&executor).await.unwrap(), 26);
    VoidCommand.invoke_on(&executor).await.unwrap();
    assert_eq!(factory.outstanding(), 0);
}

#[tokio::test]
async fn test_void_command() {
    let factory = counting_factory();
    let executor = executor(&factory);

    executor.invoke(&VoidCommand).await.unwrap();

    assert_eq!(factory.disposed(), 1);
}

#[tokio::test]
async fn test_validation_rejects_before_scope_creation() {
    let factory = counting_factory();
    let executor = executor(&factory);

    let err = executor
        .invoke(&WithdrawCommand { balance: 10, requested: 0 })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(factory.created(), 0);
    assert_eq!(factory.disposed(), 0);
}

#[tokio::test]
async fn test_domain_error_reaches_caller_after_cleanup() {
    let factory = counting_factory();
    let executor = executor(&factory);

    let err = executor
        .invoke(&WithdrawCommand { balance: 10, requested: 50 })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Domain);
    assert_eq!(
        err.downcast_domain_ref::<InsufficientFunds>(),
        Some(&InsufficientFunds { balance: 10, requested: 50 })
    );
    assert_eq!(factory.disposed(), 1);
    assert!(ScopeAccessor::current().is_none());
}

#[tokio::test]
async fn test_unresolved_dependency() {
    let factory = counting_factory();
    let executor = executor(&factory);

    let err = executor.invoke(&UnresolvableCommand).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnresolvedDependency);
    assert!(matches!(
        err,
        CommandError::Scope(ScopeError::Unresolved { type_name }) if type_name.ends_with("Unregistered")
    ));
    assert_eq!(factory.disposed(), 1);
}

#[tokio::test]
async fn test_scope_creation_failure() {
    let executor = CommandExecutor::new(Arc::new(UnavailableScopeFactory));

    let err = executor.invoke(&AddTwoNumbers::new(1, 2)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ScopeCreation);
}

#[tokio::test]
async fn test_already_canceled_token() {
    let factory = counting_factory();
    let executor = executor(&factory);
    let token = CancellationToken::new();
    token.cancel();

    let err = executor
        .invoke_async(&CancellableCommand { delay: Duration::from_secs(5) }, token)
        .await
        .unwrap_err();

    assert!(err.is_canceled());
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.disposed(), 1);
}

#[tokio::test]
async fn test_unobserved_cancellation_completes() {
    let factory = counting_factory();
    let executor = executor(&factory);
    let token = CancellationToken::new();
    token.cancel();

    let sum = executor.invoke_async(&AddTwoNumbers::new(3, 5), token).await.unwrap();

    assert_eq!(sum, 8);
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.disposed(), 1);
}

#[tokio::test]
async fn test_cancel_while_running() {
    let factory = counting_factory();
    let executor = executor(&factory);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = CancellableCommand { delay: Duration::from_secs(5) }
        .invoke_on_with(&executor, token)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert_eq!(factory.disposed(), 1);
}

#[tokio::test]
async fn test_configured_timeout() {
    let factory = counting_factory();
    let executor = CommandExecutor::builder(factory.clone())
        .config(ExecutorConfig::new().with_timeout(Duration::from_millis(20)))
        .build();

    let err = executor
        .invoke(&CancellableCommand { delay: Duration::from_secs(5) })
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::Timeout { duration_ms: 20, .. }));
    assert_eq!(factory.disposed(), 1);
    assert!(ScopeAccessor::current().is_none());
}

#[tokio::test]
async fn test_panic_still_disposes() {
    let factory = counting_factory();
    let executor = Arc::new(executor(&factory));

    let task = tokio::spawn(async move {
        let cmd = PanickingCommand;
        executor.invoke(&cmd).await
    });
    let joined = task.await;

    assert!(joined.unwrap_err().is_panic());
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.disposed(), 1);
}

#[tokio::test]
async fn test_dropped_invocation_disposes() {
    let factory = counting_factory();
    let executor = executor(&factory);
    let cmd = CancellableCommand { delay: Duration::from_secs(5) };

    let abandoned = tokio::time::timeout(Duration::from_millis(20), executor.invoke(&cmd)).await;

    assert!(abandoned.is_err());
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.disposed(), 1);
    assert_eq!(factory.container().live_scopes(), 0);
}

#[tokio::test]
async fn test_scope_is_unusable_after_completion() {
    let factory = counting_factory();
    let executor = executor(&factory);

    let scope = executor.invoke(&ScopeProbe).await.unwrap();

    assert_eq!(
        scope.resolve::<SampleService>().unwrap_err(),
        ScopeError::Disposed(scope.id())
    );
}

#[tokio::test]
async fn test_nested_invocations() {
    let factory = counting_factory();
    let inner = Arc::new(executor(&factory));
    let outer = executor(&factory);

    let (outer_scope, inline, detached, propagated) = outer
        .invoke(&Reentrant { executor: inner })
        .await
        .unwrap();

    assert_eq!(inline, Err(ErrorKind::IllegalState));
    assert_eq!(propagated, Err(ErrorKind::IllegalState));
    let detached = detached.unwrap();
    assert_ne!(detached, outer_scope);
    assert_eq!(factory.created(), 2);
    assert_eq!(factory.outstanding(), 0);
}

#[tokio::test]
async fn test_short_circuit_without_result() {
    let factory = counting_factory();
    let executor = CommandExecutor::builder(factory.clone()).middleware(Skip).build();

    executor.invoke(&VoidCommand).await.unwrap();
    let err = executor.invoke(&AddTwoNumbers::new(1, 1)).await.unwrap_err();

    assert!(matches!(err, CommandError::MissingResult { command: "AddTwoNumbers" }));
    assert_eq!(factory.disposed(), 2);
}
