//! Testing utilities for OFW workspace
//!
//! Shared fakes, middleware and commands for executor tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use ofw_commands::{Command, CommandError, CommandExecutor, ExecutionContext, Middleware, Next};
use ofw_scope::{ScopeAccessor, ScopeError, ScopeFactory, ScopeHandle, ServiceCollection, ServiceContainer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Ordered record of middleware events
pub type Trail = Arc<Mutex<Vec<String>>>;

pub fn trail() -> Trail {
    Arc::default()
}

pub fn snapshot(trail: &Trail) -> Vec<String> {
    trail.lock().clone()
}

/// Wraps a [`ServiceContainer`] and counts create/dispose calls
#[derive(Debug)]
pub struct CountingScopeFactory {
    container: ServiceContainer,
    created: AtomicUsize,
    disposed: AtomicUsize,
}

impl CountingScopeFactory {
    pub fn new(container: ServiceContainer) -> Self {
        Self {
            container,
            created: AtomicUsize::new(0),
            disposed: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Scopes created and not yet disposed
    pub fn outstanding(&self) -> usize {
        self.created() - self.disposed()
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }
}

impl ScopeFactory for CountingScopeFactory {
    fn create_scope(&self) -> Result<ScopeHandle, ScopeError> {
        let scope = self.container.create_scope()?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(scope)
    }

    fn dispose_scope(&self, scope: ScopeHandle) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        self.container.dispose_scope(scope);
    }
}

/// Factory that never produces a scope
#[derive(Debug, Default)]
pub struct UnavailableScopeFactory;

impl ScopeFactory for UnavailableScopeFactory {
    fn create_scope(&self) -> Result<ScopeHandle, ScopeError> {
        Err(ScopeError::Creation("scope provider unavailable".into()))
    }

    fn dispose_scope(&self, _scope: ScopeHandle) {}
}

#[derive(Debug, Default)]
pub struct SampleService;

/// Scoped service holding a per-scope random marker
#[derive(Debug)]
pub struct ScopedState {
    state: Mutex<String>,
}

impl ScopedState {
    pub fn state(&self) -> String {
        self.state.lock().clone()
    }

    pub fn append(&self, suffix: &str) {
        self.state.lock().push_str(suffix);
    }
}

impl Default for ScopedState {
    fn default() -> Self {
        Self {
            state: Mutex::new(Uuid::new_v4().to_string()),
        }
    }
}

/// Services every fixture command relies on
pub fn sample_services() -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services
        .add_scoped_default::<SampleService>()
        .add_scoped_default::<ScopedState>()
        .add_scoped_default::<StateTagger>();
    services
}

pub fn counting_factory() -> Arc<CountingScopeFactory> {
    Arc::new(CountingScopeFactory::new(sample_services().build()))
}

pub fn executor(factory: &Arc<CountingScopeFactory>) -> CommandExecutor {
    CommandExecutor::new(Arc::clone(factory) as Arc<dyn ScopeFactory>)
}

/// Appends `{label}-before` and `{label}-after` around `next`
pub struct RecordingMiddleware {
    label: String,
    trail: Trail,
}

impl RecordingMiddleware {
    pub fn new(label: impl Into<String>, trail: &Trail) -> Self {
        Self {
            label: label.into(),
            trail: Arc::clone(trail),
        }
    }
}

#[async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(&self, ctx: &mut ExecutionContext<'_>, next: Next<'_>) -> Result<(), CommandError> {
        self.trail.lock().push(format!("{}-before", self.label));
        let outcome = next.run(ctx).await;
        self.trail.lock().push(format!("{}-after", self.label));
        outcome
    }
}

/// Records one entry before and one after the chain, naming the command
pub struct LoggingMiddleware {
    entries: Trail,
}

impl LoggingMiddleware {
    pub fn new(entries: &Trail) -> Self {
        Self {
            entries: Arc::clone(entries),
        }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, ctx: &mut ExecutionContext<'_>, next: Next<'_>) -> Result<(), CommandError> {
        let command = ctx.command_name();
        self.entries.lock().push(format!("executing {command}"));
        let outcome = next.run(ctx).await;
        self.entries.lock().push(format!("executed {command}"));
        outcome
    }
}

/// Answers with a fixed value and never calls `next`
pub struct ShortCircuitMiddleware<T> {
    value: T,
}

impl<T> ShortCircuitMiddleware<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Middleware for ShortCircuitMiddleware<T> {
    async fn handle(&self, ctx: &mut ExecutionContext<'_>, _next: Next<'_>) -> Result<(), CommandError> {
        ctx.set_result(self.value.clone());
        Ok(())
    }
}

/// Replaces any downstream error with a fallback result
pub struct RecoveringMiddleware<T> {
    fallback: T,
    recovered: Trail,
}

impl<T> RecoveringMiddleware<T> {
    pub fn new(fallback: T, recovered: &Trail) -> Self {
        Self {
            fallback,
            recovered: Arc::clone(recovered),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Middleware for RecoveringMiddleware<T> {
    async fn handle(&self, ctx: &mut ExecutionContext<'_>, next: Next<'_>) -> Result<(), CommandError> {
        if let Err(err) = next.run(ctx).await {
            self.recovered.lock().push(err.to_string());
            ctx.set_result(self.fallback.clone());
        }
        Ok(())
    }
}

/// Fails before calling `next`
pub struct FailingMiddleware {
    message: &'static str,
}

impl FailingMiddleware {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

#[async_trait]
impl Middleware for FailingMiddleware {
    async fn handle(&self, _ctx: &mut ExecutionContext<'_>, _next: Next<'_>) -> Result<(), CommandError> {
        Err(CommandError::domain(Rejected(self.message)))
    }
}

/// Writes one shared data entry before calling `next`
pub struct SharedDataWriter {
    key: &'static str,
    value: String,
}

impl SharedDataWriter {
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

#[async_trait]
impl Middleware for SharedDataWriter {
    async fn handle(&self, ctx: &mut ExecutionContext<'_>, next: Next<'_>) -> Result<(), CommandError> {
        ctx.shared_data_mut().set(self.key, self.value.clone());
        next.run(ctx).await
    }
}

/// Scoped middleware that appends a marker to the invocation's [`ScopedState`]
#[derive(Debug, Default)]
pub struct StateTagger;

#[async_trait]
impl Middleware for StateTagger {
    async fn handle(&self, ctx: &mut ExecutionContext<'_>, next: Next<'_>) -> Result<(), CommandError> {
        ctx.resolve::<ScopedState>()?.append("-tagged");
        next.run(ctx).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rejected: {0}")]
pub struct Rejected(pub &'static str);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("insufficient funds: balance {balance}, requested {requested}")]
pub struct InsufficientFunds {
    pub balance: u32,
    pub requested: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct AddTwoNumbers {
    pub a: i32,
    pub b: i32,
}

impl AddTwoNumbers {
    pub fn new(a: i32, b: i32) -> Self {
        Self { a, b }
    }
}

#[async_trait]
impl Command for AddTwoNumbers {
    type Output = i32;

    fn name(&self) -> &'static str {
        "AddTwoNumbers"
    }

    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<i32, CommandError> {
        Ok(self.a + self.b)
    }
}

/// Produces no value
#[derive(Debug, Default)]
pub struct VoidCommand;

#[async_trait]
impl Command for VoidCommand {
    type Output = ();

    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        Ok(())
    }
}

/// Resolves [`SampleService`] twice through the ambient accessor
#[derive(Debug, Default)]
pub struct SampleCommand;

#[async_trait]
impl Command for SampleCommand {
    type Output = (Arc<SampleService>, Arc<SampleService>);

    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<Self::Output, CommandError> {
        let first = ScopeAccessor::resolve::<SampleService>()?;
        tokio::task::yield_now().await;
        let second = resolve_deep::<SampleService>().await?;
        Ok((first, second))
    }
}

async fn resolve_deep<T: std::any::Any + Send + Sync>() -> Result<Arc<T>, ScopeError> {
    tokio::time::sleep(Duration::from_millis(1)).await;
    ScopeAccessor::resolve::<T>()
}

/// Modifies [`ScopedState`], waits, then reads it back through a second
/// resolution
#[derive(Debug, Clone, Copy)]
pub struct ScopedStateCommand {
    pub delay: Duration,
}

impl ScopedStateCommand {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Command for ScopedStateCommand {
    type Output = String;

    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<String, CommandError> {
        let reader = ScopeAccessor::resolve::<ScopedState>()?;
        let writer = ScopeAccessor::resolve::<ScopedState>()?;
        writer.append("-modified");
        tokio::time::sleep(self.delay).await;
        Ok(reader.state())
    }
}

/// Returns the handle of the scope it ran in
#[derive(Debug, Default)]
pub struct ScopeProbe;

#[async_trait]
impl Command for ScopeProbe {
    type Output = ScopeHandle;

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ScopeHandle, CommandError> {
        Ok(ctx.scope().clone())
    }
}

/// Fails with [`InsufficientFunds`] when `requested` exceeds `balance`
#[derive(Debug, Clone, Copy)]
pub struct WithdrawCommand {
    pub balance: u32,
    pub requested: u32,
}

#[async_trait]
impl Command for WithdrawCommand {
    type Output = u32;

    fn validate(&self) -> Result<(), CommandError> {
        if self.requested == 0 {
            return Err(CommandError::InvalidArgument("requested amount must be positive".into()));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<u32, CommandError> {
        ctx.resolve::<ScopedState>()?;
        if self.requested > self.balance {
            return Err(CommandError::domain(InsufficientFunds {
                balance: self.balance,
                requested: self.requested,
            }));
        }
        Ok(self.balance - self.requested)
    }
}

/// Waits for `delay` unless canceled first
#[derive(Debug, Clone, Copy)]
pub struct CancellableCommand {
    pub delay: Duration,
}

#[async_trait]
impl Command for CancellableCommand {
    type Output = ();

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        ctx.ensure_not_canceled()?;
        ctx.until_canceled(tokio::time::sleep(self.delay)).await
    }
}

/// Panics inside the command body
#[derive(Debug, Default)]
pub struct PanickingCommand;

#[async_trait]
impl Command for PanickingCommand {
    type Output = ();

    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        tokio::task::yield_now().await;
        panic!("command body panicked");
    }
}

/// Reads a shared data entry set by middleware
#[derive(Debug, Clone, Copy)]
pub struct ReadSharedData {
    pub key: &'static str,
}

#[async_trait]
impl Command for ReadSharedData {
    type Output = String;

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<String, CommandError> {
        Ok(ctx.shared_data().get::<String>(self.key)?.clone())
    }
}

/// Resolves a type nobody registered
#[derive(Debug, Default)]
pub struct UnresolvableCommand;

#[derive(Debug)]
pub struct Unregistered;

#[async_trait]
impl Command for UnresolvableCommand {
    type Output = ();

    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        ScopeAccessor::resolve::<Unregistered>()?;
        Ok(())
    }
}
