//! Middleware pipeline
//!
//! An ordered list of middleware wrapped around a terminal step. Running the
//! pipeline calls the first middleware with a [`Next`] that continues with
//! the rest of the chain, ending in the terminal.
//!
//! # Ordering
//!
//! Middleware enter in registration order and leave in reverse:
//!
//! ```text
//! A before -> B before -> terminal -> B after -> A after
//! ```
//!
//! A middleware that returns without running `next` short-circuits
//! everything downstream. `Next` is consumed on use, so it can run at most
//! once.

use crate::context::ExecutionContext;
use crate::error::CommandError;
use async_trait::async_trait;
use ofw_scope::ScopeHandle;
use std::fmt;
use std::sync::Arc;

/// Interceptor around command execution
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs and pipeline introspection
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Handle one invocation
    ///
    /// Call `next.run(ctx)` to continue the chain, or return without
    /// calling it to short-circuit.
    ///
    /// # Errors
    /// Errors from downstream, unless recovered here, and any error raised
    /// by this middleware.
    async fn handle(&self, ctx: &mut ExecutionContext<'_>, next: Next<'_>) -> Result<(), CommandError>;
}

/// Innermost step of a pipeline
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Run the wrapped work
    ///
    /// # Errors
    /// Whatever the wrapped work fails with.
    async fn call(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError>;
}

/// Remainder of the chain after the current middleware
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a (dyn Terminal + 'a),
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], terminal: &'a (dyn Terminal + 'a)) -> Self {
        Self { chain, terminal }
    }

    /// Number of middleware still ahead of the terminal
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }

    /// Continue with the rest of the chain
    ///
    /// # Errors
    /// Errors raised downstream.
    pub async fn run(self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(ctx, Next::new(rest, self.terminal)).await,
            None => self.terminal.call(ctx).await,
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("remaining", &self.chain.len()).finish()
    }
}

/// Builds a middleware instance for one invocation
pub type MiddlewareFactory =
    Arc<dyn Fn(&ScopeHandle) -> Result<Arc<dyn Middleware>, CommandError> + Send + Sync>;

#[derive(Clone)]
enum Stage {
    Shared(Arc<dyn Middleware>),
    PerInvocation {
        name: &'static str,
        factory: MiddlewareFactory,
    },
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::Shared(m) => m.name(),
            Self::PerInvocation { name, .. } => *name,
        }
    }

    fn materialize(&self, scope: &ScopeHandle) -> Result<Arc<dyn Middleware>, CommandError> {
        match self {
            Self::Shared(m) => Ok(Arc::clone(m)),
            Self::PerInvocation { factory, .. } => factory(scope),
        }
    }
}

/// Immutable ordered middleware chain
#[derive(Clone)]
pub struct MiddlewarePipeline {
    stages: Arc<[Stage]>,
}

impl MiddlewarePipeline {
    /// Start building a pipeline
    #[inline]
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Pipeline with no middleware
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        PipelineBuilder::default().build()
    }

    /// Number of middleware
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the pipeline has no middleware
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Middleware names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Run the chain around `terminal`
    ///
    /// Per-invocation middleware are built from the context's scope before
    /// the first middleware runs.
    ///
    /// # Errors
    /// Middleware construction failures and anything the chain raises.
    pub async fn run(
        &self,
        ctx: &mut ExecutionContext<'_>,
        terminal: &(dyn Terminal + '_),
    ) -> Result<(), CommandError> {
        let chain = self
            .stages
            .iter()
            .map(|stage| stage.materialize(ctx.scope()))
            .collect::<Result<Vec<_>, _>>()?;
        Next::new(&chain, terminal).run(ctx).await
    }
}

impl Default for MiddlewarePipeline {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("stages", &self.names())
            .finish()
    }
}

/// Builder for [`MiddlewarePipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    /// Append a middleware shared by all invocations
    #[must_use]
    pub fn middleware<M: Middleware>(self, middleware: M) -> Self {
        self.shared(Arc::new(middleware))
    }

    /// Append an already shared middleware
    #[must_use]
    pub fn shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.stages.push(Stage::Shared(middleware));
        self
    }

    /// Append a middleware built fresh for every invocation
    #[must_use]
    pub fn factory<F>(mut self, name: &'static str, factory: F) -> Self
    where
        F: Fn(&ScopeHandle) -> Result<Arc<dyn Middleware>, CommandError> + Send + Sync + 'static,
    {
        self.stages.push(Stage::PerInvocation {
            name,
            factory: Arc::new(factory),
        });
        self
    }

    /// Append a middleware resolved from each invocation's scope
    #[must_use]
    pub fn scoped<M: Middleware>(self) -> Self {
        self.factory(std::any::type_name::<M>(), |scope| {
            let middleware: Arc<dyn Middleware> = scope.resolve::<M>()?;
            Ok(middleware)
        })
    }

    /// Number of stages added so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if no stage was added
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Freeze the pipeline
    #[must_use]
    pub fn build(self) -> MiddlewarePipeline {
        MiddlewarePipeline {
            stages: self.stages.into(),
        }
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.stages.iter().map(Stage::name).collect();
        f.debug_struct("PipelineBuilder").field("stages", &names).finish()
    }
}
