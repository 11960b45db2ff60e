//! Logging middleware

use crate::context::ExecutionContext;
use crate::error::CommandError;
use crate::pipeline::{Middleware, Next};
use async_trait::async_trait;
use std::time::Instant;

/// Logs entry to and exit from the rest of the chain
///
/// Emits one event before calling `next` and one after it returns, with the
/// command name, invocation id, elapsed time and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    /// Create tracing middleware
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for TracingMiddleware {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn handle(&self, ctx: &mut ExecutionContext<'_>, next: Next<'_>) -> Result<(), CommandError> {
        let command = ctx.command_name();
        let invocation = ctx.invocation_id();
        tracing::info!(command, %invocation, "before");

        let started = Instant::now();
        let outcome = next.run(ctx).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &outcome {
            Ok(()) => tracing::info!(command, %invocation, elapsed_ms, outcome = "ok", "after"),
            Err(err) => {
                tracing::info!(command, %invocation, elapsed_ms, outcome = "error", error = %err, "after");
            }
        }
        outcome
    }
}
