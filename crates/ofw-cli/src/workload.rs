//! Commands and services driven by the CLI

use anyhow::Context as _;
use futures::future::join_all;
use ofw_commands::{async_trait, Command, CommandError, CommandExecutor, ExecutionContext};
use ofw_scope::{ScopeAccessor, ScopeId, ServiceCollection, ServiceContainer};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub(crate) struct AddTwoNumbers {
    pub(crate) a: i32,
    pub(crate) b: i32,
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

/// Per-scope marker mutated by [`TouchScopedState`]
pub(crate) struct ScopedState {
    value: Mutex<String>,
}

impl Default for ScopedState {
    fn default() -> Self {
        Self {
            value: Mutex::new(Uuid::new_v4().to_string()),
        }
    }
}

/// Marks the scoped state through one resolution and reads it through
/// another after a delay
struct TouchScopedState {
    delay: Duration,
}

#[async_trait]
impl Command for TouchScopedState {
    type Output = (ScopeId, String);

    fn name(&self) -> &'static str {
        "TouchScopedState"
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(ScopeId, String), CommandError> {
        ScopeAccessor::resolve::<ScopedState>()?.value.lock().push_str("-modified");
        ctx.until_canceled(tokio::time::sleep(self.delay)).await?;
        let state = ScopeAccessor::resolve::<ScopedState>()?.value.lock().clone();
        Ok((ctx.scope_id(), state))
    }
}

pub(crate) fn container() -> ServiceContainer {
    let mut services = ServiceCollection::new();
    services.add_scoped_default::<ScopedState>();
    services.build()
}

/// Outcome of a stress run
#[derive(Debug, Serialize)]
pub(crate) struct StressReport {
    pub(crate) invocations: usize,
    pub(crate) failed: usize,
    pub(crate) distinct_scopes: usize,
    pub(crate) isolation_violations: usize,
    pub(crate) outstanding_scopes: usize,
    pub(crate) elapsed_ms: u64,
}

impl StressReport {
    pub(crate) fn passed(&self) -> bool {
        self.failed == 0
            && self.isolation_violations == 0
            && self.outstanding_scopes == 0
            && self.distinct_scopes == self.invocations
    }

    pub(crate) fn generate_text(&self) -> String {
        format!(
            "Invocations:          {}\n\
             Failed:               {}\n\
             Distinct scopes:      {}\n\
             Isolation violations: {}\n\
             Outstanding scopes:   {}\n\
             Elapsed:              {} ms\n\
             Result:               {}",
            self.invocations,
            self.failed,
            self.distinct_scopes,
            self.isolation_violations,
            self.outstanding_scopes,
            self.elapsed_ms,
            if self.passed() { "PASS" } else { "FAIL" },
        )
    }
}

/// Run `invocations` concurrent scoped-state commands
pub(crate) async fn run_stress(
    executor: Arc<CommandExecutor>,
    container: &ServiceContainer,
    invocations: usize,
    max_delay_ms: u64,
) -> anyhow::Result<StressReport> {
    let start = Instant::now();
    let handles: Vec<_> = {
        let mut rng = rand::thread_rng();
        (0..invocations)
            .map(|_| {
                let executor = Arc::clone(&executor);
                let cmd = TouchScopedState {
                    delay: Duration::from_millis(rng.gen_range(0..=max_delay_ms)),
                };
                tokio::spawn(async move { executor.invoke(&cmd).await })
            })
            .collect()
    };

    let mut failed = 0;
    let mut violations = 0;
    let mut scopes = HashSet::with_capacity(invocations);
    for joined in join_all(handles).await {
        match joined.context("stress task panicked")? {
            Ok((scope, state)) => {
                if state.matches("-modified").count() != 1 {
                    violations += 1;
                }
                scopes.insert(scope);
            }
            Err(err) => {
                tracing::warn!(error = %err, "invocation failed");
                failed += 1;
            }
        }
    }

    Ok(StressReport {
        invocations,
        failed,
        distinct_scopes: scopes.len(),
        isolation_violations: violations,
        outstanding_scopes: container.live_scopes(),
        elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}
