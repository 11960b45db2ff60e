//! Stress Test - 1,000 concurrent invocations
//!
//! Run with: cargo test --package ofw-commands --test stress_test
//!
use futures::future::join_all;
use ofw_commands::CommandExecutor;
use ofw_test_utils::*;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

const INVOCATIONS: usize = 1_000;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn stress_test_scoped_state_isolation() {
    println!("\n[STRESS TEST] {INVOCATIONS} concurrent invocations with scoped state...");

    let start = Instant::now();
    let factory = counting_factory();
    let executor = Arc::new(executor(&factory));

    let mut rng = rand::thread_rng();
    let handles: Vec<_> = (0..INVOCATIONS)
        .map(|_| {
            let executor = Arc::clone(&executor);
            let cmd = ScopedStateCommand::new(Duration::from_millis(rng.gen_range(0..40)));
            tokio::spawn(async move { executor.invoke(&cmd).await })
        })
        .collect();

    let states: Vec<String> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("invocation failed"))
        .collect();

    let duration = start.elapsed();
    println!("  Completed in {:.2}s", duration.as_secs_f64());

    // Exactly one "-modified" per state: a shared scope would stack suffixes.
    for state in &states {
        assert_eq!(state.matches("-modified").count(), 1, "state leaked: {state}");
    }
    let distinct: HashSet<_> = states.iter().collect();
    assert_eq!(distinct.len(), INVOCATIONS, "scopes were shared between invocations");
    assert_eq!(factory.created(), INVOCATIONS);
    assert_eq!(factory.outstanding(), 0);
    assert_eq!(factory.container().live_scopes(), 0);

    println!("  ✓ Stress test passed\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_test_mixed_outcomes_release_every_scope() {
    let factory = counting_factory();
    let executor: Arc<CommandExecutor> = Arc::new(executor(&factory));

    let handles: Vec<_> = (0..INVOCATIONS)
        .map(|i| {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                let cmd = WithdrawCommand {
                    balance: 100,
                    requested: u32::try_from(i % 200).unwrap_or(1).max(1),
                };
                executor.invoke(&cmd).await.is_ok()
            })
        })
        .collect();

    let succeeded = join_all(handles)
        .await
        .into_iter()
        .filter(|joined| *joined.as_ref().expect("task panicked"))
        .count();

    assert_eq!(succeeded, 505);
    assert_eq!(factory.created(), INVOCATIONS);
    assert_eq!(factory.disposed(), INVOCATIONS);
}
