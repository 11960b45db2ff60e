//! OFW Commands - scoped command execution
//!
//! Runs units of application logic through an ordered middleware chain.
//! Every invocation gets:
//! - its own dependency scope, reachable from any nested code through
//!   [`ofw_scope::ScopeAccessor`] without passing it around
//! - a [`SharedDataBag`] visible to every middleware and the command
//! - the caller's cancellation token
//!
//! The scope is unbound and disposed exactly once when the invocation ends,
//! however it ends.
//!
//! # Example
//!
//! ```rust,ignore
//! use ofw_commands::{Command, CommandExecutor, ExecutionContext, TracingMiddleware};
//!
//! struct AddTwoNumbers(i32, i32);
//!
//! #[async_trait::async_trait]
//! impl Command for AddTwoNumbers {
//!     type Output = i32;
//!
//!     async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<i32, CommandError> {
//!         Ok(self.0 + self.1)
//!     }
//! }
//!
//! let executor = CommandExecutor::builder(Arc::new(container))
//!     .middleware(TracingMiddleware::new())
//!     .build();
//! assert_eq!(executor.invoke(&AddTwoNumbers(3, 5)).await?, 8);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod command;
mod config;
mod context;
mod error;
mod executor;
pub mod middleware;
mod pipeline;
mod shared_data;

pub use command::{Command, CommandExt};
pub use config::ExecutorConfig;
pub use context::{ExecutionContext, InvocationId, InvocationState};
pub use error::{CommandError, ErrorKind};
pub use executor::{CommandExecutor, CommandExecutorBuilder};
pub use middleware::TracingMiddleware;
pub use pipeline::{Middleware, MiddlewareFactory, MiddlewarePipeline, Next, PipelineBuilder, Terminal};
pub use shared_data::SharedDataBag;

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
