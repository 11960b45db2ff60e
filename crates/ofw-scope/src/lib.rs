//! OFW Scope - invocation-scoped dependency resolution
//!
//! Provides the pieces the command executor needs from a DI collaborator,
//! plus the ambient binding that makes "the current scope" reachable from
//! arbitrarily nested code:
//! - [`ScopeFactory`]: create/dispose boundary to the collaborator
//! - [`ScopeHandle`]: cloneable reference to one isolated scope
//! - [`ScopeAccessor`]: task-local binding of the current scope
//! - [`ServiceContainer`]: in-memory collaborator with singleton, scoped and
//!   transient lifetimes
//!
//! # Example
//!
//! ```rust,ignore
//! use ofw_scope::{ScopeAccessor, ScopeFactory, ServiceCollection};
//!
//! let mut services = ServiceCollection::new();
//! services.add_scoped_default::<UnitOfWork>();
//! let container = services.build();
//!
//! let scope = container.create_scope()?;
//! ScopeAccessor::bind(scope.clone(), async {
//!     let uow = ScopeAccessor::resolve::<UnitOfWork>()?;
//!     // ...
//! })?
//! .await;
//! container.dispose_scope(scope);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod accessor;
mod container;
mod error;
mod handle;

pub use accessor::{Bound, Propagated, ScopeAccessor};
pub use container::{Lifetime, ServiceCollection, ServiceContainer};
pub use error::ScopeError;
pub use handle::{Resolver, ScopeFactory, ScopeHandle, ScopeId, ServiceInstance, ServiceKey, ServiceScope};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
