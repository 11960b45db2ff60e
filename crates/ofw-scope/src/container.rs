//! In-memory service container
//!
//! A small reference implementation of the scope collaborator:
//! - [`ServiceCollection`]: mutable registration phase
//! - [`ServiceContainer`]: frozen registry, hands out scopes
//!
//! Registrations cannot change once the container is built. Scoped
//! instances live in the scope that created them and are dropped when the
//! scope is disposed; singletons live as long as the container.

use crate::error::ScopeError;
use crate::handle::{Resolver, ScopeFactory, ScopeHandle, ScopeId, ServiceInstance, ServiceKey, ServiceScope};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How long a resolved instance is reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifetime {
    /// One instance per container
    Singleton,
    /// One instance per scope
    Scoped,
    /// New instance per resolution
    Transient,
}

type Factory = Arc<dyn Fn(&Resolver<'_>) -> Result<ServiceInstance, ScopeError> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    lifetime: Lifetime,
    type_name: &'static str,
    factory: Factory,
}

/// Registration phase of a [`ServiceContainer`]
#[derive(Default)]
pub struct ServiceCollection {
    registrations: HashMap<TypeId, Registration>,
}

impl ServiceCollection {
    /// Create empty collection
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` with one instance per container
    pub fn add_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T, ScopeError> + Send + Sync + 'static,
    {
        self.register(Lifetime::Singleton, factory)
    }

    /// Register `T` with one instance per scope
    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T, ScopeError> + Send + Sync + 'static,
    {
        self.register(Lifetime::Scoped, factory)
    }

    /// Register `T` with a fresh instance per resolution
    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T, ScopeError> + Send + Sync + 'static,
    {
        self.register(Lifetime::Transient, factory)
    }

    /// Register `T` as scoped, built with `T::default()`
    pub fn add_scoped_default<T>(&mut self) -> &mut Self
    where
        T: Any + Send + Sync + Default,
    {
        self.add_scoped(|_: &Resolver<'_>| Ok(T::default()))
    }

    /// Register an existing value as a singleton
    pub fn add_instance<T>(&mut self, value: T) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        let instance: ServiceInstance = Arc::new(value);
        self.insert::<T>(
            Lifetime::Singleton,
            Arc::new(move |_: &Resolver<'_>| Ok(instance.clone())),
        )
    }

    /// Lifetime `T` is registered with, if any
    #[inline]
    #[must_use]
    pub fn lifetime_of<T: Any>(&self) -> Option<Lifetime> {
        self.registrations.get(&TypeId::of::<T>()).map(|r| r.lifetime)
    }

    /// Number of registered types
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Check if nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Freeze registrations into a container
    #[must_use]
    pub fn build(self) -> ServiceContainer {
        ServiceContainer {
            inner: Arc::new(ContainerInner {
                registry: Arc::new(Registry {
                    registrations: self.registrations,
                    singletons: DashMap::new(),
                }),
                live: DashMap::new(),
            }),
        }
    }

    fn register<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T, ScopeError> + Send + Sync + 'static,
    {
        self.insert::<T>(
            lifetime,
            Arc::new(move |resolver: &Resolver<'_>| {
                factory(resolver).map(|value| Arc::new(value) as ServiceInstance)
            }),
        )
    }

    fn insert<T: Any>(&mut self, lifetime: Lifetime, factory: Factory) -> &mut Self {
        let type_name = std::any::type_name::<T>();
        if self
            .registrations
            .insert(
                TypeId::of::<T>(),
                Registration {
                    lifetime,
                    type_name,
                    factory,
                },
            )
            .is_some()
        {
            tracing::debug!(service = type_name, "registration replaced");
        }
        self
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

struct Registry {
    registrations: HashMap<TypeId, Registration>,
    singletons: DashMap<TypeId, ServiceInstance>,
}

struct ContainerInner {
    registry: Arc<Registry>,
    live: DashMap<ScopeId, Arc<ContainerScope>>,
}

/// Frozen service registry and scope factory
#[derive(Clone)]
pub struct ServiceContainer {
    inner: Arc<ContainerInner>,
}

impl ServiceContainer {
    /// Start a registration phase
    #[inline]
    #[must_use]
    pub fn collection() -> ServiceCollection {
        ServiceCollection::new()
    }

    /// Check if `T` is registered
    #[inline]
    #[must_use]
    pub fn is_registered<T: Any>(&self) -> bool {
        self.inner.registry.registrations.contains_key(&TypeId::of::<T>())
    }

    /// Scopes created and not yet disposed
    #[inline]
    #[must_use]
    pub fn live_scopes(&self) -> usize {
        self.inner.live.len()
    }

    /// Names of all registered types
    #[must_use]
    pub fn registered_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .inner
            .registry
            .registrations
            .values()
            .map(|r| r.type_name)
            .collect();
        names.sort_unstable();
        names
    }
}

impl ScopeFactory for ServiceContainer {
    fn create_scope(&self) -> Result<ScopeHandle, ScopeError> {
        let scope = Arc::new(ContainerScope {
            id: ScopeId::new(),
            registry: Arc::clone(&self.inner.registry),
            instances: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        });
        self.inner.live.insert(scope.id, Arc::clone(&scope));
        tracing::trace!(scope = %scope.id, "scope created");
        Ok(ScopeHandle::new(scope))
    }

    fn dispose_scope(&self, scope: ScopeHandle) {
        match self.inner.live.remove(&scope.id()) {
            Some((id, owned)) => {
                owned.dispose();
                tracing::trace!(scope = %id, "scope disposed");
            }
            None => tracing::warn!(scope = %scope.id(), "dispose requested for unknown scope"),
        }
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("registrations", &self.inner.registry.registrations.len())
            .field("live_scopes", &self.live_scopes())
            .finish()
    }
}

thread_local! {
    /// Services whose factories are running on this thread
    static RESOLVING: RefCell<Vec<(ScopeId, TypeId)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a service as under construction until dropped
///
/// Factories are synchronous, so a nested resolution of the same service
/// from the same scope always happens on the same thread.
struct ResolutionGuard {
    entry: (ScopeId, TypeId),
}

impl ResolutionGuard {
    fn enter(scope: ScopeId, key: ServiceKey) -> Result<Self, ScopeError> {
        let entry = (scope, key.type_id());
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&entry) {
                return Err(ScopeError::Cycle {
                    type_name: key.type_name(),
                });
            }
            stack.push(entry);
            Ok(Self { entry })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|entry| *entry == self.entry) {
                stack.remove(pos);
            }
        });
    }
}

struct ContainerScope {
    id: ScopeId,
    registry: Arc<Registry>,
    instances: Mutex<HashMap<TypeId, ServiceInstance>>,
    disposed: AtomicBool,
}

impl ContainerScope {
    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        // Drop instances outside the lock; their destructors may resolve.
        let drained = std::mem::take(&mut *self.instances.lock());
        drop(drained);
    }

    fn ensure_live(&self) -> Result<(), ScopeError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(ScopeError::Disposed(self.id))
        } else {
            Ok(())
        }
    }
}

impl ServiceScope for ContainerScope {
    fn id(&self) -> ScopeId {
        self.id
    }

    fn resolve_erased(&self, key: ServiceKey) -> Result<ServiceInstance, ScopeError> {
        self.ensure_live()?;
        let registration = self
            .registry
            .registrations
            .get(&key.type_id())
            .ok_or(ScopeError::Unresolved {
                type_name: key.type_name(),
            })?;
        let resolver = Resolver::new(self);
        let construct = || {
            let _guard = ResolutionGuard::enter(self.id, key)?;
            (registration.factory)(&resolver)
        };

        // Factories run without any lock held so they can resolve their own
        // dependencies; a lost race keeps the first stored instance.
        match registration.lifetime {
            Lifetime::Transient => construct(),
            Lifetime::Scoped => {
                if let Some(found) = self.instances.lock().get(&key.type_id()) {
                    return Ok(Arc::clone(found));
                }
                let created = construct()?;
                let mut instances = self.instances.lock();
                self.ensure_live()?;
                Ok(Arc::clone(instances.entry(key.type_id()).or_insert(created)))
            }
            Lifetime::Singleton => {
                if let Some(found) = self.registry.singletons.get(&key.type_id()) {
                    return Ok(Arc::clone(found.value()));
                }
                let created = construct()?;
                Ok(Arc::clone(
                    self.registry
                        .singletons
                        .entry(key.type_id())
                        .or_insert(created)
                        .value(),
                ))
            }
        }
    }
}
