use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{Executor, UnitOfWorkError, UnitOfWorkResult};

type ErasedFactory<T> = Arc<dyn Fn(Executor<T>) -> Box<dyn Any + Send> + Send + Sync>;

/// Name of a registered repository together with the type its factory
/// builds, so lookups through the key are checked at compile time.
///
/// ```ignore
/// const ORDERS: RepositoryKey<OrderRepository> = RepositoryKey::new("orders");
/// uow.register_key(ORDERS, OrderRepository::new);
/// let orders = uow.repository(ORDERS).await?;
/// ```
pub struct RepositoryKey<R> {
    name: &'static str,
    _repository: PhantomData<fn() -> R>,
}

impl<R> RepositoryKey<R> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _repository: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<R> Clone for RepositoryKey<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for RepositoryKey<R> {}

impl<R> fmt::Debug for RepositoryKey<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RepositoryKey").field(&self.name).finish()
    }
}

/// Name to factory map used by a unit of work to build repositories.
///
/// Populate it once at startup, then share it between units through an
/// `Arc`. It does no locking of its own.
pub struct RepositoryRegistry<T> {
    factories: HashMap<String, ErasedFactory<T>>,
}

impl<T> Default for RepositoryRegistry<T> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<T> Clone for RepositoryRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            factories: self.factories.clone(),
        }
    }
}

impl<T> fmt::Debug for RepositoryRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("RepositoryRegistry")
            .field("names", &names)
            .finish()
    }
}

impl<T: Send + 'static> RepositoryRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `factory` under `name`, replacing any previous factory.
    ///
    /// Returns `true` when an existing registration was overwritten.
    pub fn register<R, F>(&mut self, name: impl Into<String>, factory: F) -> bool
    where
        R: Send + 'static,
        F: Fn(Executor<T>) -> R + Send + Sync + 'static,
    {
        let erased: ErasedFactory<T> =
            Arc::new(move |executor: Executor<T>| Box::new(factory(executor)) as Box<dyn Any + Send>);
        self.factories.insert(name.into(), erased).is_some()
    }

    pub fn register_key<R, F>(&mut self, key: RepositoryKey<R>, factory: F) -> bool
    where
        R: Send + 'static,
        F: Fn(Executor<T>) -> R + Send + Sync + 'static,
    {
        self.register(key.name(), factory)
    }

    /// Remove the factory registered under `name`, if any.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Run the factory registered under `name` and recover its concrete type.
    pub(crate) fn build<R: 'static>(&self, name: &str, executor: Executor<T>) -> UnitOfWorkResult<R> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| UnitOfWorkError::RepositoryNotRegistered(name.to_string()))?;
        factory(executor)
            .downcast::<R>()
            .map(|repository| *repository)
            .map_err(|_| UnitOfWorkError::RepositoryTypeMismatch {
                name: name.to_string(),
                expected: type_name::<R>(),
            })
    }
}
