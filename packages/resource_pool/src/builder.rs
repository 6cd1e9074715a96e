use std::any::type_name;
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::ResourcePool;

pub(crate) const DEFAULT_NAME: &str = "resource_pool";

/// Builder for creating an instance of [`ResourcePool`].
///
/// # Examples
///
/// ```
/// use resource_pool::ResourcePool;
///
/// let mut next_port = 8000_u16;
///
/// let pool = ResourcePool::builder()
///     .name("upstreams")
///     .size(3)
///     .build(|| {
///         next_port += 1;
///         format!("http://10.0.0.1:{next_port}")
///     });
///
/// assert_eq!(pool.name(), "upstreams");
/// assert_eq!(pool.len(), 3);
/// ```
#[must_use]
pub struct ResourcePoolBuilder<T> {
    name: String,
    size: usize,

    // The builder never holds a `T`, so this must not affect its auto traits.
    _instance: PhantomData<fn() -> T>,
}

impl<T> ResourcePoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            size: 0,
            _instance: PhantomData,
        }
    }

    /// Sets the name that identifies the pool in log output.
    ///
    /// Default is `resource_pool`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets how many instances the factory creates when the pool is built.
    ///
    /// Default is zero, in which case the factory is never called and instances can be
    /// provided later via [`ResourcePool::add()`].
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Builds the pool, calling `factory` once per instance.
    pub fn build<F>(self, mut factory: F) -> ResourcePool<T>
    where
        F: FnMut() -> T,
    {
        match self.try_build(|| Ok::<T, Infallible>(factory())) {
            Ok(pool) => pool,
            Err(never) => match never {},
        }
    }

    /// Builds the pool from a fallible factory, calling it once per instance.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `factory`. Instances created before the failure
    /// are dropped.
    pub fn try_build<E, F>(self, mut factory: F) -> Result<ResourcePool<T>, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        let instances = (0..self.size)
            .map(|_| factory().map(Arc::new))
            .collect::<Result<Vec<_>, E>>()?;

        Ok(ResourcePool::from_instances(self.name, instances))
    }
}

impl<T> fmt::Debug for ResourcePoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    // `Rc` is neither `Send` nor `Sync`, but a builder for it holds none.
    assert_impl_all!(ResourcePoolBuilder<std::rc::Rc<u8>>: Send, Sync, fmt::Debug);

    #[test]
    fn element_type_is_inferred_from_factory() {
        let pool = ResourcePool::builder()
            .name("inferred")
            .size(2)
            .build(|| String::from("conn"));

        assert_eq!(pool.len(), 2);
        assert_eq!(*pool.try_acquire().unwrap(), "conn");
    }

    #[test]
    fn element_type_is_inferred_from_fallible_factory() {
        let pool = ResourcePool::builder()
            .size(1)
            .try_build(|| Ok::<_, &str>(7_u16))
            .unwrap();

        assert_eq!(*pool.try_acquire().unwrap(), 7);
    }

    #[test]
    fn default_builds_empty_pool() {
        let pool = ResourcePoolBuilder::new().build(|| -> u32 {
            panic!("factory must not be called for an empty pool")
        });

        assert!(pool.is_empty());
        assert_eq!(pool.name(), DEFAULT_NAME);
    }

    #[test]
    fn factory_called_once_per_instance() {
        let mut calls = 0_usize;

        let pool = ResourcePoolBuilder::new().size(4).build(|| {
            calls += 1;
            calls
        });

        assert_eq!(calls, 4);
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn try_build_stops_at_first_error() {
        let mut calls = 0_usize;

        let result = ResourcePoolBuilder::new().size(5).try_build(|| {
            calls += 1;

            if calls == 3 {
                Err("connection refused")
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result.unwrap_err(), "connection refused");
        assert_eq!(calls, 3);
    }

    #[test]
    fn name_is_applied() {
        let pool = ResourcePoolBuilder::new().name("db").build(|| 0_u8);

        assert_eq!(pool.name(), "db");
    }
}
