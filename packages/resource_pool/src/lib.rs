#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A bounded pool of interchangeable resource instances, such as connections, shared among
//! concurrent callers.
//!
//! The pool guarantees that:
//!
//! - No more instances are checked out at once than the pool holds.
//! - Callers that arrive while every instance is checked out are queued and served strictly
//!   in arrival order as instances come back.
//! - Returning an instance the pool does not know about, or one that is already free, is
//!   rejected as a programming error.
//!
//! The pool does not create, inspect or health-check instances. You provide a factory when
//! building the pool and may [`add()`][ResourcePool::add] more instances later.
//!
//! # Quick start
//!
//! ```rust
//! use resource_pool::ResourcePool;
//! # use futures::executor::block_on;
//!
//! # block_on(async {
//! let mut next_id = 0;
//! let pool = ResourcePool::new(2, || {
//!     next_id += 1;
//!     format!("http://10.0.0.1/{next_id}")
//! });
//!
//! let connection = pool.acquire().await;
//! println!("using {connection}");
//!
//! pool.release(connection).unwrap();
//! # });
//! ```
//!
//! # Identity
//!
//! Instances are handed out as `Arc<T>` and recognized by allocation, not by value. Two
//! instances that compare equal are still different instances to the pool.
//!
//! # Waiting
//!
//! [`ResourcePool::acquire()`] returns an [`Acquire`] future. When an instance is free, the
//! future is ready immediately. Otherwise the caller is queued and the future completes when
//! another caller releases an instance. There is no timeout; dropping the future is the only
//! way to stop waiting.
//!
//! # Errors
//!
//! Misuse of the pool is reported synchronously through [`Error`], with a distinct variant
//! for each kind of misuse.

mod acquire;
mod builder;
mod error;
mod metrics;
mod pool;
mod state;

pub use acquire::*;
pub use builder::*;
pub use error::Error;
pub(crate) use error::Result;
pub use pool::*;
