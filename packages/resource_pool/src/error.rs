use thiserror::Error;

/// Misuse of a [`ResourcePool`][crate::ResourcePool] detected by one of its operations.
///
/// All variants indicate a bug in the calling code rather than a transient condition, so
/// retrying the same call will fail again with the same error.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The instance passed to [`add()`][crate::ResourcePool::add] is already tracked by
    /// the pool. The pool was left unmodified.
    #[error("resource is already tracked by this pool and cannot be added again")]
    DuplicateResource,

    /// The instance passed to [`release()`][crate::ResourcePool::release] was never
    /// tracked by the pool.
    #[error("resource does not belong to this pool")]
    UnknownResource,

    /// The instance passed to [`release()`][crate::ResourcePool::release] belongs to the
    /// pool but is not checked out, typically because it was released twice.
    #[error("resource is not checked out and cannot be released")]
    NotCheckedOut,
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
