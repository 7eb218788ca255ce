//! Error types for the session store.
//!
//! One typed error per failure class, matching the taxonomy the store
//! contract promises callers: a backing-store failure always looks like a
//! `StoreError::BackingStore`, a missing record on a read never raises at
//! all (it's a value, `None`), and a missing record on an operation that
//! requires prior state raises `StoreError::NotFound`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("backing store error: {0}")]
    BackingStore(#[from] redis::RedisError),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
