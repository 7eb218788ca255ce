//! Transaction coordinator session store.
//!
//! Durable, concurrent-safe persistence of global and branch transaction
//! session state on top of a Redis-compatible backing service. See
//! `storage` for the five core components (key codec, connection source,
//! record codec, store engine, query engine) and `recovery` for the
//! periodic reconciler that keeps the status index converging with
//! per-record truth.

pub mod config;
pub mod error;
pub mod logging;
pub mod recovery;
pub mod storage;

use std::sync::Arc;

use once_cell::sync::OnceCell;

use config::RedisConfig;
use error::{Result, StoreError};
use storage::pool::ConnectionSource;
use storage::SessionStore;

static INSTANCE: OnceCell<Arc<SessionStore>> = OnceCell::new();

/// Build (or return the already-built) process-wide session store.
///
/// The requirement is one initialized store per process; `OnceCell::get_or_try_init`
/// races concurrent first callers to build exactly one instance and hands
/// every caller, winner or loser, the same `Arc`.
pub fn session_store(config: &RedisConfig) -> Result<Arc<SessionStore>> {
    INSTANCE
        .get_or_try_init(|| {
            let pool = Arc::new(ConnectionSource::new(config)?);
            Ok::<_, StoreError>(Arc::new(SessionStore::new(pool, config.query_limit)))
        })
        .cloned()
}

/// Borrow the already-initialized store.
///
/// # Panics
/// Panics if `session_store` was never called -- callers are expected to
/// initialize once at process startup before reaching for this shorthand.
pub fn session_store_handle() -> Arc<SessionStore> {
    INSTANCE
        .get()
        .expect("session store accessed before initialization")
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_store_is_a_singleton_across_calls() {
        let config = RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..RedisConfig::default()
        };
        let first = session_store(&config).unwrap();
        let second = session_store(&config).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &session_store_handle()));
    }
}
