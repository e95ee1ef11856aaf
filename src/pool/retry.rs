//! Retrying pool operation
//!
//! One pass over the pool per call: the operation is tried on consecutive
//! handles starting from a freshly claimed slot, at most `pool.size()` times.
//! Because the slot is claimed once, concurrent callers advancing the shared
//! cursor cannot make one call revisit an endpoint it already tried.
//! Only transient errors (`Error::is_retryable`) move on to the next handle;
//! anything else is returned as is.

use std::future::Future;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::EndpointPool;

/// Anything with a label that can appear in logs
pub trait Labeled {
    fn label(&self) -> String;
}

impl<T: Labeled + ?Sized> Labeled for std::sync::Arc<T> {
    fn label(&self) -> String {
        (**self).label()
    }
}

impl Labeled for &str {
    fn label(&self) -> String {
        (*self).to_string()
    }
}

/// Run `op` against pool handles until it succeeds or every handle failed
pub async fn with_retry<'a, T, F, Fut, R>(
    pool: &'a EndpointPool<T>,
    operation: &str,
    mut op: F,
) -> Result<R>
where
    T: Labeled,
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let start = pool.claim();
    let attempts = pool.size();
    let mut last_error = String::new();

    for attempt in 0..attempts {
        let handle = pool.at(start, attempt);
        match op(handle).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        "{} succeeded on {} after {} failed attempts",
                        operation,
                        handle.label(),
                        attempt
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                warn!("{} failed on {}: {}", operation, handle.label(), e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{} failed on {} (attempt {}/{}): {}",
                    operation,
                    handle.label(),
                    attempt + 1,
                    attempts,
                    e
                );
                last_error = e.to_string();
            }
        }
    }

    Err(Error::PoolExhausted {
        operation: operation.to_string(),
        attempts,
        last_error,
    })
}
