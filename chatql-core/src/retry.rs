//! Bounded retry for optimistic-concurrency operations

use std::future::Future;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// An attempt failed with an error the predicate refused to retry
    #[error(transparent)]
    Aborted(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted(err) => err,
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` attempts have been made. The attempt number (starting at
/// 1) is passed to the operation.
pub async fn retry<T, E, F, Fut, P>(
    max_attempts: u32,
    is_retryable: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retryable(&err) => return Err(RetryError::Aborted(err)),
            Err(err) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                })
            }
            Err(err) => {
                debug!(attempt, error = %err, "Retrying after conflict");
                attempt += 1;
            }
        }
    }
}
